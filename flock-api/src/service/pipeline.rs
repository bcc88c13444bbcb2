use crate::service::{
    error::{Result, ServiceError},
    notifications::NotificationSink,
};
use flock_common::{
    model::{
        Id,
        notification::NotificationKind,
        post::{NewPost, Post, PostContent, PostMarker},
        user::{UserMarker, Username},
    },
    snowflake::SnowflakeGenerator,
};
use flock_db::Store;
use futures_util::StreamExt;
use serde::Serialize;
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    time::Instant,
};
use tokio_util::{sync::CancellationToken, time::DelayQueue};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct JobMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PendingPostJob {
    pub job_id: Id<JobMarker>,
    pub author_id: Id<UserMarker>,
    pub author_username: Username,
    pub content: PostContent,
    pub not_before: Instant,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum JobState {
    Queued,
    Processing,
    Published { post_id: Id<PostMarker> },
    Failed { reason: String },
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct JobEvent {
    pub job_id: Id<JobMarker>,
    pub state: JobState,
}

/// Returned to the author as soon as the job is queued.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReceipt {
    pub message: &'static str,
    pub job_id: Id<JobMarker>,
}

/// Accepts post submissions and hands them to the [`PostWorker`].
pub struct PostPipeline {
    store: Arc<dyn Store>,
    jobs: mpsc::UnboundedSender<PendingPostJob>,
    events: broadcast::Sender<JobEvent>,
    ids: Mutex<SnowflakeGenerator>,
    delay: Duration,
}

impl PostPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        notifications: Arc<dyn NotificationSink>,
        delay: Duration,
        ids: SnowflakeGenerator,
    ) -> (Self, PostWorker) {
        let (jobs, incoming) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let worker = PostWorker {
            store: store.clone(),
            notifications,
            incoming,
            events: events.clone(),
        };
        let pipeline = Self {
            store,
            jobs,
            events,
            ids: Mutex::new(ids),
            delay,
        };

        (pipeline, worker)
    }

    /// Job lifecycle events, mainly for observers and tests.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Queues the post. It is stored and fanned out once the delay has passed.
    pub async fn submit(
        &self,
        author_id: Id<UserMarker>,
        content: PostContent,
    ) -> Result<JobReceipt> {
        let author = self
            .store
            .fetch_user(author_id)
            .await?
            .ok_or(ServiceError::user_not_found(author_id))?;

        let job_id = {
            let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
            Id::generate(&mut ids)
        };

        let job = PendingPostJob {
            job_id,
            author_id,
            author_username: author.username,
            content,
            not_before: Instant::now() + self.delay,
        };
        self.jobs.send(job).map_err(|_| ServiceError::QueueClosed)?;

        debug!(%job_id, %author_id, delay_ms = self.delay.as_millis(), "Queued post job");
        let _ = self.events.send(JobEvent {
            job_id,
            state: JobState::Queued,
        });

        Ok(JobReceipt {
            message: "Post creation queued successfully",
            job_id,
        })
    }
}

/// Runs queued jobs once their delay has elapsed.
pub struct PostWorker {
    store: Arc<dyn Store>,
    notifications: Arc<dyn NotificationSink>,
    incoming: mpsc::UnboundedReceiver<PendingPostJob>,
    events: broadcast::Sender<JobEvent>,
}

impl PostWorker {
    /// Runs until cancelled, or until the pipeline is dropped and every pending job ran.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut pending = DelayQueue::new();
        let mut accepting = true;

        loop {
            if !accepting && pending.is_empty() {
                break;
            }

            tokio::select! {
                () = shutdown.cancelled() => {
                    if !pending.is_empty() {
                        warn!(dropped = pending.len(), "Shutting down with pending post jobs");
                    }
                    break;
                }
                job = self.incoming.recv(), if accepting => match job {
                    Some(job) => {
                        let not_before = job.not_before;
                        pending.insert_at(job, not_before);
                    }
                    None => accepting = false,
                },
                Some(expired) = pending.next() => {
                    self.process(expired.into_inner()).await;
                }
            }
        }

        debug!("Post worker stopped");
    }

    async fn process(&self, job: PendingPostJob) {
        let job_id = job.job_id;
        self.publish(job_id, JobState::Processing);

        match self.execute(job).await {
            Ok(post) => {
                info!(%job_id, post_id = %post.id, author_id = %post.author_id, "Published post");
                self.publish(job_id, JobState::Published { post_id: post.id });
            }
            Err(err) => {
                error!(%job_id, error = %err, "Post job failed");
                self.publish(
                    job_id,
                    JobState::Failed {
                        reason: err.to_string(),
                    },
                );
            }
        }
    }

    async fn execute(&self, job: PendingPostJob) -> Result<Post> {
        let post = self
            .store
            .create_post(&NewPost {
                author_id: job.author_id,
                author_username: job.author_username,
                content: job.content,
            })
            .await?;

        // The post exists from here on, fan-out problems only cost notifications.
        let followers = match self.store.fetch_user(post.author_id).await {
            Ok(Some(author)) => author.followers,
            Ok(None) => {
                warn!(author_id = %post.author_id, "Author vanished before fan-out");
                return Ok(post);
            }
            Err(err) => {
                warn!(post_id = %post.id, error = %err, "Could not load followers for fan-out");
                return Ok(post);
            }
        };

        for follower in followers {
            let kind = NotificationKind::Post {
                author_id: post.author_id,
                author_username: post.author_username.clone(),
                post_id: post.id,
                title: post.title.clone(),
            };
            if let Err(err) = self.notifications.notify(follower, kind).await {
                warn!(post_id = %post.id, %follower, error = %err, "Post notification failed");
            }
        }

        Ok(post)
    }

    fn publish(&self, job_id: Id<JobMarker>, state: JobState) {
        let _ = self.events.send(JobEvent { job_id, state });
    }
}
