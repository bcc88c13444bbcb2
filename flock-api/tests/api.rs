use flock_api::{
    config::{Config, JwtSecret},
    server::{self, ServerState},
};
use flock_db::MemoryStore;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const POST_DELAY: Duration = Duration::from_millis(300);
const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    address: SocketAddr,
    client: Client,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn spawn(post_rate_limit: u32) -> Self {
        Self::spawn_with_limits(100, post_rate_limit).await
    }

    async fn spawn_with_limits(auth_rate_limit: u32, post_rate_limit: u32) -> Self {
        let mut config = Config::new(JwtSecret::new("integration-secret".to_owned()));
        config.post_delay_ms = u64::try_from(POST_DELAY.as_millis()).unwrap();
        config.password_hash_memory_kib = 64;
        config.password_hash_iterations = 1;
        config.auth_rate_limit_per_minute = auth_rate_limit;
        config.post_rate_limit_per_minute = post_rate_limit;

        let (state, worker) = ServerState::new(Arc::new(MemoryStore::default()), &config).unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(worker.run(shutdown.child_token()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(
                listener,
                server::app(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
            .unwrap();
        });

        Self {
            address,
            client: Client::new(),
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut request = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    /// Returns `(token, user id)`.
    async fn register(&self, name: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({ "email": format!("{name}@example.com"), "username": name, "password": "pw123" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let token = body["access_token"].as_str().unwrap().to_owned();
        (token, body["user"]["id"].as_str().unwrap().to_owned())
    }

    /// Connects and waits for the greeting, so the connection is registered afterwards.
    async fn connect(&self, token: &str) -> Socket {
        let (mut socket, _) = connect_async(format!("ws://{}/ws?token={token}", self.address))
            .await
            .unwrap();

        let greeting = next_frame(&mut socket).await;
        assert_eq!(greeting["event"], "connected");
        socket
    }

    /// Waits until the worker stored at least one post notification for the user.
    async fn post_notifications(&self, token: &str) -> Vec<Value> {
        timeout(WAIT, async {
            loop {
                let (_, notifications) = self.get("/notifications", Some(token)).await;
                let posts: Vec<Value> = notifications
                    .as_array()
                    .unwrap()
                    .iter()
                    .filter(|notification| notification["type"] == "post")
                    .cloned()
                    .collect();

                if !posts.is_empty() {
                    return posts;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("timed out waiting for a post notification")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn next_frame(socket: &mut Socket) -> Value {
    loop {
        let message = timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .unwrap();

        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn register_and_login() {
    let server = TestServer::spawn(3).await;
    let (_, alice_id) = server.register("alice").await;

    let (status, body) = server
        .post(
            "/auth/register",
            None,
            json!({ "email": "ALICE@example.com", "username": "other", "password": "pw123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, _) = server
        .post(
            "/auth/login",
            None,
            json!({ "email": "alice@example.com", "password": "nope" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server
        .post(
            "/auth/login",
            None,
            json!({ "email": "ghost@example.com", "password": "pw123" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server
        .post(
            "/auth/login",
            None,
            json!({ "email": "alice@example.com", "password": "pw123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], alice_id.as_str());
    assert!(body["user"].get("passwordHash").is_none());

    let token = body["access_token"].as_str().unwrap();
    let (status, profile) = server.get("/user/profile", Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["username"], "alice");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let server = TestServer::spawn(3).await;

    let (status, _) = server.get("/user/profile", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server.get("/posts/timeline", Some("forged")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server.get("/does/not/exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn follow_notifies_live_and_persists() {
    let server = TestServer::spawn(3).await;
    let (alice, alice_id) = server.register("alice").await;
    let (bob, bob_id) = server.register("bob").await;

    let mut bob_socket = server.connect(&bob).await;

    let (status, body) = server
        .post(&format!("/user/follow/{bob_id}"), Some(&alice), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Followed successfully");

    let frame = next_frame(&mut bob_socket).await;
    assert_eq!(frame["event"], "notification");
    assert_eq!(frame["data"]["type"], "follow");
    assert_eq!(frame["data"]["message"], "alice followed you");
    assert_eq!(frame["data"]["fromUserId"], alice_id.as_str());

    let (_, bob_profile) = server.get("/user/bob", Some(&alice)).await;
    assert_eq!(bob_profile["followers"], json!([&alice_id]));

    let (status, _) = server
        .post(&format!("/user/follow/{alice_id}"), Some(&alice), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, notifications) = server.get("/notifications", Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notifications.as_array().unwrap().len(), 1);
    assert_eq!(notifications[0]["read"], false);

    let notification_id = notifications[0]["id"].as_str().unwrap();
    let read_path = format!("/notifications/{notification_id}/read");

    let (status, _) = server.post(&read_path, Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.post(&read_path, Some(&bob), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, notifications) = server.get("/notifications", Some(&bob)).await;
    assert_eq!(notifications[0]["read"], true);

    let (status, body) = server
        .post(&format!("/user/unfollow/{bob_id}"), Some(&alice), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Unfollowed successfully");

    let (_, users) = server
        .post("/user/batch", Some(&alice), json!({ "ids": [alice_id, bob_id, "1"] }))
        .await;
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|user| user["following"] == json!([])));
}

#[tokio::test]
async fn posts_are_published_after_the_delay() {
    let server = TestServer::spawn(3).await;
    let (reader, _) = server.register("reader").await;
    let (author, author_id) = server.register("author").await;

    server
        .post(&format!("/user/follow/{author_id}"), Some(&reader), json!({}))
        .await;
    let mut reader_socket = server.connect(&reader).await;

    let (status, receipt) = server
        .post(
            "/posts",
            Some(&author),
            json!({ "title": "Hello", "description": "First post" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(receipt["message"], "Post creation queued successfully");
    assert!(receipt["jobId"].is_string());

    let (_, posts) = server.get("/posts/all", Some(&reader)).await;
    assert_eq!(posts, json!([]));

    let frame = next_frame(&mut reader_socket).await;
    assert_eq!(frame["data"]["type"], "post");
    assert_eq!(frame["data"]["message"], "author created a new post: \"Hello\"");
    let post_id = frame["data"]["postId"].as_str().unwrap().to_owned();

    let (_, timeline) = server.get("/posts/timeline", Some(&reader)).await;
    assert_eq!(timeline[0]["id"], post_id.as_str());
    assert_eq!(timeline[0]["authorUsername"], "author");

    let (_, own_timeline) = server.get("/posts/timeline", Some(&author)).await;
    assert_eq!(own_timeline, json!([]));

    let (_, by_author) = server
        .get(&format!("/posts/user/{author_id}"), Some(&reader))
        .await;
    assert_eq!(by_author.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn every_follower_gets_one_stored_post_notification() {
    let server = TestServer::spawn(3).await;
    let (alice, _) = server.register("alice").await;
    let (carol, _) = server.register("carol").await;
    let (bob, bob_id) = server.register("bob").await;

    for follower in [&alice, &carol] {
        let (status, _) = server
            .post(&format!("/user/follow/{bob_id}"), Some(follower), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    // Only alice is online, carol has to find the notification later.
    let mut alice_socket = server.connect(&alice).await;

    let (status, _) = server
        .post(
            "/posts",
            Some(&bob),
            json!({ "title": "Hello", "description": "World" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let frame = next_frame(&mut alice_socket).await;
    assert_eq!(frame["data"]["type"], "post");
    let post_id = frame["data"]["postId"].as_str().unwrap().to_owned();

    for follower in [&alice, &carol] {
        let posts = server.post_notifications(follower).await;

        assert_eq!(posts.len(), 1, "{posts:?}");
        assert_eq!(posts[0]["message"], "bob created a new post: \"Hello\"");
        assert_eq!(posts[0]["fromUserId"], bob_id.as_str());
        assert_eq!(posts[0]["postId"], post_id.as_str());
        assert_eq!(posts[0]["read"], false);
    }

    let (_, bob_notifications) = server.get("/notifications", Some(&bob)).await;
    assert!(
        bob_notifications
            .as_array()
            .unwrap()
            .iter()
            .all(|notification| notification["type"] == "follow")
    );
}

#[tokio::test]
async fn rejected_auth_bodies_still_count_against_the_limit() {
    let server = TestServer::spawn_with_limits(2, 3).await;
    let malformed = json!({ "email": "not-an-email" });

    for _ in 0..2 {
        let (status, _) = server.post("/auth/login", None, malformed.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, body) = server
        .post(
            "/auth/register",
            None,
            json!({ "email": "alice@example.com", "username": "alice", "password": "pw123" }),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["status"], 429);
}

#[tokio::test]
async fn rejected_post_bodies_still_count_against_the_limit() {
    let server = TestServer::spawn(1).await;
    let (author, _) = server.register("author").await;

    let (status, _) = server
        .post("/posts", Some(&author), json!({ "description": "no title" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .post(
            "/posts",
            Some(&author),
            json!({ "title": "Valid", "description": "" }),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn post_submissions_are_rate_limited() {
    let server = TestServer::spawn(1).await;
    let (author, _) = server.register("author").await;
    let post = json!({ "title": "Again", "description": "" });

    let (status, _) = server.post("/posts", Some(&author), post.clone()).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = server.post("/posts", Some(&author), post).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["status"], 429);
}

#[tokio::test]
async fn sockets_without_valid_token_are_closed() {
    let server = TestServer::spawn(3).await;

    for url in [
        format!("ws://{}/ws", server.address),
        format!("ws://{}/ws?token=garbage", server.address),
    ] {
        let (mut socket, _) = connect_async(url).await.unwrap();

        let next = timeout(WAIT, socket.next()).await.unwrap();
        assert!(matches!(next, None | Some(Ok(Message::Close(_)) | Err(_))));
    }
}
