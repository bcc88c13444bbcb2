use crate::model::{
    Id,
    post::{PostMarker, PostTitle},
    user::{UserMarker, Username},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct NotificationMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Follow,
    Post,
}

impl NotificationType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Follow => "follow",
            NotificationType::Post => "post",
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Unknown notification type: {0}")]
pub struct UnknownNotificationTypeError(String);

impl FromStr for NotificationType {
    type Err = UnknownNotificationTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "follow" => Ok(NotificationType::Follow),
            "post" => Ok(NotificationType::Post),
            other => Err(UnknownNotificationTypeError(other.to_owned())),
        }
    }
}

/// What happened, with exactly the data each kind of event needs.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum NotificationKind {
    Follow {
        follower_id: Id<UserMarker>,
        follower_username: Username,
    },
    Post {
        author_id: Id<UserMarker>,
        author_username: Username,
        post_id: Id<PostMarker>,
        title: PostTitle,
    },
}

impl NotificationKind {
    #[must_use]
    pub fn notification_type(&self) -> NotificationType {
        match self {
            NotificationKind::Follow { .. } => NotificationType::Follow,
            NotificationKind::Post { .. } => NotificationType::Post,
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            NotificationKind::Follow {
                follower_username, ..
            } => format!("{} followed you", follower_username.get()),
            NotificationKind::Post {
                author_username,
                title,
                ..
            } => format!(
                "{} created a new post: \"{}\"",
                author_username.get(),
                title.get()
            ),
        }
    }

    #[must_use]
    pub fn from_user_id(&self) -> Id<UserMarker> {
        match self {
            NotificationKind::Follow { follower_id, .. } => *follower_id,
            NotificationKind::Post { author_id, .. } => *author_id,
        }
    }

    #[must_use]
    pub fn post_id(&self) -> Option<Id<PostMarker>> {
        match self {
            NotificationKind::Follow { .. } => None,
            NotificationKind::Post { post_id, .. } => Some(*post_id),
        }
    }

    #[must_use]
    pub fn payload(&self) -> NotificationPayload {
        NotificationPayload {
            notification_type: self.notification_type(),
            message: self.message(),
            from_user_id: self.from_user_id(),
            post_id: self.post_id(),
        }
    }
}

/// The live event pushed to connected clients.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub from_user_id: Id<UserMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<Id<PostMarker>>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Id<NotificationMarker>,
    pub recipient_id: Id<UserMarker>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub from_user_id: Id<UserMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<Id<PostMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub read: bool,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewNotification {
    pub recipient_id: Id<UserMarker>,
    pub kind: NotificationKind,
}

#[cfg(test)]
mod tests {
    use super::{NotificationKind, NotificationType};
    use crate::model::{Id, post::PostTitle, user::Username};

    #[test]
    fn follow_message_and_payload() {
        let kind = NotificationKind::Follow {
            follower_id: Id::from(7_u64),
            follower_username: Username::new("alice".to_owned()).unwrap(),
        };

        assert_eq!(kind.message(), "alice followed you");

        let json = serde_json::to_value(kind.payload()).unwrap();
        assert_eq!(json["type"], "follow");
        assert_eq!(json["fromUserId"], "7");
        assert!(json.get("postId").is_none());
    }

    #[test]
    fn post_message_and_payload() {
        let kind = NotificationKind::Post {
            author_id: Id::from(1_u64),
            author_username: Username::new("bob".to_owned()).unwrap(),
            post_id: Id::from(99_u64),
            title: PostTitle::new("Hello".to_owned()).unwrap(),
        };

        assert_eq!(kind.message(), "bob created a new post: \"Hello\"");

        let json = serde_json::to_value(kind.payload()).unwrap();
        assert_eq!(json["type"], "post");
        assert_eq!(json["postId"], "99");
    }

    #[test]
    fn notification_type_round_trips_through_str() {
        for kind in [NotificationType::Follow, NotificationType::Post] {
            assert_eq!(kind.as_str().parse::<NotificationType>().unwrap(), kind);
        }
        assert!("mention".parse::<NotificationType>().is_err());
    }
}
