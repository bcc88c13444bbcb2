use crate::{
    model::{
        Id,
        user::{UserMarker, Username},
    },
    util::char_len_within,
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::OffsetDateTime;

pub const POST_TITLE_MAX_LEN: usize = 200;
pub const POST_DESCRIPTION_MAX_LEN: usize = 5000;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    pub title: PostTitle,
    pub description: PostDescription,
    pub author_id: Id<UserMarker>,
    /// Username of the author at the time the post was submitted.
    pub author_username: Username,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostContent {
    pub title: PostTitle,
    pub description: PostDescription,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewPost {
    pub author_id: Id<UserMarker>,
    pub author_username: Username,
    pub content: PostContent,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct PostTitle(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The post title is invalid: {0}")]
pub struct InvalidPostTitleError(String);

impl PostTitle {
    pub fn new(title: String) -> Result<Self, InvalidPostTitleError> {
        if char_len_within(title.trim(), 1, POST_TITLE_MAX_LEN) {
            Ok(Self(title))
        } else {
            Err(InvalidPostTitleError(title))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PostTitle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostTitle::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"PostTitle"))
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct PostDescription(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The post description is longer than {POST_DESCRIPTION_MAX_LEN} characters")]
pub struct InvalidPostDescriptionError;

impl PostDescription {
    pub fn new(description: String) -> Result<Self, InvalidPostDescriptionError> {
        if char_len_within(&description, 0, POST_DESCRIPTION_MAX_LEN) {
            Ok(Self(description))
        } else {
            Err(InvalidPostDescriptionError)
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PostDescription {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostDescription::new(inner).map_err(|_| {
            Error::invalid_length(POST_DESCRIPTION_MAX_LEN + 1, &"a shorter PostDescription")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PostContent, PostTitle};

    #[test]
    fn blank_title_is_rejected() {
        assert!(PostTitle::new("   ".to_owned()).is_err());
        assert!(PostTitle::new("Hello".to_owned()).is_ok());
    }

    #[test]
    fn content_from_json() {
        let content: PostContent =
            serde_json::from_str(r#"{"title": "Hello", "description": "World"}"#).unwrap();
        assert_eq!(content.title.get(), "Hello");
        assert_eq!(content.description.get(), "World");

        assert!(serde_json::from_str::<PostContent>(r#"{"title": "", "description": ""}"#).is_err());
    }
}
