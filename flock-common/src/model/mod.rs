pub mod auth;
pub mod notification;
pub mod post;
pub mod user;

use crate::{
    model::{
        auth::InvalidPasswordError,
        notification::UnknownNotificationTypeError,
        post::{InvalidPostDescriptionError, InvalidPostTitleError},
        user::{InvalidEmailError, InvalidUsernameError},
    },
    snowflake::{Snowflake, SnowflakeGenerator},
    util::NonPositiveDurationError,
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error, Unexpected, Visitor},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error(transparent)]
    Email(#[from] InvalidEmailError),
    #[error(transparent)]
    Password(#[from] InvalidPasswordError),
    #[error(transparent)]
    PostTitle(#[from] InvalidPostTitleError),
    #[error(transparent)]
    PostDescription(#[from] InvalidPostDescriptionError),
    #[error(transparent)]
    NotificationType(#[from] UnknownNotificationTypeError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
}

/// Typed snowflake id.
///
/// Serialized as a decimal string, since snowflakes exceed the integer range JSON clients can
/// represent exactly. Deserialization also accepts plain numbers.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Id<Marker>(Snowflake, PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: Snowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn generate(generator: &mut SnowflakeGenerator) -> Self {
        Self::new(generator.generate())
    }

    #[must_use]
    pub fn snowflake(self) -> Snowflake {
        self.0
    }

    /// Postgres has no unsigned 64 bit integer, ids are stored bit-for-bit as `BIGINT`.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> Serialize for Id<Marker> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

struct IdVisitor<Marker>(PhantomData<Marker>);

impl<Marker> Visitor<'_> for IdVisitor<Marker> {
    type Value = Id<Marker>;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a snowflake id as a decimal string or unsigned integer")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(v.into())
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: Error,
    {
        u64::try_from(v)
            .map(Into::into)
            .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        v.parse::<u64>()
            .map(Into::into)
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de, Marker> Deserialize<'de> for Id<Marker> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(IdVisitor(PhantomData))
    }
}

impl<Marker> From<Snowflake> for Id<Marker> {
    fn from(value: Snowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for Snowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(Snowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Id, user::UserMarker};
    use serde_json::json;

    #[test]
    fn ids_serialize_as_strings() {
        // Above 2^53, where JSON numbers lose precision.
        let id = Id::<UserMarker>::from(237_636_687_323_201_536);

        assert_eq!(serde_json::to_value(id).unwrap(), json!("237636687323201536"));
    }

    #[test]
    fn ids_deserialize_from_strings_and_numbers() {
        let expected = Id::<UserMarker>::from(237_636_687_323_201_536);

        assert_eq!(
            serde_json::from_value::<Id<UserMarker>>(json!("237636687323201536")).unwrap(),
            expected
        );
        assert_eq!(
            serde_json::from_value::<Id<UserMarker>>(json!(237_636_687_323_201_536_u64)).unwrap(),
            expected
        );
        assert!(serde_json::from_value::<Id<UserMarker>>(json!("alice")).is_err());
        assert!(serde_json::from_value::<Id<UserMarker>>(json!(-1)).is_err());
    }
}
