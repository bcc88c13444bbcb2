//! Module for working with snowflake IDs.
//!
//! A snowflake packs, from most to least significant bit, 42 bits of milliseconds since
//! [`FLOCK_EPOCH`], a 5 bit worker id, a 5 bit process id and a 12 bit increment.
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::{Duration, UtcDateTime, macros::utc_datetime};

pub const FLOCK_EPOCH: UtcDateTime = utc_datetime!(2025-01-01 00:00);

pub const TIMESTAMP_OFFSET: u64 = 22;
pub const TIMESTAMP_LENGTH: u64 = 42;

pub const WORKER_ID_OFFSET: u64 = 17;
pub const WORKER_ID_LENGTH: u64 = 5;

pub const PROCESS_ID_OFFSET: u64 = 12;
pub const PROCESS_ID_LENGTH: u64 = 5;

pub const INCREMENT_OFFSET: u64 = 0;
pub const INCREMENT_LENGTH: u64 = 12;

const fn mask(length: u64) -> u64 {
    (1 << length) - 1
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampFromDateTimeError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Snowflake part was out of range for creation: {0}")]
pub struct SnowflakePartOutOfRangeError(u64);

macro_rules! snowflake_part {
    ($name:ident: $repr:ty, offset = $offset:ident, len = $length:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            pub const MAX: $repr = mask($length) as $repr;

            #[must_use]
            pub fn new(value: $repr) -> Option<Self> {
                (u64::from(value) <= mask($length)).then_some(Self(value))
            }

            #[must_use]
            pub fn get(self) -> $repr {
                self.0
            }

            #[allow(clippy::cast_possible_truncation)]
            fn extract(snowflake: Snowflake) -> Self {
                Self(((snowflake.get() >> $offset) & mask($length)) as $repr)
            }

            fn shifted(self) -> u64 {
                u64::from(self.0) << $offset
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = SnowflakePartOutOfRangeError;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(SnowflakePartOutOfRangeError(value.into()))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let inner = <$repr as Deserialize<'de>>::deserialize(deserializer)?;
                Self::new(inner).ok_or_else(|| {
                    Error::invalid_value(Unexpected::Unsigned(inner.into()), &stringify!($name))
                })
            }
        }
    };
}

snowflake_part!(WorkerId: u8, offset = WORKER_ID_OFFSET, len = WORKER_ID_LENGTH);
snowflake_part!(ProcessId: u8, offset = PROCESS_ID_OFFSET, len = PROCESS_ID_LENGTH);
snowflake_part!(SnowflakeIncrement: u16, offset = INCREMENT_OFFSET, len = INCREMENT_LENGTH);
snowflake_part!(SnowflakeTimestamp: u64, offset = TIMESTAMP_OFFSET, len = TIMESTAMP_LENGTH);

impl SnowflakeIncrement {
    #[must_use]
    pub fn next(self) -> Self {
        Self((self.0 + 1) & Self::MAX)
    }

    pub fn increment(&mut self) {
        *self = self.next();
    }
}

impl SnowflakeTimestamp {
    /// Clamps times outside the representable range to its bounds.
    #[must_use]
    pub fn saturating_from_time(value: UtcDateTime) -> Self {
        match Self::try_from(value) {
            Ok(timestamp) => timestamp,
            Err(SnowflakeTimestampFromDateTimeError::TimeBeforeEpoch) => Self(0),
            Err(SnowflakeTimestampFromDateTimeError::TimestampTooLarge) => Self(Self::MAX),
        }
    }
}

impl TryFrom<UtcDateTime> for SnowflakeTimestamp {
    type Error = SnowflakeTimestampFromDateTimeError;

    fn try_from(value: UtcDateTime) -> Result<Self, Self::Error> {
        let millis = (value - FLOCK_EPOCH).whole_milliseconds();
        if millis < 0 {
            return Err(Self::Error::TimeBeforeEpoch);
        }
        let millis = u64::try_from(millis).map_err(|_| Self::Error::TimestampTooLarge)?;
        Self::new(millis).ok_or(Self::Error::TimestampTooLarge)
    }
}

impl From<SnowflakeTimestamp> for UtcDateTime {
    fn from(value: SnowflakeTimestamp) -> Self {
        // 42 bits always fit into an i64.
        #[allow(clippy::cast_possible_wrap)]
        let millis = value.0 as i64;
        FLOCK_EPOCH + Duration::milliseconds(millis)
    }
}

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Snowflake(u64);

impl Snowflake {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner)
    }

    #[must_use]
    pub fn from_parts(
        timestamp: SnowflakeTimestamp,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: SnowflakeIncrement,
    ) -> Self {
        Self(timestamp.shifted() | worker_id.shifted() | process_id.shifted() | increment.shifted())
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp(self) -> SnowflakeTimestamp {
        SnowflakeTimestamp::extract(self)
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime {
        self.timestamp().into()
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        WorkerId::extract(self)
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        ProcessId::extract(self)
    }

    #[must_use]
    pub fn increment(self) -> SnowflakeIncrement {
        SnowflakeIncrement::extract(self)
    }
}

impl Display for Snowflake {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Snowflake> for u64 {
    fn from(value: Snowflake) -> Self {
        value.get()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator {
    worker_id: WorkerId,
    process_id: ProcessId,
    last_timestamp: SnowflakeTimestamp,
    next_increment: SnowflakeIncrement,
}

impl SnowflakeGenerator {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last_timestamp: SnowflakeTimestamp::default(),
            next_increment: SnowflakeIncrement::default(),
        }
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        self.process_id
    }

    /// Never repeats an id as long as the timestamp range is not exhausted.
    ///
    /// Times at or before the last generated timestamp reuse it. Once a millisecond runs out of
    /// increments, generation continues in the next one.
    pub fn generate_at(&mut self, time: UtcDateTime) -> Snowflake {
        let timestamp = SnowflakeTimestamp::saturating_from_time(time);
        if timestamp > self.last_timestamp {
            self.last_timestamp = timestamp;
            self.next_increment = SnowflakeIncrement::default();
        }

        let snowflake = Snowflake::from_parts(
            self.last_timestamp,
            self.worker_id,
            self.process_id,
            self.next_increment,
        );

        self.next_increment.increment();
        if self.next_increment == SnowflakeIncrement::default() {
            if let Some(next) = SnowflakeTimestamp::new(self.last_timestamp.get() + 1) {
                self.last_timestamp = next;
            }
        }

        snowflake
    }

    pub fn generate(&mut self) -> Snowflake {
        self.generate_at(UtcDateTime::now())
    }
}
