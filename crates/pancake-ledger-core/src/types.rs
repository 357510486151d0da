//! Strong type definitions for the Pancake ledger.
//!
//! All identifiers are newtypes to prevent misuse at compile time. Packet,
//! ledger and entry identifiers are ULIDs: 26-character Crockford base32
//! tokens that sort lexicographically by creation time (millisecond
//! resolution; ties within one millisecond are ordered randomly).

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate a fresh identifier stamped with the current time.
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Generate a fresh identifier stamped with the given time.
            pub fn at(time: DateTime<Utc>) -> Self {
                Self(Ulid::from_datetime(SystemTime::from(time)))
            }

            /// Parse from the 26-character string form.
            pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
                Ulid::from_string(s).map(Self)
            }

            /// The underlying ULID.
            pub const fn as_ulid(&self) -> &Ulid {
                &self.0
            }

            /// Milliseconds since the Unix epoch encoded in the identifier.
            pub fn timestamp_ms(&self) -> u64 {
                self.0.timestamp_ms()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_string(s)
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }
    };
}

ulid_id!(
    /// Identifier of a packet (`Header.id`).
    PacketId
);

ulid_id!(
    /// Identifier of an engagement ledger (MEAL).
    LedgerId
);

ulid_id!(
    /// Identifier of one entry inside a ledger.
    EntryId
);

/// Opaque identifier for a geographic location or boundary.
///
/// GeoIDs are resolved by an external collaborator; the ledger never
/// interprets them beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeoId(String);

impl GeoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for GeoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GeoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GeoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for GeoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Render a timestamp in the form used inside hashed records:
/// UTC, RFC 3339, millisecond precision, `Z` suffix.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an absolute timestamp.
///
/// Accepts RFC 3339 with any offset, and offset-less ISO 8601 date-times,
/// which are taken to be UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
