//! Branded ID newtypes for type safety.
//!
//! Every entity in the system has a distinct ID type implemented as a newtype
//! wrapper around `String`. This prevents accidentally passing a session ID
//! where an attempt ID is expected.
//!
//! Generated IDs are a short entity prefix plus a UUID v7 (time-ordered),
//! e.g. `sess_0193…`. Externally supplied IDs (from the roster or the auth
//! layer) are wrapped as-is via `From`/`from_string`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (`<prefix>_<uuid-v7>`, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a test session.
    SessionId, "sess"
}

branded_id! {
    /// Unique identifier for a student's attempt.
    AttemptId, "att"
}

branded_id! {
    /// Unique identifier for a text highlight within an attempt.
    HighlightId, "hl"
}

branded_id! {
    /// Unique identifier for a user (student or teacher), issued by the
    /// auth layer.
    UserId, "user"
}

branded_id! {
    /// Unique identifier for a class.
    ClassId, "class"
}

branded_id! {
    /// Unique identifier for a test definition.
    TestId, "test"
}

branded_id! {
    /// Unique identifier for a question within a test.
    QuestionId, "q"
}

branded_id! {
    /// Unique identifier for a reading passage within a test.
    PassageId, "psg"
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
