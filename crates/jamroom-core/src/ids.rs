use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::ValidationError;

/// Longest session id accepted from a client.
pub const MAX_SESSION_ID_LEN: usize = 128;
/// Longest peer id accepted from a client.
pub const MAX_PEER_ID_LEN: usize = 256;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string without validation (trusted sources only).
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(SessionId);
opaque_id!(ConnectionId);
opaque_id!(PeerId);

impl SessionId {
    /// Generate a fresh random (version-4 UUID) session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied session id.
    ///
    /// Ids end up in redirect paths and room keys, so only URL-safe
    /// characters are allowed.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::Empty("sessionId"));
        }
        if raw.len() > MAX_SESSION_ID_LEN {
            return Err(ValidationError::TooLong {
                field: "sessionId",
                max: MAX_SESSION_ID_LEN,
            });
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(ValidationError::InvalidCharacter {
                field: "sessionId",
                found: c,
            });
        }
        Ok(Self(raw.to_owned()))
    }
}

impl ConnectionId {
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerId {
    /// Accept a client-supplied peer id. Contents are never interpreted.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::Empty("peerId"));
        }
        if raw.len() > MAX_PEER_ID_LEN {
            return Err(ValidationError::TooLong {
                field: "peerId",
                max: MAX_PEER_ID_LEN,
            });
        }
        Ok(Self(raw.to_owned()))
    }
}
