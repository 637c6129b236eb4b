//! Session records as stored by the directory.
//!
//! A record is a free-form JSON document: whatever fields the creator sent,
//! plus the generated `sessionId`. Only `visibility` and `genre` carry
//! meaning for the directory.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ValidationError;
use crate::ids::SessionId;

pub const VISIBILITY_FIELD: &str = "visibility";
pub const GENRE_FIELD: &str = "genre";
pub const SESSION_ID_FIELD: &str = "sessionId";
/// Separates tags inside one `genreTags` query value.
pub const GENRE_SEPARATOR: char = ',';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Private => write!(f, "private"),
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(ValidationError::UnknownVisibility(other.to_string())),
        }
    }
}

/// Validated input for `create`: caller fields plus the two the directory
/// indexes on.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionDraft {
    pub visibility: Visibility,
    pub genres: Vec<String>,
    pub fields: Map<String, Value>,
}

impl SessionDraft {
    /// Build a draft from arbitrary JSON fields.
    ///
    /// A missing `visibility` defaults to private so the session never
    /// shows up in public listings by accident. A caller-supplied
    /// `sessionId` is discarded; the directory always assigns its own.
    /// Genres may not contain a comma, which separates tags in listing
    /// queries.
    pub fn from_fields(mut fields: Map<String, Value>) -> Result<Self, ValidationError> {
        let visibility = match fields.get(VISIBILITY_FIELD) {
            None => Visibility::Private,
            Some(Value::String(s)) => s.parse()?,
            Some(other) => return Err(ValidationError::UnknownVisibility(other.to_string())),
        };
        let _ = fields.insert(
            VISIBILITY_FIELD.to_string(),
            Value::String(visibility.to_string()),
        );
        let _ = fields.remove(SESSION_ID_FIELD);
        let genres = genre_tags(fields.get(GENRE_FIELD));
        if genres.iter().any(|tag| tag.contains(GENRE_SEPARATOR)) {
            return Err(ValidationError::InvalidCharacter {
                field: GENRE_FIELD,
                found: GENRE_SEPARATOR,
            });
        }
        Ok(Self {
            visibility,
            genres,
            fields,
        })
    }

    /// Build a draft from urlencoded form pairs. Repeated keys become arrays.
    pub fn from_form(pairs: Vec<(String, String)>) -> Result<Self, ValidationError> {
        let mut fields = Map::new();
        for (key, value) in pairs {
            match fields.get_mut(&key) {
                None => {
                    let _ = fields.insert(key, Value::String(value));
                }
                Some(Value::Array(values)) => values.push(Value::String(value)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
            }
        }
        Self::from_fields(fields)
    }

    /// Attach the generated id, producing the stored record.
    pub fn into_record(self, session_id: SessionId) -> SessionRecord {
        SessionRecord {
            session_id,
            fields: self.fields,
        }
    }
}

/// A stored session document: `{...fields, sessionId}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SessionRecord {
    /// Visibility as stored; anything unrecognized reads as private.
    pub fn visibility(&self) -> Visibility {
        self.fields
            .get(VISIBILITY_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(Visibility::Private)
    }

    pub fn genres(&self) -> Vec<String> {
        genre_tags(self.fields.get(GENRE_FIELD))
    }
}

/// Tags carried by a `genre` value: a single string or an array of strings.
pub fn genre_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}
