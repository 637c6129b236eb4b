/// Rejected client input.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} exceeds {max} bytes")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} contains invalid character {found:?}")]
    InvalidCharacter { field: &'static str, found: char },

    #[error("unknown visibility: {0}")]
    UnknownVisibility(String),

    #[error("missing required field: {0}")]
    Missing(&'static str),
}

impl ValidationError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Empty(_) => "empty",
            Self::TooLong { .. } => "too_long",
            Self::InvalidCharacter { .. } => "invalid_character",
            Self::UnknownVisibility(_) => "unknown_visibility",
            Self::Missing(_) => "missing",
        }
    }
}
