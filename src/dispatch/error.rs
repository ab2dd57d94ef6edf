use thiserror::Error;

use crate::models::DispatchResult;

use super::transport::TransportError;

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const RECIPIENT_NOT_FOUND: &str = "RECIPIENT_NOT_FOUND";
pub const LOOKUP_FAILED: &str = "LOOKUP_FAILED";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),

    #[error("no delivery token registered for recipient {recipient_id}")]
    RecipientNotFound { recipient_id: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("token lookup failed: {0}")]
    Lookup(String),
}

impl DispatchError {
    pub fn missing_field(field: &str) -> Self {
        DispatchError::Validation(format!("missing required field: {field}"))
    }

    pub fn code(&self) -> &str {
        match self {
            DispatchError::Validation(_) => VALIDATION_ERROR,
            DispatchError::RecipientNotFound { .. } => RECIPIENT_NOT_FOUND,
            DispatchError::Transport(err) => &err.code,
            DispatchError::Lookup(_) => LOOKUP_FAILED,
        }
    }

    /// Error text without the code prefix transport errors carry in `Display`.
    pub fn message(&self) -> String {
        match self {
            DispatchError::Transport(err) => err.message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<DispatchError> for DispatchResult {
    fn from(err: DispatchError) -> Self {
        DispatchResult::failed(err.code(), err.message())
    }
}
