use thiserror::Error;

use crate::host::HostError;
use crate::notation::FormatError;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{operation} would create {count} clips, exceeding the maximum of {limit}")]
    LimitExceeded {
        operation: &'static str,
        count: usize,
        limit: usize,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl TransformError {
    pub fn validation(message: impl Into<String>) -> Self {
        TransformError::Validation(message.into())
    }

    /// Stable machine-readable error category
    pub fn kind(&self) -> &'static str {
        match self {
            TransformError::Validation(_) => "validation_error",
            TransformError::NotFound(_) => "not_found",
            TransformError::LimitExceeded { .. } => "limit_exceeded",
            TransformError::Format(_) => "format_error",
            TransformError::Host(HostError::NoSuchClip(_) | HostError::NoSuchTrack(_)) => "not_found",
            TransformError::Host(_) => "host_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_message_names_count_and_limit() {
        let err = TransformError::LimitExceeded {
            operation: "slicing",
            count: 80,
            limit: 64,
        };
        assert_eq!(
            err.to_string(),
            "slicing would create 80 clips, exceeding the maximum of 64"
        );
        assert_eq!(err.kind(), "limit_exceeded");
    }
}
