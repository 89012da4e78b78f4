use thiserror::Error;

use crate::session::SessionState;

/// Run tracker error types
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Cannot {action} while session is {from:?}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    #[error("Tracker task has shut down")]
    TrackerClosed,

    #[error("Malformed track encoding: {0}")]
    MalformedTrack(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

impl TrackerError {
    pub(crate) fn transition(from: SessionState, action: &'static str) -> Self {
        TrackerError::InvalidTransition { from, action }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message() {
        let err = TrackerError::transition(SessionState::Idle, "stop");
        assert_eq!(err.to_string(), "Cannot stop while session is Idle");
    }
}
