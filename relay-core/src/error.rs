//! Error types for the three collaborators the refresh engine talks to.
//!
//! None of these ever escape [`RefreshEngine`](crate::engine::RefreshEngine):
//! the engine logs them and folds them into a
//! [`RefreshOutcome`](crate::engine::RefreshOutcome).

use thiserror::Error;

/// Failure to obtain a position fix.
///
/// Codes follow the geolocation convention the device app was built against:
/// 1 = permission denied, 2 = position unavailable, 3 = timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied: {0}")]
    PermissionDenied(String),
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("location request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl LocationError {
    pub fn code(&self) -> u8 {
        match self {
            LocationError::PermissionDenied(_) => 1,
            LocationError::PositionUnavailable(_) => 2,
            LocationError::Timeout(_) => 3,
        }
    }
}

/// Failure to fetch or decode a weather observation.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no API key configured for the weather provider")]
    MissingApiKey,
    #[error("weather request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("weather request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to parse weather response: {0}")]
    Parse(String),
}

/// Failure to hand a message to the device link.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to encode device message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("device link write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("device rejected message: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn location_error_codes_follow_geolocation_convention() {
        assert_eq!(LocationError::PermissionDenied("no".into()).code(), 1);
        assert_eq!(LocationError::PositionUnavailable("gone".into()).code(), 2);
        assert_eq!(LocationError::Timeout(Duration::from_secs(15)).code(), 3);
    }

    #[test]
    fn status_error_mentions_status_code() {
        let err = FetchError::Status {
            status: 401,
            body: "invalid key".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("invalid key"));
    }
}
