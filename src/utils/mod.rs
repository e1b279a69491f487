//! The `utils` module provides the ambient pieces shared across `spotify-ws`:
//! error types, logging setup and OS signal handling.

pub mod error;
pub mod logging;
pub mod signal;

pub use error::{ServerError, UpstreamError};

#[cfg(test)]
mod tests {
    use super::error::UpstreamError;
    use super::logging;
    use std::time::Duration;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warning");
        logging::init("nonsense");
    }

    #[test]
    fn upstream_error_labels_are_stable() {
        let err = UpstreamError::Timeout(Duration::from_secs(1));
        assert_eq!(err.as_label(), "upstream_timeout");

        let err = UpstreamError::Status {
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(err.as_label(), "upstream_status");
        assert_eq!(err.to_string(), "upstream returned status 503: busy");
    }
}
