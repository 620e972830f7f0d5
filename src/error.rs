/// Errors that abort the test sequence. Per-client failures are never
/// surfaced here; they are absorbed into run failure counts.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Failed to open results file '{0}': {1}")]
    ResultsSink(String, std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Errors reported by a protocol client. `Connection` covers the expected
/// failure mode (broker refused, timed out, dropped); anything else is
/// `Unexpected` and logged distinctly by the connection task.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("unexpected client error: {0}")]
    Unexpected(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn config_error_display() {
        let err = HarnessError::Config("missing broker URI".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing broker URI");
    }

    #[test]
    fn results_sink_display_names_the_file() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = HarnessError::ResultsSink("connection_test_1.csv".to_string(), io_err);
        assert_eq!(
            err.to_string(),
            "Failed to open results file 'connection_test_1.csv': denied"
        );
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: HarnessError = io_err.into();
        assert!(matches!(err, HarnessError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: pipe closed");
    }

    #[test]
    fn fatal_display() {
        let err = HarnessError::Fatal("failed to start Connection Task".to_string());
        assert_eq!(err.to_string(), "Fatal error: failed to start Connection Task");
    }

    #[test]
    fn client_error_variants_are_distinct() {
        let conn = ClientError::Connection("refused".to_string());
        let other = ClientError::Unexpected("bad state".to_string());
        assert!(matches!(conn, ClientError::Connection(_)));
        assert!(matches!(other, ClientError::Unexpected(_)));
        assert_eq!(conn.to_string(), "connection error: refused");
        assert_eq!(other.to_string(), "unexpected client error: bad state");
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HarnessError>();
        assert_send_sync::<ClientError>();
    }
}
