use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Recv(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("converter fault {code}: {message}")]
    Upstream { code: i32, message: String },

    #[error("request queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("all {attempts} attempts failed: {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: Box<ConvertError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Whether the balancer may retry this attempt on another backend.
    ///
    /// Transport failures, timeouts, malformed responses and backend
    /// faults are transient from the pool's point of view; everything
    /// else is reported to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConvertError::Connect(_)
                | ConvertError::Send(_)
                | ConvertError::Recv(_)
                | ConvertError::Timeout(_)
                | ConvertError::MalformedResponse(_)
                | ConvertError::Upstream { .. }
                | ConvertError::Io(_)
        )
    }
}

impl From<quick_xml::Error> for ConvertError {
    fn from(err: quick_xml::Error) -> Self {
        ConvertError::MalformedResponse(format!("XML parse error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ConvertError::Connect("refused".to_string()).is_retryable());
        assert!(ConvertError::Send("broken pipe".to_string()).is_retryable());
        assert!(ConvertError::Recv("reset".to_string()).is_retryable());
        assert!(ConvertError::Timeout(5000).is_retryable());
        assert!(ConvertError::MalformedResponse("truncated".to_string()).is_retryable());
        assert!(ConvertError::Upstream {
            code: 1,
            message: "bad".to_string()
        }
        .is_retryable());

        assert!(!ConvertError::InvalidConfig("empty pool".to_string()).is_retryable());
        assert!(!ConvertError::InvalidArgument("missing input".to_string()).is_retryable());
        assert!(!ConvertError::QueueUnavailable("full".to_string()).is_retryable());
        assert!(!ConvertError::ExhaustedRetries {
            attempts: 3,
            source: Box::new(ConvertError::Timeout(100)),
        }
        .is_retryable());
    }

    #[test]
    fn test_exhausted_retries_preserves_source() {
        let err = ConvertError::ExhaustedRetries {
            attempts: 3,
            source: Box::new(ConvertError::Upstream {
                code: 7,
                message: "no filter".to_string(),
            }),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("3 attempts"));
        assert!(rendered.contains("fault 7"));
    }
}
