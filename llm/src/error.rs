use thiserror::Error;

/// Errors from talking to a model backend
#[derive(Debug, Error)]
pub enum LlmError {
    /// Connection, timeout, or body transfer failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Request could not be built for the target API
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            LlmError::Status { status, .. } => is_retryable_status(*status),
            LlmError::Serde(_) | LlmError::InvalidRequest(_) => false,
        }
    }

    /// Whether no further request to this backend can succeed (credentials, model)
    pub fn is_fatal(&self) -> bool {
        matches!(self, LlmError::Status { status: 401 | 403 | 404, .. })
    }
}

fn is_retryable_status(status: u16) -> bool {
    // 529 is the overloaded status
    matches!(status, 408 | 409 | 429 | 500..=599)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> LlmError {
        LlmError::Status {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_retryable() {
        for code in [408, 409, 429, 500, 502, 503, 529] {
            assert!(status(code).is_retryable(), "{code} should be retryable");
            assert!(!status(code).is_fatal());
        }
    }

    #[test]
    fn test_auth_errors_are_fatal() {
        for code in [401, 403, 404] {
            assert!(status(code).is_fatal(), "{code} should be fatal");
            assert!(!status(code).is_retryable());
        }
    }

    #[test]
    fn test_bad_request_is_neither() {
        let err = status(400);
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());

        let err = LlmError::InvalidRequest("bad role".to_string());
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_status_display() {
        let err = LlmError::Status {
            status: 429,
            body: "rate_limit_error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 429: rate_limit_error"
        );
    }
}
