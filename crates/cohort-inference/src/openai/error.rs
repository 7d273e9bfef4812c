//! Classification of OpenAI error responses.

use cohort_core::Error;

/// Error categories reported by OpenAI-compatible endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    AuthenticationError,
    RateLimitExceeded,
    ModelNotFound,
    ContextLengthExceeded,
    ServerError,
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) | (403, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "authentication failed",
            Self::RateLimitExceeded => "rate limit exceeded",
            Self::ModelNotFound => "model not found",
            Self::ContextLengthExceeded => "context too long",
            Self::ServerError => "server error",
            Self::Unknown => "request rejected",
        }
    }

    /// Whether a later run is likely to succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Every provider failure surfaces as [`Error::Provider`]; the code only
/// shapes the message.
pub fn to_provider_error(code: OpenAIErrorCode, status: u16, message: &str) -> Error {
    Error::Provider(format!("{} ({}): {}", code.as_str(), status, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_from_status() {
        assert_eq!(
            OpenAIErrorCode::from_response(401, "invalid_api_key"),
            OpenAIErrorCode::AuthenticationError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(429, "rate_limit_exceeded"),
            OpenAIErrorCode::RateLimitExceeded
        );
        assert_eq!(
            OpenAIErrorCode::from_response(502, "bad_gateway"),
            OpenAIErrorCode::ServerError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(418, "im_a_teapot"),
            OpenAIErrorCode::Unknown
        );
    }

    #[test]
    fn test_context_length() {
        assert_eq!(
            OpenAIErrorCode::from_response(400, "context_length_exceeded"),
            OpenAIErrorCode::ContextLengthExceeded
        );
    }

    #[test]
    fn test_transient() {
        assert!(OpenAIErrorCode::ServerError.is_transient());
        assert!(!OpenAIErrorCode::ModelNotFound.is_transient());
    }

    #[test]
    fn test_to_provider_error() {
        let err = to_provider_error(OpenAIErrorCode::RateLimitExceeded, 429, "slow down");
        assert!(matches!(err, Error::Provider(_)));
        assert!(err
            .to_string()
            .contains("rate limit exceeded (429): slow down"));
    }
}
