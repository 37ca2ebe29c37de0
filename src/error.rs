use thiserror::Error;

/// Everything that can go wrong while fetching video statistics.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Missing or malformed caller input
    #[error("invalid input: {0}")]
    Validation(String),

    /// Network failure or non-2xx HTTP status
    #[error("request failed: {0}")]
    Transport(String),

    /// The response envelope did not have the expected shape
    #[error("malformed response: {0}")]
    ResponseFormat(String),

    /// The platform answered with a non-zero `code`
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },
}

pub type StatsResult<T> = Result<T, StatsError>;

impl StatsError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn format(reason: impl Into<String>) -> Self {
        Self::ResponseFormat(reason.into())
    }

    /// True when the caller, not the upstream service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = StatsError::Api {
            code: "-101".to_string(),
            message: "账号未登录".to_string(),
        };
        assert_eq!(err.to_string(), "API error -101: 账号未登录");
        assert_eq!(
            StatsError::format("empty list").to_string(),
            "malformed response: empty list"
        );
        assert!(StatsError::validation("cookie").is_client_error());
        assert!(!StatsError::Transport("timeout".to_string()).is_client_error());
    }
}
