//! Error types for plugbridge-cloud crate

use thiserror::Error;

/// Errors that can occur while talking to the eWeLink cloud
#[derive(Debug, Error)]
pub enum CloudError {
    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// No usable session (never logged in, logged out, or expired without refresh)
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Vendor rejected credentials, authorization code, signature or refresh token
    #[error("Authentication failed (error={code}): {message}")]
    Auth { code: i64, message: String },

    /// Non-zero vendor error code on an authenticated call
    #[error("Vendor error {code}: {message}")]
    Vendor { code: i64, message: String },

    /// Vendor answered with something that is not its JSON envelope
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// OAuth callback carried an unknown, reused or expired state
    #[error("Invalid OAuth state")]
    InvalidOAuthState,

    /// Malformed caller input, rejected before any outbound call
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl CloudError {
    /// Check if the caller has to (re-)authenticate
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            CloudError::NotAuthenticated | CloudError::Auth { .. } | CloudError::InvalidOAuthState
        )
    }

    /// Vendor error code, if the vendor produced one
    pub fn vendor_code(&self) -> Option<i64> {
        match self {
            CloudError::Auth { code, .. } | CloudError::Vendor { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Create an authentication error from a vendor code and message
    pub fn auth(code: i64, message: impl Into<String>) -> Self {
        CloudError::Auth {
            code,
            message: message.into(),
        }
    }

    /// Create a vendor error from a vendor code and message
    pub fn vendor(code: i64, message: impl Into<String>) -> Self {
        CloudError::Vendor {
            code,
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        CloudError::Validation(message.into())
    }
}

/// Result type for cloud operations
pub type CloudResult<T> = Result<T, CloudError>;
