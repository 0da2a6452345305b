use thiserror::Error;

/// Broad classification of an [`AuthError`], used by callers that only care
/// about which part of the run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed setting for the selected strategy.
    Configuration,
    /// The callback did not carry the CSRF state we issued.
    Security,
    /// No usable token could be obtained.
    Authentication,
    /// The Box API rejected a resource operation.
    Vendor,
    /// Network, filesystem, listener or encoding failure.
    Transport,
}

/// Errors raised while authenticating against Box or calling its API
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Access token expired or invalid")]
    TokenExpired,

    #[error("Invalid authorization code: {0}")]
    InvalidCode(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Callback server error: {0}")]
    CallbackServerError(String),

    #[error("Access denied by the user")]
    AccessDenied,

    #[error("OAuth2 state mismatch, refusing to exchange the authorization code")]
    InvalidState,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Timed out waiting for the OAuth2 callback")]
    Timeout,

    #[error("Private key error: {0}")]
    KeyError(String),

    #[error("Box API error [{status}] {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Security => "security",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Vendor => "box_api",
            ErrorKind::Transport => "transport",
        }
    }
}

impl AuthError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn callback_error(msg: impl Into<String>) -> Self {
        Self::CallbackServerError(msg.into())
    }

    pub fn browser_error(msg: impl Into<String>) -> Self {
        Self::BrowserError(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn key_error(msg: impl Into<String>) -> Self {
        Self::KeyError(msg.into())
    }

    pub fn api_error(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError(_) => ErrorKind::Configuration,
            Self::InvalidState => ErrorKind::Security,
            Self::TokenExpired
            | Self::InvalidCode(_)
            | Self::Authentication(_)
            | Self::AccessDenied => ErrorKind::Authentication,
            Self::Api { .. } => ErrorKind::Vendor,
            Self::NetworkError(_)
            | Self::IoError(_)
            | Self::SerializationError(_)
            | Self::CallbackServerError(_)
            | Self::BrowserError(_)
            | Self::Timeout
            | Self::KeyError(_) => ErrorKind::Transport,
        }
    }

    /// True for a 409 conflict reported by the Box API.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }
}

/// Result alias used across the crate
pub type AuthResult<T> = Result<T, AuthError>;
