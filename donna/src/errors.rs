use std::time::Duration;
use thiserror::Error;

/// Structured error types shared by the chat relay and the calendar client
#[derive(Error, Debug, Clone)]
pub enum DonnaError {
    /// Credentials missing, rejected or expired beyond refresh
    #[error("Authentication error: {service} authentication failed: {message}")]
    Auth { service: String, message: String },

    /// Provider asked us to slow down
    #[error("Rate limited by {service}{}", retry_hint(.retry_after))]
    RateLimited {
        service: String,
        retry_after: Option<Duration>,
    },

    /// Requested calendar, event or endpoint does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Connection failures, timeouts and 5xx responses
    #[error("Network error: {message}")]
    TransientNetwork { message: String },

    /// Any other non-success API response
    #[error("API error: {service} returned {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} is invalid: {message}")]
    Validation { field: String, message: String },

    /// Parsing errors (JSON, TOML, etc.)
    #[error("Parsing error: Failed to parse {format}: {message}")]
    Parsing { format: String, message: String },

    /// File system errors
    #[error("File system error: {operation} failed for path '{path}': {message}")]
    FileSystem {
        operation: String,
        path: String,
        message: String,
    },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {}s)", delay.as_secs()),
        None => String::new(),
    }
}

/// Result type alias using DonnaError
pub type DonnaResult<T> = std::result::Result<T, DonnaError>;

impl DonnaError {
    pub fn auth(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn file_system(
        operation: impl Into<String>,
        path: impl AsRef<std::path::Path>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self::FileSystem {
            operation: operation.into(),
            path: path.as_ref().display().to_string(),
            message: error.to_string(),
        }
    }

    /// Whether retrying the same request later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::TransientNetwork { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// 409: the resource (e.g. an event id) already exists
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }

    /// Delay the provider asked for, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<std::io::Error> for DonnaError {
    fn from(error: std::io::Error) -> Self {
        Self::FileSystem {
            operation: "io".to_string(),
            path: "unknown".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for DonnaError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parsing {
            format: "JSON".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for DonnaError {
    fn from(error: toml::de::Error) -> Self {
        Self::Parsing {
            format: "TOML".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<toml::ser::Error> for DonnaError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Parsing {
            format: "TOML".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<oauth2::url::ParseError> for DonnaError {
    fn from(error: oauth2::url::ParseError) -> Self {
        Self::Config {
            message: format!("Invalid URL: {}", error),
        }
    }
}

impl From<reqwest::Error> for DonnaError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            Self::TransientNetwork {
                message: format!("Connection failed: {}", error),
            }
        } else if error.is_decode() {
            Self::Parsing {
                format: "HTTP response body".to_string(),
                message: error.to_string(),
            }
        } else {
            Self::Api {
                service: "HTTP".to_string(),
                status: error.status().map(|s| s.as_u16()).unwrap_or_default(),
                message: error.to_string(),
            }
        }
    }
}
