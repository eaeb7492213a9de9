use thiserror::Error;

/// Errors that can occur while talking to the submission, upload or status
/// endpoints
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure before a status line was received
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("request failed with status {status}")]
    Status { status: u16, body: String },

    /// The body was received but could not be understood
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::MalformedPayload(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::MalformedPayload(err.to_string())
    }
}

/// Why a file was refused before upload
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("{name} is too large ({size} bytes, limit {limit})")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("{name} has an unsupported type ({content_type})")]
    UnsupportedType { name: String, content_type: String },
}

impl Rejection {
    pub fn file_name(&self) -> &str {
        match self {
            Rejection::TooLarge { name, .. } | Rejection::UnsupportedType { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("message {0} already exists")]
    DuplicateId(crate::api::MessageId),
}

/// Errors surfaced by `Conversation::submit`
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The conversation was reset while the submission was in flight
    #[error("submission cancelled by session reset")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session id unavailable: {0}")]
    Session(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
