use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request rejected (HTTP {status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Validation { status: u16, detail: Option<String> },

    #[error("Server error (HTTP {status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Server { status: u16, detail: Option<String> },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("an upload is already in progress")]
    UploadInProgress,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    General(String),
}

/// Coarse classification used by callers to pick a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Validation,
    Server,
    Local,
}

impl AppError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Server { .. } | Self::Protocol(_) => ErrorKind::Server,
            _ => ErrorKind::Local,
        }
    }

    /// The `detail` text from the server's error body, if it sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Validation { detail, .. } | Self::Server { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
