use store::StoreError;
use thiserror::Error;

/// Failure of a load, query or clear. The `Display` text is the message
/// reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{detail}")]
    SourceUnavailable { status: Option<u16>, detail: String },
    #[error("size limit exceeded")]
    SizeLimitExceeded { limit: usize, observed: u64 },
    #[error("{context}")]
    BackendUnavailable {
        context: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("error while uploading to a blob")]
    ArchivalFailed(#[source] StoreError),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RosterError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn backend(context: &'static str, source: StoreError) -> Self {
        Self::BackendUnavailable { context, source }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::SizeLimitExceeded { .. } => "size_limit_exceeded",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::ArchivalFailed(_) => "archival_failed",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<StoreError> for RosterError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Configuration(message) => Self::Configuration(message),
            other => Self::backend("storage backend unavailable", other),
        }
    }
}
