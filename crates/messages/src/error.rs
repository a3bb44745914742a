use std::error::Error as StdError;

/// Crate-wide result type for ingestion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed ingestion errors shared by the normalizer, stores and service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An envelope or item could not be interpreted.
    #[error("malformed payload: {message}")]
    MalformedPayload { message: String },

    /// A caller-supplied field is missing or invalid.
    #[error("{message}")]
    Validation { message: String },

    /// No stored record matches the given identifier.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// The backing store failed to read or write.
    #[error("storage operation failed: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A change notification could not be delivered. Never surfaced to
    /// ingestion callers.
    #[error("broadcast failed: {message}")]
    Broadcast { message: String },
}

impl Error {
    #[must_use]
    pub fn malformed(message: impl std::fmt::Display) -> Self {
        Self::MalformedPayload {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn validation(message: impl std::fmt::Display) -> Self {
        Self::Validation {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn not_found(what: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn storage(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn broadcast(message: impl std::fmt::Display) -> Self {
        Self::Broadcast {
            message: message.to_string(),
        }
    }

    /// Stable machine-readable kind, used in API error bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Storage { .. } => "storage_error",
            Self::Broadcast { .. } => "broadcast_error",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err)
    }
}
