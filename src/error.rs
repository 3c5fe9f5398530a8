//! Error types for the mediator core.

use thiserror::Error;

/// Main error type for mediator operations.
#[derive(Debug, Error)]
pub enum MediatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- MIME / MTOM ---
    #[error("SOAP part wasn't found in mime multipart message")]
    MissingSoapPart,

    #[error("More than one SOAP part found in mime multipart message")]
    MultipleSoapParts,

    #[error("More than one feed-notification part found in mime multipart message")]
    MultipleFeedParts,

    #[error("There is no id for the document in part {part}")]
    MissingAttachmentId { part: usize },

    #[error("Ambiguous document id in part {part}: {count} id headers")]
    AmbiguousAttachmentId { part: usize, count: usize },

    #[error("Duplicate document id: {0}")]
    DuplicateAttachmentId(String),

    #[error("Unreadable content in part {part}: {reason}")]
    UnreadableContent { part: usize, reason: String },

    #[error("Malformed multipart message: {0}")]
    MalformedMultipart(String),

    #[error("Enriched SOAP part contains the multipart boundary")]
    BoundaryCollision,

    #[error("No previous mime message received for transaction {0}")]
    NoDecodedMessage(String),

    // --- Subscriptions ---
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Notification to {url} failed: {reason}")]
    Notification { url: String, reason: String },

    // --- Storage ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid journal format: {0}")]
    InvalidFormat(String),

    #[error("Data directory is locked by another process")]
    Locked,

    #[error("Data directory not initialized")]
    NotInitialized,
}

impl From<serde_json::Error> for MediatorError {
    fn from(e: serde_json::Error) -> Self {
        MediatorError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for MediatorError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        MediatorError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for MediatorError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        MediatorError::Deserialization(e.to_string())
    }
}

impl MediatorError {
    /// True for errors caused by a malformed inbound MIME message.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            MediatorError::MissingSoapPart
                | MediatorError::MultipleSoapParts
                | MediatorError::MultipleFeedParts
                | MediatorError::MissingAttachmentId { .. }
                | MediatorError::AmbiguousAttachmentId { .. }
                | MediatorError::DuplicateAttachmentId(_)
                | MediatorError::UnreadableContent { .. }
                | MediatorError::MalformedMultipart(_)
        )
    }
}

/// Result type for mediator operations.
pub type Result<T> = std::result::Result<T, MediatorError>;
