//! Types exchanged with the MIME/MTOM processor.

use serde::Deserialize;
use std::collections::HashMap;

/// Content-type and header conventions for part classification.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MimeConfig {
    /// Substring identifying the SOAP envelope part.
    /// Default: application/soap+xml
    pub soap_content_type: String,

    /// Substring identifying the feed-notification (HL7 v2) part.
    /// Default: application/hl7-v2
    pub feed_content_type: String,

    /// Header carrying the attachment identifier.
    /// Default: Content-ID
    pub attachment_id_header: String,
}

impl Default for MimeConfig {
    fn default() -> Self {
        Self {
            soap_content_type: "application/soap+xml".to_string(),
            feed_content_type: "application/hl7-v2".to_string(),
            attachment_id_header: "Content-ID".to_string(),
        }
    }
}

/// A decoded generic part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub content_id: String,
    pub content_type: Option<String>,
    /// Content with any transfer encoding removed.
    pub content: Vec<u8>,
}

impl Attachment {
    /// Content as UTF-8 text, if it is.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// What `decode` hands back to the caller.
#[derive(Clone, Debug)]
pub struct DecodeOutcome {
    pub soap_part: String,
    pub attachments: HashMap<String, Attachment>,
    pub feed_signal_present: bool,
}

/// What `enrich` hands back to the caller.
#[derive(Clone, Debug)]
pub struct EnrichedMessage {
    /// The full re-encoded multipart message.
    pub message: Vec<u8>,
    /// Same attachments the preceding decode returned.
    pub attachments: HashMap<String, Attachment>,
}

/// New documents announced by a feed-notification part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedBatch {
    /// Originating facility, when known.
    pub facility: Option<String>,
    /// One entry per attachment id, in part order.
    pub document_ids: Vec<String>,
}

/// Receiver of feed batches. Called synchronously from `decode`.
pub trait FeedSink: Send + Sync {
    fn documents_available(&self, batch: &FeedBatch);
}
