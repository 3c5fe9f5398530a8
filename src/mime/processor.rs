//! MTOM/XOP decode and enrich.

use super::multipart::{content_type_param, BodyPart, Multipart};
use super::types::{
    Attachment, DecodeOutcome, EnrichedMessage, FeedBatch, FeedSink, MimeConfig,
};
use crate::error::{MediatorError, Result};
use crate::types::TransactionId;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a part was classified.
enum PartKind {
    Soap,
    Feed,
    Attachment,
}

/// One decoded message, held between `decode` and `enrich`.
///
/// Retains the full envelope so `enrich` can write it back with only the
/// SOAP part's content replaced.
#[derive(Clone, Debug)]
pub struct DecodedMessage {
    envelope: Multipart,
    soap_index: usize,
    soap_part: String,
    attachments: HashMap<String, Attachment>,
    /// Attachment ids in part order.
    attachment_order: Vec<String>,
    feed_signal_present: bool,
    /// Sending facility from the feed part, if it carried one.
    feed_facility: Option<String>,
}

impl DecodedMessage {
    /// Parse `raw` as a multipart message described by `content_type`.
    pub fn decode(raw: &[u8], content_type: &str, config: &MimeConfig) -> Result<Self> {
        let boundary = content_type_param(content_type, "boundary").ok_or_else(|| {
            MediatorError::MalformedMultipart(format!("no boundary in {content_type:?}"))
        })?;
        let envelope = Multipart::parse(raw, &boundary)?;

        let mut soap: Option<(usize, String)> = None;
        let mut attachments = HashMap::new();
        let mut attachment_order = Vec::new();
        let mut feed_signal_present = false;
        let mut feed_facility = None;

        for (index, part) in envelope.parts().iter().enumerate() {
            match classify(part, config) {
                PartKind::Soap => {
                    if soap.is_some() {
                        return Err(MediatorError::MultipleSoapParts);
                    }
                    let content = decode_content(part, index)?;
                    let text = String::from_utf8(content).map_err(|_| {
                        MediatorError::UnreadableContent {
                            part: index,
                            reason: "SOAP part is not valid UTF-8".into(),
                        }
                    })?;
                    debug!(part = index, "SOAP part");
                    soap = Some((index, text));
                }
                PartKind::Feed => {
                    if feed_signal_present {
                        return Err(MediatorError::MultipleFeedParts);
                    }
                    let content = decode_content(part, index)?;
                    feed_signal_present = true;
                    feed_facility = hl7_sending_facility(&String::from_utf8_lossy(&content));
                    debug!(part = index, facility = ?feed_facility, "Feed notification part");
                }
                PartKind::Attachment => {
                    let content_id = attachment_id(part, index, &config.attachment_id_header)?;
                    if attachments.contains_key(&content_id) {
                        return Err(MediatorError::DuplicateAttachmentId(content_id));
                    }
                    let attachment = Attachment {
                        content_id: content_id.clone(),
                        content_type: part.content_type().map(str::to_string),
                        content: decode_content(part, index)?,
                    };
                    debug!(part = index, content_id = %content_id, "Attachment part");
                    attachment_order.push(content_id.clone());
                    attachments.insert(content_id, attachment);
                }
            }
        }

        let (soap_index, soap_part) = soap.ok_or(MediatorError::MissingSoapPart)?;

        Ok(Self {
            envelope,
            soap_index,
            soap_part,
            attachments,
            attachment_order,
            feed_signal_present,
            feed_facility,
        })
    }

    pub fn soap_part(&self) -> &str {
        &self.soap_part
    }

    pub fn attachments(&self) -> &HashMap<String, Attachment> {
        &self.attachments
    }

    pub fn attachment_ids(&self) -> &[String] {
        &self.attachment_order
    }

    pub fn feed_signal_present(&self) -> bool {
        self.feed_signal_present
    }

    /// The batch to announce, if a feed part was present.
    pub fn feed_batch(&self, default_facility: Option<&str>) -> Option<FeedBatch> {
        if !self.feed_signal_present {
            return None;
        }
        Some(FeedBatch {
            facility: self
                .feed_facility
                .clone()
                .or_else(|| default_facility.map(str::to_string)),
            document_ids: self.attachment_order.clone(),
        })
    }

    /// Re-encode the original envelope with `soap_part` as the SOAP content.
    ///
    /// The SOAP part keeps its original headers, so a base64 transfer
    /// encoding is re-applied to the new content.
    pub fn enrich(&self, soap_part: &str) -> Result<Vec<u8>> {
        let part = &self.envelope.parts()[self.soap_index];
        let body = match transfer_encoding(part).as_deref() {
            Some("base64") => STANDARD.encode(soap_part.as_bytes()).into_bytes(),
            _ => soap_part.as_bytes().to_vec(),
        };

        let mut envelope = self.envelope.clone();
        envelope.set_body(self.soap_index, body)?;
        Ok(envelope.to_bytes())
    }

    fn outcome(&self) -> DecodeOutcome {
        DecodeOutcome {
            soap_part: self.soap_part.clone(),
            attachments: self.attachments.clone(),
            feed_signal_present: self.feed_signal_present,
        }
    }
}

fn classify(part: &BodyPart, config: &MimeConfig) -> PartKind {
    let content_type = part.content_type().unwrap_or("text/plain").to_ascii_lowercase();
    if content_type.contains(&config.soap_content_type.to_ascii_lowercase()) {
        PartKind::Soap
    } else if content_type.contains(&config.feed_content_type.to_ascii_lowercase()) {
        PartKind::Feed
    } else {
        PartKind::Attachment
    }
}

fn attachment_id(part: &BodyPart, index: usize, header: &str) -> Result<String> {
    match part.header_values(header).as_slice() {
        [] => Err(MediatorError::MissingAttachmentId { part: index }),
        [id] => Ok(id.to_string()),
        ids => Err(MediatorError::AmbiguousAttachmentId {
            part: index,
            count: ids.len(),
        }),
    }
}

fn transfer_encoding(part: &BodyPart) -> Option<String> {
    part.header("Content-Transfer-Encoding")
        .map(|v| v.trim().to_ascii_lowercase())
}

/// Body bytes with the transfer encoding removed.
fn decode_content(part: &BodyPart, index: usize) -> Result<Vec<u8>> {
    match transfer_encoding(part).as_deref() {
        None | Some("7bit") | Some("8bit") | Some("binary") => Ok(part.body().to_vec()),
        Some("base64") => {
            let compact: Vec<u8> = part
                .body()
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(compact)
                .map_err(|e| MediatorError::UnreadableContent {
                    part: index,
                    reason: format!("invalid base64: {e}"),
                })
        }
        Some(other) => Err(MediatorError::UnreadableContent {
            part: index,
            reason: format!("unsupported transfer encoding {other:?}"),
        }),
    }
}

/// MSH-4 (first component) of an HL7 v2 message.
fn hl7_sending_facility(message: &str) -> Option<String> {
    let msh = message
        .split(|c| c == '\r' || c == '\n')
        .map(str::trim_start)
        .find(|segment| segment.starts_with("MSH"))?;

    let field_sep = msh[3..].chars().next()?;
    let fields: Vec<&str> = msh.split(field_sep).collect();
    let component_sep = fields.get(1)?.chars().next().unwrap_or('^');

    let facility = fields.get(3)?.split(component_sep).next()?.trim();
    if facility.is_empty() {
        None
    } else {
        Some(facility.to_string())
    }
}

/// Decodes inbound MTOM/XOP messages and re-encodes enriched SOAP parts.
///
/// Each transaction id holds at most one decoded message. A second decode
/// for the same id discards the first; a failed decode leaves the id idle.
pub struct MimeProcessor {
    config: MimeConfig,
    default_facility: Option<String>,
    feed_sink: Option<Arc<dyn FeedSink>>,
    sessions: Mutex<HashMap<TransactionId, DecodedMessage>>,
}

impl MimeProcessor {
    pub fn new(config: MimeConfig) -> Self {
        Self {
            config,
            default_facility: None,
            feed_sink: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Forward feed batches to `sink`.
    pub fn with_feed_sink(mut self, sink: Arc<dyn FeedSink>) -> Self {
        self.feed_sink = Some(sink);
        self
    }

    /// Facility for feed batches whose HL7 part names none.
    pub fn with_default_facility(mut self, facility: Option<String>) -> Self {
        self.default_facility = facility;
        self
    }

    pub fn config(&self) -> &MimeConfig {
        &self.config
    }

    /// Decode `raw` and hold it for a later `enrich` under `txn`.
    ///
    /// If the message carries a feed-notification part, the attachment ids
    /// are handed to the feed sink before this returns.
    pub fn decode(
        &self,
        txn: &TransactionId,
        raw: &[u8],
        content_type: &str,
    ) -> Result<DecodeOutcome> {
        let decoded = match DecodedMessage::decode(raw, content_type, &self.config) {
            Ok(decoded) => decoded,
            Err(e) => {
                if self.sessions.lock().remove(txn).is_some() {
                    warn!(txn = %txn, "Discarded pending message after failed decode");
                }
                return Err(e);
            }
        };

        let outcome = decoded.outcome();
        let batch = decoded.feed_batch(self.default_facility.as_deref());

        if self.sessions.lock().insert(txn.clone(), decoded).is_some() {
            warn!(txn = %txn, "Discarded pending message that was never enriched");
        }
        info!(
            txn = %txn,
            attachments = outcome.attachments.len(),
            feed = outcome.feed_signal_present,
            "Decoded mime message"
        );

        if let (Some(batch), Some(sink)) = (batch, self.feed_sink.as_ref()) {
            sink.documents_available(&batch);
        }

        Ok(outcome)
    }

    /// Re-encode the message decoded under `txn` with a new SOAP part.
    ///
    /// On success the pending message is released; on failure it stays so
    /// the caller can retry.
    pub fn enrich(&self, txn: &TransactionId, soap_part: &str) -> Result<EnrichedMessage> {
        let decoded = self
            .sessions
            .lock()
            .remove(txn)
            .ok_or_else(|| MediatorError::NoDecodedMessage(txn.to_string()))?;

        let message = match decoded.enrich(soap_part) {
            Ok(message) => message,
            Err(e) => {
                // A decode that landed meanwhile supersedes this session
                self.sessions.lock().entry(txn.clone()).or_insert(decoded);
                return Err(e);
            }
        };
        let attachments = decoded.attachments;

        info!(txn = %txn, bytes = message.len(), "Enriched mime message");
        Ok(EnrichedMessage {
            message,
            attachments,
        })
    }

    /// Drop a pending message without enriching it.
    pub fn discard(&self, txn: &TransactionId) -> bool {
        self.sessions.lock().remove(txn).is_some()
    }

    /// Number of transactions awaiting `enrich`.
    pub fn pending(&self) -> usize {
        self.sessions.lock().len()
    }
}
