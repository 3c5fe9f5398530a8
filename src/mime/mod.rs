//! MTOM/XOP multipart processing.
//!
//! A document-submission transaction arrives as a multipart message with
//! one SOAP envelope part, optional attachment parts keyed by `Content-ID`,
//! and at most one HL7 v2 feed-notification part; a second one is rejected.
//! The processor:
//! - decodes the message into the SOAP text plus an attachment map
//! - holds the parsed envelope per transaction id
//! - re-encodes an enriched SOAP part into the original envelope, leaving
//!   every other byte untouched
//! - forwards feed batches to a [`FeedSink`] during decode
//!
//! # Example
//!
//! ```ignore
//! let processor = MimeProcessor::new(MimeConfig::default());
//! let txn = TransactionId::generate();
//!
//! let decoded = processor.decode(&txn, &body, &content_type)?;
//! let enriched_soap = add_patient_identifiers(&decoded.soap_part);
//! let outbound = processor.enrich(&txn, &enriched_soap)?;
//! ```

mod multipart;
mod processor;
mod types;

pub use multipart::{content_type_param, BodyPart, Header, Multipart};
pub use processor::{DecodedMessage, MimeProcessor};
pub use types::{Attachment, DecodeOutcome, EnrichedMessage, FeedBatch, FeedSink, MimeConfig};
