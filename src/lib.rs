//! # XDS.b Mediator Core
//!
//! The protocol and notification core of a document-exchange mediator that
//! sits between SOAP clients and an XDS.b registry/repository.
//!
//! ## Core Concepts
//!
//! - **MIME/MTOM processing**: decode a SOAP-with-attachments message, expose
//!   the SOAP envelope and attachments, and re-encode an enriched envelope
//!   byte-for-byte except for the SOAP content
//! - **Subscriptions**: push subscribers registered by callback URL, scoped by
//!   facility and expiry
//! - **Pull points**: per-location queues of document ids for polling clients
//! - **Feed notifications**: an HL7 v2 part in a submission announces its
//!   attachments to every matching subscriber
//!
//! ## Example
//!
//! ```ignore
//! use xds_mediator::{Mediator, MediatorConfig, TransactionId};
//!
//! let mediator = Mediator::open_or_create(MediatorConfig {
//!     path: "./mediator-data".into(),
//!     ..Default::default()
//! })?;
//!
//! mediator
//!     .subscriptions()
//!     .create_subscription("https://consumer.example/notify", None, None)?;
//!
//! let txn = TransactionId::generate();
//! let decoded = mediator.processor().decode(&txn, &body, &content_type)?;
//! let outbound = mediator.processor().enrich(&txn, &decoded.soap_part)?;
//! ```

pub mod config;
pub mod error;
pub mod journal;
pub mod mediator;
pub mod mime;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::MediatorConfig;
pub use error::{MediatorError, Result};
pub use journal::Journal;
pub use mediator::Mediator;
pub use mime::{
    Attachment, DecodeOutcome, DecodedMessage, EnrichedMessage, FeedBatch, FeedSink, MimeConfig,
    MimeProcessor, Multipart,
};
pub use subscriptions::{
    ChannelNotifier, CreateOutcome, DocumentNotification, HttpNotifier, HttpNotifierConfig,
    NotificationHandle, Notifier, NotifyReport, PullPointRegistry, SaveOutcome,
    SubscriptionService, SubscriptionStore,
};
pub use types::*;
