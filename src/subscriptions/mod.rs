//! Document Subscription (DSub) engine.
//!
//! Tracks which external parties want to hear about new documents and
//! delivers to them:
//! - push subscribers get one notification per document via a [`Notifier`]
//! - pull subscribers poll a per-location queue in the [`PullPointRegistry`]
//!
//! # Example
//!
//! ```ignore
//! let (notifier, handle) = ChannelNotifier::new(100);
//! let service = SubscriptionService::new(
//!     Arc::new(SubscriptionStore::in_memory()),
//!     Arc::new(PullPointRegistry::in_memory(None)),
//!     Arc::new(notifier),
//! );
//!
//! service.create_subscription("http://consumer.example/notify", None, None)?;
//! service.notify_new_document("doc123", "facilityA");
//!
//! let event = handle.recv()?;
//! ```

mod notifier;
mod pull_point;
mod service;
mod store;

pub use notifier::{
    notify_envelope, ChannelNotifier, DocumentNotification, HttpNotifier, HttpNotifierConfig,
    NotificationHandle, Notifier,
};
pub use pull_point::{PullPoint, PullPointRegistry};
pub use service::{
    is_url_valid, validate_url, CreateOutcome, NotifyReport, SubscriptionService,
};
pub use store::{SaveOutcome, SubscriptionStore};
