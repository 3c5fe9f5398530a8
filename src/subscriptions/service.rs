//! Subscription orchestration: validation, administration and fan-out.

use super::notifier::Notifier;
use super::pull_point::PullPointRegistry;
use super::store::{SaveOutcome, SubscriptionStore};
use crate::error::{MediatorError, Result};
use crate::mime::{FeedBatch, FeedSink};
use crate::types::{Subscription, SubscriptionId, SubscriptionInput, Timestamp};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Result of a create request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(SubscriptionId),
    /// An active subscription already exists for the URL.
    Duplicate { existing: SubscriptionId },
    /// The URL was rejected; nothing was stored.
    InvalidUrl(String),
}

/// Per-fan-out delivery counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Parse `url` as a subscriber endpoint: absolute `http`/`https` with a host.
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| MediatorError::InvalidUrl(format!("{url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MediatorError::InvalidUrl(format!(
            "{url}: unsupported scheme {}",
            parsed.scheme()
        )));
    }
    if !parsed.has_host() {
        return Err(MediatorError::InvalidUrl(format!("{url}: no host")));
    }
    Ok(parsed)
}

pub fn is_url_valid(url: &str) -> bool {
    validate_url(url).is_ok()
}

/// Orchestrates the subscription store, pull points and notifier.
///
/// Holds no subscription state of its own; every call reads the store.
pub struct SubscriptionService {
    store: Arc<SubscriptionStore>,
    pull_points: Arc<PullPointRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<SubscriptionStore>,
        pull_points: Arc<PullPointRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            pull_points,
            notifier,
        }
    }

    pub fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    pub fn pull_points(&self) -> &PullPointRegistry {
        &self.pull_points
    }

    // --- Administration ---

    /// Validate `url` and save a subscription.
    ///
    /// Invalid URLs and duplicates are logged and reported in the outcome,
    /// not as errors. `Err` means the store itself failed.
    pub fn create_subscription(
        &self,
        url: &str,
        facility_query: Option<String>,
        terminate_at: Option<Timestamp>,
    ) -> Result<CreateOutcome> {
        info!(url, "Request to create subscription");

        if let Err(e) = validate_url(url) {
            info!(error = %e, "Rejected subscription");
            return Ok(CreateOutcome::InvalidUrl(url.to_string()));
        }

        let input = SubscriptionInput::new(url)
            .with_facility_query(facility_query)
            .with_terminate_at(terminate_at);

        Ok(match self.store.save(input)? {
            SaveOutcome::Saved(id) => CreateOutcome::Created(id),
            SaveOutcome::Duplicate { existing } => CreateOutcome::Duplicate { existing },
        })
    }

    /// Delete by subscription id. Returns the number removed.
    pub fn delete_subscription(&self, id: &SubscriptionId) -> Result<usize> {
        info!(id = %id, "Request to delete subscription");
        self.store.delete(id)
    }

    /// Delete every subscription registered for `url`.
    pub fn delete_subscriptions_for_url(&self, url: &str) -> Result<usize> {
        info!(url, "Request to delete subscriptions for URL");
        self.store.delete_by_url(url)
    }

    /// Subscriptions currently active for `facility`.
    pub fn list_active(&self, facility: &str) -> Vec<Subscription> {
        self.store.find_active(Some(facility), Timestamp::now())
    }

    // --- Fan-out ---

    /// Notify every active subscriber for `facility` about `document_id`.
    ///
    /// One delivery attempt per subscriber; a failure is logged and counted
    /// and does not stop delivery to the rest.
    pub fn notify_new_document(&self, document_id: &str, facility: &str) -> NotifyReport {
        self.fan_out(document_id, Some(facility))
    }

    fn fan_out(&self, document_id: &str, facility: Option<&str>) -> NotifyReport {
        let subscriptions = self.store.find_active(facility, Timestamp::now());
        info!(
            document_id,
            facility = facility.unwrap_or("<none>"),
            active = subscriptions.len(),
            "Active subscriptions"
        );

        let mut report = NotifyReport::default();
        for subscription in &subscriptions {
            match self.notifier.notify(subscription, document_id) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        id = %subscription.id,
                        url = %subscription.url,
                        error = %e,
                        "Notification failed"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Queue `document_id` on the pull point for `location`.
    pub fn notify_pull_point(&self, document_id: &str, location: &str) -> Result<()> {
        self.pull_points.register_document(location, document_id)
    }

    pub fn list_pull_point_documents(&self, location: &str) -> Vec<String> {
        self.pull_points.list_documents(location)
    }

    pub fn drain_pull_point_documents(&self, location: &str) -> Result<Vec<String>> {
        self.pull_points.drain_documents(location)
    }
}

impl FeedSink for SubscriptionService {
    fn documents_available(&self, batch: &FeedBatch) {
        let facility = batch.facility.as_deref();
        for document_id in &batch.document_ids {
            self.fan_out(document_id, facility);
        }
    }
}
