//! Core types shared by the MIME processor and the subscription engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert a wall-clock time. Times before the epoch are negative.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Timestamp(after.as_micros() as i64),
            Err(before) => Timestamp(-(before.duration().as_micros() as i64)),
        }
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_micros() as i64))
    }

    pub fn saturating_sub(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration.as_micros() as i64))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Opaque subscription identifier (UUID v4 text when generated).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn generate() -> Self {
        SubscriptionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        SubscriptionId(s.to_string())
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key for one in-flight decode/enrich round trip.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn generate() -> Self {
        TransactionId(Uuid::new_v4().to_string())
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        TransactionId(s.to_string())
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored document subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier (assigned by the store when absent).
    pub id: SubscriptionId,

    /// Subscriber callback endpoint.
    pub url: String,

    /// Facility filter. `None` matches every facility.
    pub facility_query: Option<String>,

    /// Expiry instant. `None` never expires.
    pub terminate_at: Option<Timestamp>,
}

impl Subscription {
    /// Active at `now` iff it has no expiry or expires strictly after `now`.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        match self.terminate_at {
            None => true,
            Some(end) => end > now,
        }
    }

    /// Whether this subscription wants documents from `facility`.
    ///
    /// `None` stands for a document with no known facility; only unscoped
    /// subscriptions match it.
    pub fn matches_facility(&self, facility: Option<&str>) -> bool {
        match (&self.facility_query, facility) {
            (None, _) => true,
            (Some(query), Some(facility)) => query == facility,
            (Some(_), None) => false,
        }
    }
}

/// Input for creating a subscription (before an id is assigned).
#[derive(Clone, Debug)]
pub struct SubscriptionInput {
    pub id: Option<SubscriptionId>,
    pub url: String,
    pub facility_query: Option<String>,
    pub terminate_at: Option<Timestamp>,
}

impl SubscriptionInput {
    /// Unscoped, never-expiring subscription for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            facility_query: None,
            terminate_at: None,
        }
    }

    pub fn with_id(mut self, id: SubscriptionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_facility_query(mut self, facility: Option<String>) -> Self {
        self.facility_query = facility;
        self
    }

    pub fn with_terminate_at(mut self, terminate_at: Option<Timestamp>) -> Self {
        self.terminate_at = terminate_at;
        self
    }

    /// Materialize, generating an id if none was given.
    pub fn into_subscription(self) -> Subscription {
        Subscription {
            id: self.id.unwrap_or_else(SubscriptionId::generate),
            url: self.url,
            facility_query: self.facility_query,
            terminate_at: self.terminate_at,
        }
    }
}
