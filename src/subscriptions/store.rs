//! Keyed subscription storage with active-URL deduplication.

use crate::error::Result;
use crate::journal::Journal;
use crate::types::{Subscription, SubscriptionId, SubscriptionInput, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Magic bytes for the subscription journal.
const SUBSCRIPTION_JOURNAL_MAGIC: &[u8; 4] = b"DSB\0";

/// Journal entries for the subscription store.
#[derive(Debug, Serialize, Deserialize)]
enum SubscriptionEntry {
    Saved(Subscription),
    Deleted(SubscriptionId),
}

/// Result of a save attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The record was inserted under this id.
    Saved(SubscriptionId),
    /// An active subscription already covers the URL (or the id is taken);
    /// nothing was written.
    Duplicate { existing: SubscriptionId },
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}

/// Subscription records keyed by id.
///
/// Optionally journaled to disk; the in-memory map is authoritative and is
/// rebuilt from the journal on open.
pub struct SubscriptionStore {
    records: RwLock<HashMap<SubscriptionId, Subscription>>,
    journal: Option<Journal<SubscriptionEntry>>,
}

impl SubscriptionStore {
    /// Store with no persistence.
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            journal: None,
        }
    }

    /// Open or create a journaled store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (journal, entries) = Journal::open(path, SUBSCRIPTION_JOURNAL_MAGIC)?;

        let mut records = HashMap::new();
        for entry in entries {
            match entry {
                SubscriptionEntry::Saved(sub) => {
                    records.insert(sub.id.clone(), sub);
                }
                SubscriptionEntry::Deleted(id) => {
                    records.remove(&id);
                }
            }
        }

        Ok(Self {
            records: RwLock::new(records),
            journal: Some(journal),
        })
    }

    /// Save a subscription unless an active one already exists for its URL.
    ///
    /// The check and the insert happen under one write lock, so two
    /// concurrent saves for the same URL cannot both succeed.
    pub fn save(&self, input: SubscriptionInput) -> Result<SaveOutcome> {
        self.save_at(input, Timestamp::now())
    }

    /// `save` with an explicit notion of "now" for the activity check.
    pub fn save_at(&self, input: SubscriptionInput, now: Timestamp) -> Result<SaveOutcome> {
        let subscription = input.into_subscription();
        let mut records = self.records.write();

        if let Some(existing) = records.get(&subscription.id) {
            warn!(id = %existing.id, "Subscription already exists");
            return Ok(SaveOutcome::Duplicate {
                existing: existing.id.clone(),
            });
        }

        if let Some(existing) = records
            .values()
            .find(|s| s.url == subscription.url && s.is_active_at(now))
        {
            warn!(
                id = %existing.id,
                url = %subscription.url,
                "Active subscription already exists for URL"
            );
            return Ok(SaveOutcome::Duplicate {
                existing: existing.id.clone(),
            });
        }

        if let Some(ref journal) = self.journal {
            journal.append(&SubscriptionEntry::Saved(subscription.clone()))?;
        }

        info!(id = %subscription.id, url = %subscription.url, "Saving subscription");
        let id = subscription.id.clone();
        records.insert(id.clone(), subscription);

        Ok(SaveOutcome::Saved(id))
    }

    /// Remove the subscription with `id`. Returns the number removed.
    pub fn delete(&self, id: &SubscriptionId) -> Result<usize> {
        let mut records = self.records.write();
        let removed = self.remove_locked(&mut records, std::slice::from_ref(id))?;
        info!(id = %id, removed, "Deleted subscriptions");
        Ok(removed)
    }

    /// Remove every subscription registered for `url`, active or not.
    pub fn delete_by_url(&self, url: &str) -> Result<usize> {
        let mut records = self.records.write();
        let ids: Vec<SubscriptionId> = records
            .values()
            .filter(|s| s.url == url)
            .map(|s| s.id.clone())
            .collect();
        let removed = self.remove_locked(&mut records, &ids)?;
        info!(url, removed, "Deleted subscriptions for URL");
        Ok(removed)
    }

    fn remove_locked(
        &self,
        records: &mut HashMap<SubscriptionId, Subscription>,
        ids: &[SubscriptionId],
    ) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            if !records.contains_key(id) {
                continue;
            }
            if let Some(ref journal) = self.journal {
                journal.append(&SubscriptionEntry::Deleted(id.clone()))?;
            }
            records.remove(id);
            removed += 1;
        }
        Ok(removed)
    }

    /// Subscriptions active at `now` whose facility filter matches.
    ///
    /// `facility = None` returns only unscoped subscriptions.
    pub fn find_active(&self, facility: Option<&str>, now: Timestamp) -> Vec<Subscription> {
        self.records
            .read()
            .values()
            .filter(|s| s.matches_facility(facility) && s.is_active_at(now))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &SubscriptionId) -> Option<Subscription> {
        self.records.read().get(id).cloned()
    }

    /// Every stored subscription, expired ones included.
    pub fn list(&self) -> Vec<Subscription> {
        self.records.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Rewrite the journal to hold only live records.
    pub fn compact(&self) -> Result<()> {
        if let Some(ref journal) = self.journal {
            let records = self.records.read();
            let entries: Vec<SubscriptionEntry> = records
                .values()
                .cloned()
                .map(SubscriptionEntry::Saved)
                .collect();
            journal.rewrite(&entries)?;
        }
        Ok(())
    }
}
