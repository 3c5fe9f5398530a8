//! Per-location queues of announced document ids for pull subscribers.

use crate::error::Result;
use crate::journal::Journal;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tracing::{debug, warn};

/// Magic bytes for the pull-point journal.
const PULL_POINT_JOURNAL_MAGIC: &[u8; 4] = b"DPP\0";

#[derive(Debug, Serialize, Deserialize)]
enum PullPointEntry {
    Registered { location: String, document: String },
    Drained { location: String },
}

/// Pending document ids for one location, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct PullPoint {
    documents: VecDeque<String>,
}

impl PullPoint {
    /// Append, dropping the oldest id if `capacity` is exceeded.
    fn push(&mut self, document: String, capacity: Option<usize>) -> Option<String> {
        self.documents.push_back(document);
        match capacity {
            Some(cap) if self.documents.len() > cap => self.documents.pop_front(),
            _ => None,
        }
    }

    pub fn document_ids(&self) -> Vec<String> {
        self.documents.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// All pull points, keyed by location id.
pub struct PullPointRegistry {
    points: RwLock<HashMap<String, PullPoint>>,
    journal: Option<Journal<PullPointEntry>>,
    /// Max ids retained per location (None = unbounded).
    capacity: Option<usize>,
}

impl PullPointRegistry {
    pub fn in_memory(capacity: Option<usize>) -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            journal: None,
            capacity,
        }
    }

    /// Open or create a journaled registry.
    pub fn open(path: impl AsRef<Path>, capacity: Option<usize>) -> Result<Self> {
        let (journal, entries) = Journal::open(path, PULL_POINT_JOURNAL_MAGIC)?;

        let mut points: HashMap<String, PullPoint> = HashMap::new();
        for entry in entries {
            match entry {
                PullPointEntry::Registered { location, document } => {
                    points.entry(location).or_default().push(document, capacity);
                }
                PullPointEntry::Drained { location } => {
                    points.remove(&location);
                }
            }
        }

        Ok(Self {
            points: RwLock::new(points),
            journal: Some(journal),
            capacity,
        })
    }

    /// Append `document` to the location's queue, creating it if absent.
    /// Repeats are kept.
    pub fn register_document(&self, location: &str, document: &str) -> Result<()> {
        let mut points = self.points.write();

        if let Some(ref journal) = self.journal {
            journal.append(&PullPointEntry::Registered {
                location: location.to_string(),
                document: document.to_string(),
            })?;
        }

        let dropped = points
            .entry(location.to_string())
            .or_default()
            .push(document.to_string(), self.capacity);

        debug!(location, document, "Registered document for pull point");
        if let Some(dropped) = dropped {
            warn!(location, dropped = %dropped, "Pull point full, dropped oldest document");
        }
        Ok(())
    }

    /// Current queue contents, oldest first. Does not remove anything.
    pub fn list_documents(&self, location: &str) -> Vec<String> {
        self.points
            .read()
            .get(location)
            .map(PullPoint::document_ids)
            .unwrap_or_default()
    }

    /// Remove and return the queue contents, oldest first.
    pub fn drain_documents(&self, location: &str) -> Result<Vec<String>> {
        let mut points = self.points.write();

        let Some(point) = points.get(location) else {
            return Ok(Vec::new());
        };
        if point.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(ref journal) = self.journal {
            journal.append(&PullPointEntry::Drained {
                location: location.to_string(),
            })?;
        }

        Ok(points
            .remove(location)
            .map(|p| p.documents.into_iter().collect())
            .unwrap_or_default())
    }

    pub fn location_count(&self) -> usize {
        self.points.read().len()
    }

    /// Rewrite the journal to hold one entry per queued id.
    ///
    /// Drained and evicted ids are dropped from the file.
    pub fn compact(&self) -> Result<()> {
        if let Some(ref journal) = self.journal {
            let points = self.points.write();
            let entries: Vec<PullPointEntry> = points
                .iter()
                .flat_map(|(location, point)| {
                    point.documents.iter().map(move |document| PullPointEntry::Registered {
                        location: location.clone(),
                        document: document.clone(),
                    })
                })
                .collect();
            journal.rewrite(&entries)?;
            debug!(entries = entries.len(), "Compacted pull-point journal");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_register_preserves_order_and_repeats() {
        let registry = PullPointRegistry::in_memory(None);
        registry.register_document("loc1", "docA").unwrap();
        registry.register_document("loc1", "docB").unwrap();
        registry.register_document("loc1", "docA").unwrap();

        assert_eq!(registry.list_documents("loc1"), vec!["docA", "docB", "docA"]);
        // Listing doesn't consume
        assert_eq!(registry.list_documents("loc1").len(), 3);
    }

    #[test]
    fn test_unknown_location_is_empty() {
        let registry = PullPointRegistry::in_memory(None);
        assert!(registry.list_documents("nowhere").is_empty());
        assert!(registry.drain_documents("nowhere").unwrap().is_empty());
        assert_eq!(registry.location_count(), 0);
    }

    #[test]
    fn test_locations_are_isolated() {
        let registry = PullPointRegistry::in_memory(None);
        registry.register_document("loc1", "docA").unwrap();
        registry.register_document("loc2", "docB").unwrap();

        assert_eq!(registry.list_documents("loc1"), vec!["docA"]);
        assert_eq!(registry.list_documents("loc2"), vec!["docB"]);
    }

    #[test]
    fn test_drain_empties_queue() {
        let registry = PullPointRegistry::in_memory(None);
        registry.register_document("loc1", "docA").unwrap();
        registry.register_document("loc1", "docB").unwrap();

        assert_eq!(registry.drain_documents("loc1").unwrap(), vec!["docA", "docB"]);
        assert!(registry.list_documents("loc1").is_empty());

        registry.register_document("loc1", "docC").unwrap();
        assert_eq!(registry.list_documents("loc1"), vec!["docC"]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let registry = PullPointRegistry::in_memory(Some(2));
        for doc in ["d1", "d2", "d3"] {
            registry.register_document("loc1", doc).unwrap();
        }
        assert_eq!(registry.list_documents("loc1"), vec!["d2", "d3"]);
    }

    #[test]
    fn test_journal_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pull_points.journal");

        {
            let registry = PullPointRegistry::open(&path, None).unwrap();
            registry.register_document("loc1", "docA").unwrap();
            registry.register_document("loc2", "docB").unwrap();
            registry.drain_documents("loc2").unwrap();
            registry.register_document("loc1", "docC").unwrap();
        }

        let registry = PullPointRegistry::open(&path, None).unwrap();
        assert_eq!(registry.list_documents("loc1"), vec!["docA", "docC"]);
        assert!(registry.list_documents("loc2").is_empty());
    }

    #[test]
    fn test_compact_drops_drained_and_evicted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pull_points.journal");

        let registry = PullPointRegistry::open(&path, Some(2)).unwrap();
        for round in 0..3 {
            for i in 0..100 {
                registry
                    .register_document("loc1", &format!("doc-{round}-{i}"))
                    .unwrap();
            }
            registry.drain_documents("loc1").unwrap();
        }
        registry.register_document("loc1", "d1").unwrap();
        registry.register_document("loc2", "d2").unwrap();
        registry.register_document("loc2", "d3").unwrap();
        registry.register_document("loc2", "d4").unwrap();

        let before = fs::metadata(&path).unwrap().len();
        registry.compact().unwrap();
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before / 10, "journal {before} -> {after} bytes");
        drop(registry);

        let registry = PullPointRegistry::open(&path, Some(2)).unwrap();
        assert_eq!(registry.list_documents("loc1"), vec!["d1"]);
        assert_eq!(registry.list_documents("loc2"), vec!["d3", "d4"]);
        assert_eq!(registry.location_count(), 2);

        // Appends after compaction still replay
        registry.register_document("loc1", "d5").unwrap();
        drop(registry);
        let registry = PullPointRegistry::open(&path, Some(2)).unwrap();
        assert_eq!(registry.list_documents("loc1"), vec!["d1", "d5"]);
    }
}
