//! Main Mediator struct tying all components together.

use crate::config::MediatorConfig;
use crate::error::{MediatorError, Result};
use crate::mime::MimeProcessor;
use crate::subscriptions::{
    HttpNotifier, Notifier, PullPointRegistry, SubscriptionService, SubscriptionStore,
};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Journal holding subscription records.
const SUBSCRIPTIONS_FILE: &str = "subscriptions.journal";

/// Journal holding pull-point queues.
const PULL_POINTS_FILE: &str = "pull_points.journal";

/// Lock file for exclusive access to the data directory.
const LOCK_FILE: &str = "mediator.lock";

/// The mediator core.
///
/// Owns:
/// - the journaled subscription store and pull-point registry
/// - the subscription service wired to a notifier
/// - the MIME processor, forwarding feed batches to the service
pub struct Mediator {
    config: MediatorConfig,

    /// Held for the lifetime of the mediator.
    _lock_file: File,

    service: Arc<SubscriptionService>,

    processor: MimeProcessor,
}

impl Mediator {
    /// Open the data directory, creating it if allowed, with HTTP delivery.
    pub fn open_or_create(config: MediatorConfig) -> Result<Self> {
        let notifier = Arc::new(HttpNotifier::new(&config.notifier)?);
        Self::with_notifier(config, notifier)
    }

    /// Open the data directory with a caller-supplied notifier.
    pub fn with_notifier(config: MediatorConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        if !config.path.exists() {
            if !config.create_if_missing {
                return Err(MediatorError::NotInitialized);
            }
            fs::create_dir_all(&config.path)?;
        }

        let lock_file = Self::acquire_lock(&config.path)?;

        let store = Arc::new(SubscriptionStore::open(config.path.join(SUBSCRIPTIONS_FILE))?);
        let pull_points = Arc::new(PullPointRegistry::open(
            config.path.join(PULL_POINTS_FILE),
            config.pull_point_capacity,
        )?);

        info!(
            path = %config.path.display(),
            subscriptions = store.len(),
            pull_points = pull_points.location_count(),
            "Opened mediator"
        );

        let service = Arc::new(SubscriptionService::new(store, pull_points, notifier));
        let processor = MimeProcessor::new(config.mime.clone())
            .with_default_facility(config.default_facility.clone())
            .with_feed_sink(service.clone());

        Ok(Self {
            config,
            _lock_file: lock_file,
            service,
            processor,
        })
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| MediatorError::Locked)?;

        Ok(lock_file)
    }

    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }

    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.service
    }

    pub fn processor(&self) -> &MimeProcessor {
        &self.processor
    }

    /// Compact the subscription and pull-point journals.
    pub fn compact(&self) -> Result<()> {
        self.service.store().compact()?;
        self.service.pull_points().compact()
    }
}
