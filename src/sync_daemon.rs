use crate::config_store::ConfigStore;
use crate::endpoint::EndpointSet;
use crate::reconciler::Reconciler;
use std::time::Duration;

/// Drives the endless load → reconcile → persist → sleep cadence.
///
/// The polling interval is taken from the freshly loaded configuration on
/// every cycle, so an operator edit to the cadence takes effect on the next
/// tick without a restart.
pub struct SyncDaemon {
    config_store: ConfigStore,
    reconciler: Reconciler,
}

impl SyncDaemon {
    pub fn new(config_store: ConfigStore, reconciler: Reconciler) -> Self {
        Self {
            config_store,
            reconciler,
        }
    }

    /// Runs reconciliation cycles until the process is terminated
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            log::info!("Starting reconciliation cycle");

            // A load failure degrades to a pass over an empty set; the file
            // is re-read from scratch on the next tick anyway.
            let set = match self.config_store.load() {
                Ok(set) => set,
                Err(e) => {
                    log::error!(
                        "Failed to load endpoint file: {:#}",
                        anyhow::Error::new(e)
                    );
                    EndpointSet::empty()
                }
            };

            let outcome = self.reconciler.reconcile(set).await;

            if outcome.changed {
                if let Err(e) = self.config_store.save(&outcome.set) {
                    // Not retried: the next cycle re-derives the same
                    // mutations from the unchanged on-disk file.
                    log::error!(
                        "Failed to persist endpoint file: {:#}",
                        anyhow::Error::new(e)
                    );
                }
            }

            // An interval of 0 in an operator-edited file would busy-loop
            let minutes = outcome.set.update_minutes.max(1);
            tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
        }
    }
}
