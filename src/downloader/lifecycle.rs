//! Shutdown and fatal-error coordination.

use crate::types::{DownloadState, Event};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::DownloadManager;

/// How long `shutdown` waits for cancelled fetches to record their state
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

impl DownloadManager {
    /// Shut the manager down
    ///
    /// 1. Stops accepting new fetches
    /// 2. Cancels every running fetch; their `.part` files stay on disk
    /// 3. Waits (bounded) for the fetch tasks to record their failure
    /// 4. Marks queued-but-unstarted records `Failed`
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// Status reads and `open_for_read` keep working afterwards.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating download manager shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        self.queue_state.shutdown_token.cancel();

        let wait_result =
            tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_downloads()).await;
        if wait_result.is_err() {
            tracing::warn!("Timeout waiting for fetch tasks to stop, proceeding with shutdown");
        }

        let abandoned = self.abandon_pending().await;
        if abandoned > 0 {
            tracing::info!(abandoned, "Marked queued downloads as failed");
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Download manager shutdown complete");
    }

    /// Token cancelled when the cache becomes unusable (disk full, not writable)
    ///
    /// The process is expected to stop once this fires.
    pub fn fatal_signal(&self) -> CancellationToken {
        self.queue_state.fatal_token.clone()
    }

    /// Whether [`DownloadManager::shutdown`] has been called
    pub fn is_shutting_down(&self) -> bool {
        !self.queue_state.accepting_new.load(Ordering::SeqCst)
    }

    async fn wait_for_active_downloads(&self) {
        loop {
            let active_count = self.queue_state.active_downloads.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for fetch tasks to stop");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Fail every record that never reached a worker
    async fn abandon_pending(&self) -> usize {
        let registry = self.registry.lock().await;
        let mut count = 0;
        for status in registry.records.values() {
            let modified = status.send_if_modified(|record| {
                if record.state.is_active() {
                    record.state = DownloadState::Failed;
                    record.last_error = Some("download abandoned at shutdown".to_string());
                    true
                } else {
                    false
                }
            });
            if modified {
                count += 1;
            }
        }
        count
    }
}
