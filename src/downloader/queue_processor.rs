//! Queue processor — bounded worker pool that spawns fetch tasks.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::fetch_task::{FetchTaskContext, run_fetch_task};
use super::{DownloadManager, FetchJob};

impl DownloadManager {
    /// Start the queue processor task
    ///
    /// This spawns a background task that continuously:
    /// 1. Waits for the next scheduled fetch
    /// 2. Acquires a permit from the concurrency limiter (respects max_concurrent_downloads)
    /// 3. Spawns a fetch task holding that permit
    /// 4. Repeats until shutdown
    ///
    /// Jobs still queued at shutdown are left as they are; `shutdown` marks
    /// their records failed.
    pub(crate) fn start_queue_processor(
        &self,
        mut job_rx: mpsc::UnboundedReceiver<FetchJob>,
    ) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let shutdown = self.queue_state.shutdown_token.clone();
        let concurrent_limit = Arc::clone(&self.queue_state.concurrent_limit);
        let active_downloads = Arc::clone(&self.queue_state.active_downloads);

        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    job = job_rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };

                // Blocks while max_concurrent_downloads fetches are running
                let permit = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    permit = Arc::clone(&concurrent_limit).acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    },
                };

                let cancel_token = shutdown.child_token();
                {
                    let mut active = active_downloads.lock().await;
                    active.insert(job.track_id.clone(), job.generation);
                }

                let ctx = FetchTaskContext::new(&manager, job, cancel_token);

                tokio::spawn(async move {
                    let _permit = permit;
                    run_fetch_task(ctx).await;
                });
            }

            tracing::debug!("Queue processor stopped");
        })
    }
}
