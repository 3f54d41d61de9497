//! Delayed reloads of the host application.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

/// Reloads the host application.
#[async_trait]
pub trait Reloader: Send + Sync {
    async fn reload(&self);
}

/// At most one pending reload; scheduling again replaces the earlier one.
pub struct ReloadScheduler {
    reloader: Arc<dyn Reloader>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ReloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadScheduler").field("pending", &self.is_pending()).finish()
    }
}

impl ReloadScheduler {
    pub fn new(reloader: Arc<dyn Reloader>) -> Self {
        Self { reloader, pending: Mutex::new(None) }
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reload after `delay`, superseding any reload already scheduled.
    pub fn schedule(&self, delay: Duration) {
        let reloader = Arc::clone(&self.reloader);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!("reloading host application");
            reloader.reload().await;
        });

        if let Some(previous) = self.slot().replace(task)
            && !previous.is_finished()
        {
            previous.abort();
            tracing::debug!("superseded pending reload");
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, "reload scheduled");
    }

    /// Cancel the pending reload. Returns false when none was pending.
    pub fn cancel(&self) -> bool {
        match self.slot().take() {
            Some(task) if !task.is_finished() => {
                task.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Reload immediately, dropping any scheduled reload.
    pub async fn reload_now(&self) {
        self.cancel();
        self.reloader.reload().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingReloader;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let reloader = Arc::new(CountingReloader::default());
        let scheduler = ReloadScheduler::new(reloader.clone());

        scheduler.schedule(Duration::from_secs(1));
        assert!(scheduler.is_pending());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(reloader.count(), 0);
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(reloader.count(), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_reload_pending() {
        let reloader = Arc::new(CountingReloader::default());
        let scheduler = ReloadScheduler::new(reloader.clone());

        scheduler.schedule(Duration::from_secs(1));
        scheduler.schedule(Duration::from_secs(1));
        scheduler.schedule(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(reloader.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let reloader = Arc::new(CountingReloader::default());
        let scheduler = ReloadScheduler::new(reloader.clone());

        assert!(!scheduler.cancel());
        scheduler.schedule(Duration::from_secs(1));
        assert!(scheduler.cancel());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(reloader.count(), 0);
    }

    #[tokio::test]
    async fn test_reload_now() {
        let reloader = Arc::new(CountingReloader::default());
        let scheduler = ReloadScheduler::new(reloader.clone());
        scheduler.schedule(Duration::from_secs(60));

        scheduler.reload_now().await;

        assert_eq!(reloader.count(), 1);
        assert!(!scheduler.is_pending());
    }
}
