//! Cooperative pause/stop signalling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Flags polled by the crawl loop between iterations.
///
/// Neither flag interrupts I/O already underway: an in-flight fetch or
/// download always runs to completion or to its next retry boundary.
#[derive(Debug, Clone, Default)]
pub struct CrawlControl {
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
    resumed: Arc<Notify>,
}

impl CrawlControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a cooperative stop. Also releases a paused crawl.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    /// The stop flag, for collaborators that check it between retries.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Wait until resumed or stopped. Returns immediately when not paused.
    pub async fn wait_while_paused(&self) {
        loop {
            let notified = self.resumed.notified();
            if !self.is_paused() || self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Clear both flags before a new run.
    pub(crate) fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_when_not_paused() {
        let control = CrawlControl::new();
        tokio::time::timeout(Duration::from_millis(100), control.wait_while_paused())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resume_releases_waiter() {
        let control = CrawlControl::new();
        control.pause();

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_while_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        control.resume();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_releases_paused_waiter() {
        let control = CrawlControl::new();
        control.pause();
        let flag = control.stop_flag();

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_while_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        control.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(flag.load(Ordering::SeqCst));

        control.reset();
        assert!(!control.is_stopped());
        assert!(!control.is_paused());
    }
}
