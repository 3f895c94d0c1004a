//! A counting wait group tracking in-flight event handlers, so `Shutdown`
//! can drain them instead of abandoning work mid-flight.
//!
//! Mirrors the teacher's `TaskRegistryHandle` (`r2e-core/src/builder.rs`):
//! a small `Arc`-shared counter rather than a full scheduler integration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Default)]
pub struct WaitGroup {
    count: AtomicUsize,
    idle: Notify,
}

impl WaitGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark one handler as started; the returned guard marks it finished
    /// when dropped.
    pub fn enter(self: &Arc<Self>) -> WaitGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        WaitGuard { wait_group: self.clone() }
    }

    /// Wait until no handlers are in flight, or `deadline` elapses,
    /// whichever comes first.
    pub async fn drain(&self, deadline: Duration) {
        if self.count.load(Ordering::SeqCst) == 0 {
            return;
        }
        let _ = tokio::time::timeout(deadline, async {
            loop {
                if self.count.load(Ordering::SeqCst) == 0 {
                    return;
                }
                self.idle.notified().await;
            }
        })
        .await;
    }
}

pub struct WaitGuard {
    wait_group: Arc<WaitGroup>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.wait_group.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.wait_group.idle.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_returns_immediately_when_nothing_is_in_flight() {
        let wait_group = WaitGroup::new();
        tokio::time::timeout(Duration::from_millis(50), wait_group.drain(Duration::from_secs(5)))
            .await
            .expect("drain should not block with nothing in flight");
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_guards_to_drop() {
        let wait_group = WaitGroup::new();
        let guard = wait_group.enter();

        let wg = wait_group.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
        });

        let start = std::time::Instant::now();
        wg.drain(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_millis(25));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn drain_gives_up_at_the_deadline() {
        let wait_group = WaitGroup::new();
        let _guard = wait_group.enter();

        let start = std::time::Instant::now();
        wait_group.drain(Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
