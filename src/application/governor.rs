//! Admission control for external-encoder invocations.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of encoder jobs in flight. Acquisition suspends until
/// a slot frees up; dropping the returned permit releases the slot.
#[derive(Clone)]
pub struct Governor {
    slots: Arc<Semaphore>,
    limit: usize,
}

impl Governor {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            slots: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Explicit override, or half the host's available parallelism.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self::new(limit.unwrap_or_else(default_limit))
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // the semaphore is never closed, so acquisition cannot fail
        self.slots
            .clone()
            .acquire_owned()
            .await
            .expect("governor semaphore closed")
    }
}

pub fn default_limit() -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    (parallelism / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn limit_is_never_zero() {
        assert_eq!(Governor::new(0).limit(), 1);
        assert!(Governor::with_limit(None).limit() >= 1);
        assert_eq!(Governor::with_limit(Some(7)).limit(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_admits_more_than_the_limit() {
        const LIMIT: usize = 3;
        let governor = Governor::new(LIMIT);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..LIMIT * 10 {
            let governor = governor.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = governor.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= LIMIT);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn released_slots_are_reacquired() {
        let governor = Governor::new(1);
        for _ in 0..4 {
            let permit = governor.acquire().await;
            drop(permit);
        }
    }
}
