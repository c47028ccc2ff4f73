//! Idle queue for tracking in-flight critical operations.
//!
//! The idle queue is not a mutex: wrapped operations still interleave. Its
//! job is the quiescence signal teardown waits on, so a database is never
//! destroyed under an in-flight storage call.

use std::future::Future;
use tokio::sync::watch;

/// Tracks in-flight operations and exposes a drained signal.
#[derive(Debug)]
pub struct IdleQueue {
    in_flight: watch::Sender<usize>,
}

impl IdleQueue {
    /// Creates an idle queue with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(0);
        Self { in_flight }
    }

    /// Runs a future while counting it as in flight.
    ///
    /// The count is decremented when the future completes, including by
    /// panic, so a failing operation cannot wedge the idle signal.
    pub async fn wrap_call<F: Future>(&self, fut: F) -> F::Output {
        let _guard = InFlightGuard::enter(&self.in_flight);
        fut.await
    }

    /// Resolves once no wrapped operation is in flight.
    ///
    /// Operations started after this call do not delay it beyond their own
    /// completion; the signal fires at any moment the count reaches zero.
    pub async fn request_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Number of operations currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }
}

impl Default for IdleQueue {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlightGuard<'a> {
    counter: &'a watch::Sender<usize>,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|count| *count += 1);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn idle_resolves_immediately_when_empty() {
        let queue = IdleQueue::new();
        queue.request_idle().await;
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn wrap_call_returns_the_inner_value() {
        let queue = IdleQueue::new();
        let value = queue.wrap_call(async { 7 }).await;
        assert_eq!(value, 7);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn idle_waits_for_in_flight_work() {
        let queue = Arc::new(IdleQueue::new());

        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .wrap_call(tokio::time::sleep(Duration::from_millis(30)))
                    .await;
            })
        };
        // Give the worker a chance to enter the queue.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.in_flight(), 1);

        queue.request_idle().await;
        assert_eq!(queue.in_flight(), 0);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_calls_are_all_tracked() {
        let queue = Arc::new(IdleQueue::new());
        let mut workers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            workers.push(tokio::spawn(async move {
                queue
                    .wrap_call(tokio::time::sleep(Duration::from_millis(20)))
                    .await;
            }));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.in_flight(), 4);

        queue.request_idle().await;
        assert_eq!(queue.in_flight(), 0);
        for worker in workers {
            worker.await.unwrap();
        }
    }
}
