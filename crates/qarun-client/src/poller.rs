//! Periodic snapshot refresh for the task list and the report.
//!
//! A [`Poller`] fetches once immediately, then on a fixed interval, and
//! replaces its sink's snapshot wholesale on success. Failures are logged and
//! the previous snapshot stays visible. Once [`Poller::cancel`] has returned
//! the sink receives no further writes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// Destination of fetched snapshots.
pub trait SnapshotSink<T>: Send + 'static {
    fn replace(&self, snapshot: T);
}

impl<T: Send + Sync + 'static> SnapshotSink<T> for watch::Sender<Option<T>> {
    fn replace(&self, snapshot: T) {
        self.send_replace(Some(snapshot));
    }
}

/// A running refresh loop.
pub struct Poller {
    cancel: CancellationToken,
    refresh: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start polling. `fetch` is called once right away and then every
    /// `interval`.
    pub fn spawn<T, F, Fut, S>(name: &'static str, interval: Duration, mut fetch: F, sink: S) -> Self
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
        S: SnapshotSink<T>,
    {
        let cancel = CancellationToken::new();
        let refresh = Arc::new(Notify::new());
        let interval = interval.max(Duration::from_millis(1));

        let token = cancel.clone();
        let notify = Arc::clone(&refresh);
        let task = tokio::spawn(async move {
            info!(poller = name, interval = ?interval, "Poller started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                    _ = notify.notified() => {
                        debug!(poller = name, "Manual refresh");
                        ticker.reset();
                    }
                }

                let outcome = tokio::select! {
                    _ = token.cancelled() => break,
                    outcome = fetch() => outcome,
                };

                match outcome {
                    // Teardown may race a finished fetch.
                    Ok(_) if token.is_cancelled() => break,
                    Ok(snapshot) => sink.replace(snapshot),
                    Err(e) => warn!(poller = name, error = %e, "Refresh failed, keeping previous snapshot"),
                }
            }
            debug!(poller = name, "Poller stopped");
        });

        Self {
            cancel,
            refresh,
            task: Some(task),
        }
    }

    /// Fetch now instead of waiting for the next tick.
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    /// Stop polling and wait for the loop to exit.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Dropping only signals the loop to stop. A fetch that already finished may
/// still reach the sink; use [`Poller::cancel`] when that matters.
impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every write it receives.
    #[derive(Clone, Default)]
    struct SpySink {
        writes: Arc<Mutex<Vec<u32>>>,
    }

    impl SnapshotSink<u32> for SpySink {
        fn replace(&self, snapshot: u32) {
            self.writes.lock().unwrap().push(snapshot);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_immediately_then_on_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = SpySink::default();
        let counter = Arc::clone(&calls);
        let poller = Poller::spawn(
            "test",
            Duration::from_secs(5),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) as u32;
                async move { Ok::<_, ClientError>(n) }
            },
            sink.clone(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*sink.writes.lock().unwrap(), vec![0]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*sink.writes.lock().unwrap(), vec![0, 1, 2]);

        poller.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_keep_previous_snapshot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(None);
        let counter = Arc::clone(&calls);
        let poller = Poller::spawn(
            "tasks",
            Duration::from_secs(5),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(vec!["t1".to_string()])
                    } else {
                        Err(ClientError::Connection("collaborator down".into()))
                    }
                }
            },
            tx,
        );

        // First fetch plus two failed refreshes.
        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*rx.borrow(), Some(vec!["t1".to_string()]));

        poller.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_writes_after_cancel() {
        let sink = SpySink::default();
        let poller = Poller::spawn(
            "report",
            Duration::from_secs(1),
            || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, ClientError>(7)
            },
            sink.clone(),
        );

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(sink.writes.lock().unwrap().len(), 1);

        // Cancel while the next fetch is in flight.
        tokio::time::sleep(Duration::from_millis(700)).await;
        poller.cancel().await;
        let seen = sink.writes.lock().unwrap().len();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.writes.lock().unwrap().len(), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh() {
        let sink = SpySink::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let poller = Poller::spawn(
            "report",
            Duration::from_secs(30),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) as u32;
                async move { Ok::<_, ClientError>(n) }
            },
            sink.clone(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.refresh_now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*sink.writes.lock().unwrap(), vec![0, 1]);

        drop(poller);
        tokio::time::sleep(Duration::from_secs(60)).await;
        // Nothing was in flight, so the dropped loop stayed quiet.
        assert_eq!(sink.writes.lock().unwrap().len(), 2);
    }
}
