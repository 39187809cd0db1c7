//! Request coalescing keyed by an arbitrary hashable key.
//!
//! While one caller computes the value for a key, later callers for the same
//! key wait and receive a clone of that result instead of redoing the work.
//! Entries are dropped once the computation finishes, so a later call
//! starts fresh. If the leading caller is cancelled, one of the waiters
//! takes over the computation.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

struct Flight<V> {
    cell: Arc<OnceCell<V>>,
    /// Callers currently waiting on `cell`, leader included.
    callers: usize,
}

pub struct SingleFlight<K, V> {
    inflight: Mutex<HashMap<K, Flight<V>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

/// Held by every caller of [`SingleFlight::run`] until it returns or is
/// dropped. The last caller out, or the first one out after the value is
/// set, removes the entry.
struct Departure<'a, K: Eq + Hash, V> {
    inflight: &'a Mutex<HashMap<K, Flight<V>>>,
    key: K,
    cell: Arc<OnceCell<V>>,
}

impl<K: Eq + Hash, V> Drop for Departure<'_, K, V> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        let finished = match inflight.get_mut(&self.key) {
            Some(flight) if Arc::ptr_eq(&flight.cell, &self.cell) => {
                flight.callers = flight.callers.saturating_sub(1);
                flight.callers == 0 || flight.cell.initialized()
            }
            _ => false,
        };
        if finished {
            inflight.remove(&self.key);
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a computation is already in flight.
    ///
    /// Returns the value and `true` if it was produced by another caller.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> (V, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            let flight = inflight.entry(key.clone()).or_insert_with(|| Flight {
                cell: Arc::new(OnceCell::new()),
                callers: 0,
            });
            flight.callers += 1;
            Arc::clone(&flight.cell)
        };
        let _departure = Departure {
            inflight: &self.inflight,
            key,
            cell: Arc::clone(&cell),
        };

        let mut led = false;
        let value = cell
            .get_or_init(|| {
                led = true;
                work()
            })
            .await
            .clone();

        (value, !led)
    }

    /// Number of keys with a computation currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let flight = Arc::new(SingleFlight::<String, usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("GM-1".to_string(), || async move {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        calls.fetch_add(1, Ordering::SeqCst) + 100
                    })
                    .await
            }));
        }

        let mut shared = 0;
        for handle in handles {
            let (value, was_shared) = handle.await.unwrap();
            assert_eq!(value, 100);
            if was_shared {
                shared += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared, 7);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn sequential_calls_recompute() {
        let flight = SingleFlight::<&str, u32>::new();
        let (first, _) = flight.run("k", || async { 1 }).await;
        let (second, shared) = flight.run("k", || async { 2 }).await;
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert!(!shared);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let flight = SingleFlight::<u32, u32>::new();
        let (a, b) = tokio::join!(
            flight.run(1, || async { 10 }),
            flight.run(2, || async { 20 })
        );
        assert_eq!((a.0, b.0), (10, 20));
        assert!(!a.1 && !b.1);
    }

    #[tokio::test]
    async fn waiter_takes_over_when_leader_is_cancelled() {
        let flight = Arc::new(SingleFlight::<&'static str, u32>::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("k", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();
        let _ = leader.await;

        assert_eq!(flight.in_flight(), 0, "abandoned computation must not linger");

        let (value, _) = flight.run("k", || async { 2 }).await;
        assert_eq!(value, 2);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_callers_leave_no_entries_behind() {
        let flight = SingleFlight::<u32, u32>::new();
        for key in 0..5 {
            let outcome = tokio::time::timeout(
                Duration::from_millis(5),
                flight.run(key, || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    key
                }),
            )
            .await;
            assert!(outcome.is_err());
        }
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_a_waiter_remains() {
        let flight = Arc::new(SingleFlight::<&'static str, u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let spawn_caller = |value: u32| {
            let flight = flight.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                flight
                    .run("k", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        value
                    })
                    .await
            })
        };

        let leader = spawn_caller(1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let waiter = spawn_caller(2);
        tokio::time::sleep(Duration::from_millis(10)).await;

        leader.abort();
        let _ = leader.await;
        assert_eq!(flight.in_flight(), 1);

        let (value, shared) = waiter.await.unwrap();
        assert_eq!(value, 2, "waiter reruns the work after the leader is gone");
        assert!(!shared);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(flight.in_flight(), 0);
    }
}
