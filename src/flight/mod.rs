//! Single-Flight Coalescer
//!
//! Deduplicates concurrent loads per key. A burst of callers asking for the
//! same missing key produces exactly one execution of the underlying work;
//! everyone observes the one shared outcome. The coalescer never caches: as
//! soon as a call finishes, the key is eligible for a fresh one.
//!
//! The first caller for a key becomes the *leader*: it registers an in-flight
//! record, runs the work, and publishes the result over a watch channel.
//! *Waiters* find the record and await the published value. If a leader is
//! dropped before publishing (its caller went away), the record is removed by
//! a drop guard and one of the waiters promotes itself to leader, so a
//! cancelled caller can never wedge the key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;


type Outcome<T, E> = Option<Result<T, E>>;

/// Per-key deduplication of in-flight work.
pub struct Flight<T, E> {
    calls: Mutex<HashMap<String, watch::Receiver<Outcome<T, E>>>>,
}

impl<T, E> Default for Flight<T, E> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone, E: Clone> Flight<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` under the single-flight contract for `key`.
    ///
    /// If no call for `key` is in flight, `work` executes and its result is
    /// shared with every caller that arrives before it completes. Otherwise
    /// `work` is dropped unused and the in-flight result is returned.
    pub async fn run<F>(&self, key: &str, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        loop {
            let leader_tx = {
                let mut calls = self.calls.lock().expect("flight lock poisoned");
                match calls.get(key) {
                    Some(rx) => Err(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        calls.insert(key.to_string(), rx);
                        Ok(tx)
                    }
                }
            };

            match leader_tx {
                Ok(tx) => {
                    let _guard = CallGuard { flight: self, key };
                    let result = work.await;
                    // Release subscribers first, then let the guard drop the
                    // record so the key is immediately reusable.
                    let _ = tx.send(Some(result.clone()));
                    return result;
                }
                Err(mut rx) => {
                    loop {
                        if let Some(result) = rx.borrow_and_update().as_ref() {
                            return result.clone();
                        }
                        if rx.changed().await.is_err() {
                            // Leader vanished without publishing; go around
                            // and contend for leadership.
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Number of keys currently in flight.
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.calls.lock().expect("flight lock poisoned").len()
    }
}

struct CallGuard<'a, T, E> {
    flight: &'a Flight<T, E>,
    key: &'a str,
}

impl<T, E> Drop for CallGuard<'_, T, E> {
    fn drop(&mut self) {
        self.flight
            .calls
            .lock()
            .expect("flight lock poisoned")
            .remove(self.key);
    }
}
