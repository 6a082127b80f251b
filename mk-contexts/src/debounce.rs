use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{
    Duration,
    Instant,
    sleep_until,
};

// Trailing-edge debouncer: every `schedule` call for a key replaces whatever was pending for that
// key and restarts its timer, so a burst of changes turns into a single publish of the last
// value, `interval` after the burst goes quiet.  Keys are independent of each other.
pub struct Debouncer<K, V> {
    interval: Duration,
    tx: broadcast::Sender<V>,
    pending: HashMap<K, JoinHandle<()>>,
    disposed: bool,
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + 'static,
{
    pub fn new(interval: Duration, tx: broadcast::Sender<V>) -> Debouncer<K, V> {
        Debouncer { interval, tx, pending: HashMap::new(), disposed: false }
    }

    pub fn schedule(&mut self, key: K, value: V) {
        if self.disposed {
            return;
        }

        self.pending.retain(|_, handle| !handle.is_finished());
        if let Some(handle) = self.pending.remove(&key) {
            handle.abort();
        }

        let deadline = Instant::now() + self.interval;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            // No subscribers is fine, the value is just dropped
            let _ = tx.send(value);
        });
        self.pending.insert(key, handle);
    }

    #[cfg(test)]
    pub(crate) fn cancel(&mut self, key: &K) {
        if let Some(handle) = self.pending.remove(key) {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.pending.values().filter(|h| !h.is_finished()).count()
    }

    pub fn dispose(&mut self) {
        self.disposed = true;
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<K, V> Drop for Debouncer<K, V> {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}
