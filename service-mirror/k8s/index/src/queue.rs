//! A rate-limiting, de-duplicating FIFO work queue.
//!
//! Shaped after client-go's `workqueue`: an item `add`ed while it is
//! already queued or mid-processing is folded into the existing entry
//! (dirty-set coalescing) rather than queued twice, and a failed item is
//! re-added after an exponential backoff via [`Queue::add_after`] instead
//! of being retried inline, so a slow handler never blocks the producer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

const BASE_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

struct State<E> {
    queue: VecDeque<E>,
    dirty: HashSet<E>,
    processing: HashSet<E>,
    attempts: HashMap<E, u32>,
}

/// A handle to an in-flight work queue. Cheaply `Clone`-able; every clone
/// shares the same underlying state.
pub struct Queue<E: Clone + Eq + Hash + Send + 'static> {
    state: Arc<Mutex<State<E>>>,
    notify: Arc<Notify>,
}

impl<E: Clone + Eq + Hash + Send + 'static> Clone for Queue<E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            notify: self.notify.clone(),
        }
    }
}

impl<E: Clone + Eq + Hash + Send + 'static> Default for Queue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Eq + Hash + Send + 'static> Queue<E> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                attempts: HashMap::new(),
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Enqueues `event` immediately, coalescing with any duplicate already
    /// queued or in flight.
    pub fn add(&self, event: E) {
        let mut state = self.state.lock();
        if state.dirty.contains(&event) {
            return;
        }
        state.dirty.insert(event.clone());
        if state.processing.contains(&event) {
            // Picked up again once the in-flight attempt calls `done`.
            return;
        }
        state.queue.push_back(event);
        drop(state);
        self.notify.notify_one();
    }

    /// Enqueues `event` after a delay proportional to its current retry
    /// attempt count (exponential, capped at [`MAX_BACKOFF`]).
    pub fn add_rate_limited(&self, event: E) {
        let attempt = {
            let mut state = self.state.lock();
            let attempt = state.attempts.entry(event.clone()).or_insert(0);
            *attempt += 1;
            *attempt
        };
        let delay = backoff_for(attempt);
        self.add_after(event, delay);
    }

    /// Enqueues `event` after `delay` without touching its attempt count.
    pub fn add_after(&self, event: E, delay: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.add(event);
        });
    }

    /// Forgets `event`'s retry attempt count; call on a successful handle.
    pub fn forget(&self, event: &E) {
        self.state.lock().attempts.remove(event);
    }

    /// The number of attempts made so far for `event` (0 if never retried).
    pub fn attempts(&self, event: &E) -> u32 {
        self.state.lock().attempts.get(event).copied().unwrap_or(0)
    }

    /// Pops the next event, blocking until one is available.
    pub async fn get(&self) -> E {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(event) = state.queue.pop_front() {
                    state.dirty.remove(&event);
                    state.processing.insert(event.clone());
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Marks `event` as done processing. If it was re-`add`ed while in
    /// flight, it is requeued now.
    pub fn done(&self, event: &E) {
        let mut state = self.state.lock();
        state.processing.remove(event);
        if state.dirty.contains(event) {
            state.queue.push_back(event.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn backoff_for(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    BASE_BACKOFF
        .checked_mul(factor)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_add_coalesces() {
        let q: Queue<&'static str> = Queue::new();
        q.add("a");
        q.add("a");
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn add_while_processing_requeues_on_done() {
        let q: Queue<&'static str> = Queue::new();
        q.add("a");
        let got = q.get().await;
        assert_eq!(got, "a");
        assert!(q.is_empty());

        // Re-added while in flight: must not duplicate into the queue yet.
        q.add("a");
        assert!(q.is_empty());

        q.done(&"a");
        assert_eq!(q.len(), 1, "done() should requeue a dirty in-flight item");
    }

    #[tokio::test]
    async fn done_without_redirty_does_not_requeue() {
        let q: Queue<&'static str> = Queue::new();
        q.add("a");
        let got = q.get().await;
        q.done(&got);
        assert!(q.is_empty());
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert!(backoff_for(1) < backoff_for(2));
        assert!(backoff_for(2) < backoff_for(3));
        assert_eq!(backoff_for(30), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn forget_resets_attempts() {
        let q: Queue<&'static str> = Queue::new();
        q.add_rate_limited("a");
        assert_eq!(q.attempts(&"a"), 1);
        q.forget(&"a");
        assert_eq!(q.attempts(&"a"), 0);
    }
}
