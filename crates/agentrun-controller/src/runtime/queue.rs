use std::collections::{HashMap, HashSet, VecDeque};
use std::future::poll_fn;
use std::time::Duration;

use tokio_util::time::{DelayQueue, delay_queue};

use agentrun_core::ObjectKey;

/// Longest single wait handed to the timer wheel, which rejects deadlines past ~2 years.
/// Reconcilers recompute their deadline on every wake-up, so an early wake-up only re-arms.
pub(crate) const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// De-duplicating work queue with per-key serialization and delayed re-queue.
///
/// A key is either queued, running, or idle. Pushing a running key marks it dirty so it is
/// queued again once the current reconciliation finishes.
pub(crate) struct WorkQueue {
    ready: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    running: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    delays: DelayQueue<ObjectKey>,
    timers: HashMap<ObjectKey, delay_queue::Key>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            queued: HashSet::new(),
            running: HashSet::new(),
            dirty: HashSet::new(),
            delays: DelayQueue::new(),
            timers: HashMap::new(),
        }
    }

    pub fn push(&mut self, key: ObjectKey) {
        if self.running.contains(&key) {
            self.dirty.insert(key);
        } else if self.queued.insert(key.clone()) {
            self.ready.push_back(key);
        }
    }

    /// Next key to reconcile; it stays running until [`WorkQueue::done`].
    pub fn pop(&mut self) -> Option<ObjectKey> {
        let key = self.ready.pop_front()?;
        self.queued.remove(&key);
        self.running.insert(key.clone());
        Some(key)
    }

    pub fn done(&mut self, key: &ObjectKey) {
        self.running.remove(key);
        if self.dirty.remove(key) {
            self.push(key.clone());
        }
    }

    /// Replace any pending wake-up of `key` with one after `delay`, capped at [`MAX_DELAY`].
    pub fn schedule(&mut self, key: ObjectKey, delay: Duration) {
        let delay = delay.min(MAX_DELAY);
        match self.timers.get(&key) {
            Some(timer) => self.delays.reset(timer, delay),
            None => {
                let timer = self.delays.insert(key.clone(), delay);
                self.timers.insert(key, timer);
            }
        }
    }

    pub fn cancel(&mut self, key: &ObjectKey) {
        if let Some(timer) = self.timers.remove(key) {
            self.delays.remove(&timer);
        }
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Resolves with the next key whose wake-up is due.
    pub async fn expired(&mut self) -> Option<ObjectKey> {
        let expired = poll_fn(|cx| self.delays.poll_expired(cx)).await?;
        let key = expired.into_inner();
        self.timers.remove(&key);
        Some(key)
    }

    pub fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.running.is_empty()
    }
}
