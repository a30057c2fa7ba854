//! Cooperative key-based lock manager.
//!
//! A job names the keys it touches. It starts as soon as none of those keys
//! is held; otherwise it waits in a FIFO queue (priority jobs go to the
//! front). The job receives an [`Unlock`] handle and releases it when done.
//! Every release re-scans the queue and starts each job that is no longer
//! blocked, dropping queued jobs whose deadline has passed.
//!
//! Jobs run as tokio tasks, so locking must happen inside a runtime.

use crate::time::format_duration;
use futures_util::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Queued jobs older than this are reported by
/// [`MutexManager::check_for_deadlocks`].
pub const DEADLOCK_THRESHOLD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutexError {
    #[error("lock {key} already released")]
    AlreadyReleased { key: LockKey },

    #[error("queued job for {key} expired before it could start")]
    Expired { key: LockKey },

    #[error("job for {key} queued for {waited}, possible deadlock")]
    Deadlock { key: LockKey, waited: String },
}

/// Normalised key set: sorted and deduplicated, displayed comma-joined.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockKey {
    parts: Vec<String>,
}

impl LockKey {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts: Vec<String> = keys.into_iter().map(Into::into).collect();
        parts.sort();
        parts.dedup();
        Self { parts }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join(","))
    }
}

impl From<&str> for LockKey {
    fn from(key: &str) -> Self {
        Self::new([key])
    }
}

impl From<String> for LockKey {
    fn from(key: String) -> Self {
        Self::new([key])
    }
}

impl From<Vec<String>> for LockKey {
    fn from(keys: Vec<String>) -> Self {
        Self::new(keys)
    }
}

impl<const N: usize> From<[&str; N]> for LockKey {
    fn from(keys: [&str; N]) -> Self {
        Self::new(keys)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LockOptions {
    /// Queue at the head instead of the tail.
    pub priority: bool,
    /// Drop the job if it is still queued at this instant.
    pub deadline: Option<Instant>,
}

impl LockOptions {
    pub fn priority() -> Self {
        Self {
            priority: true,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockOutcome {
    Started,
    Queued,
}

type Job = Box<dyn FnOnce(Unlock) -> BoxFuture<'static, ()> + Send>;

struct Waiting {
    key: LockKey,
    job: Job,
    deadline: Option<Instant>,
    enqueued_at: Instant,
}

#[derive(Default)]
struct LockTable {
    /// key part -> holder id
    held: HashMap<String, u64>,
    queue: VecDeque<Waiting>,
    next_holder: u64,
}

impl LockTable {
    fn is_blocked(&self, key: &LockKey) -> bool {
        key.parts.iter().any(|part| self.held.contains_key(part))
    }

    fn take(&mut self, key: &LockKey) -> u64 {
        self.next_holder += 1;
        let holder = self.next_holder;
        for part in &key.parts {
            self.held.insert(part.clone(), holder);
        }
        holder
    }

    fn release(&mut self, key: &LockKey, holder: u64) {
        for part in &key.parts {
            if self.held.get(part) == Some(&holder) {
                self.held.remove(part);
            }
        }
    }

    /// Pop every job that can start now, claiming its keys. Expired entries
    /// are handed back separately so they are dropped outside the table lock.
    fn drain_runnable(&mut self, now: Instant) -> (Vec<(LockKey, u64, Job)>, Vec<Waiting>) {
        let mut ready = Vec::new();
        let mut expired = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.queue.len());

        while let Some(waiting) = self.queue.pop_front() {
            if waiting.deadline.is_some_and(|deadline| deadline <= now) {
                expired.push(waiting);
            } else if self.is_blocked(&waiting.key) {
                remaining.push_back(waiting);
            } else {
                let holder = self.take(&waiting.key);
                ready.push((waiting.key, holder, waiting.job));
            }
        }

        self.queue = remaining;
        (ready, expired)
    }
}

fn lock_table(table: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

fn start(table: &Arc<Mutex<LockTable>>, key: LockKey, holder: u64, job: Job) {
    let unlock = Unlock {
        table: Arc::clone(table),
        key,
        holder,
        released: false,
    };
    tokio::spawn(job(unlock));
}

fn release(table: &Arc<Mutex<LockTable>>, key: &LockKey, holder: u64) {
    let (ready, expired) = {
        let mut guard = lock_table(table);
        guard.release(key, holder);
        guard.drain_runnable(Instant::now())
    };
    for waiting in expired {
        tracing::debug!(key = %waiting.key, "dropping expired queued job");
    }
    for (key, holder, job) in ready {
        start(table, key, holder, job);
    }
}

fn boxed<F, Fut>(job: F) -> Job
where
    F: FnOnce(Unlock) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |unlock| -> BoxFuture<'static, ()> { Box::pin(job(unlock)) })
}

/// Handle given to a running job. Releasing it frees the job's keys.
pub struct Unlock {
    table: Arc<Mutex<LockTable>>,
    key: LockKey,
    holder: u64,
    released: bool,
}

impl Unlock {
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn unlock(&mut self) -> Result<(), MutexError> {
        if self.released {
            return Err(MutexError::AlreadyReleased {
                key: self.key.clone(),
            });
        }
        self.released = true;
        release(&self.table, &self.key, self.holder);
        Ok(())
    }
}

impl Drop for Unlock {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(key = %self.key, "lock handle dropped while held, releasing");
            self.released = true;
            release(&self.table, &self.key, self.holder);
        }
    }
}

impl fmt::Debug for Unlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unlock")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish()
    }
}

/// Shared lock manager. Clones share the same lock table.
#[derive(Clone, Default)]
pub struct MutexManager {
    table: Arc<Mutex<LockTable>>,
}

impl MutexManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        lock_table(&self.table)
    }

    /// Run `job` now if none of `keys` is held, otherwise queue it.
    pub fn lock<F, Fut>(&self, keys: impl Into<LockKey>, options: LockOptions, job: F) -> LockOutcome
    where
        F: FnOnce(Unlock) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = keys.into();
        let job = boxed(job);
        let mut table = self.table();

        if table.is_blocked(&key) {
            tracing::trace!(key = %key, priority = options.priority, "lock contended, queueing job");
            let waiting = Waiting {
                key,
                job,
                deadline: options.deadline,
                enqueued_at: Instant::now(),
            };
            if options.priority {
                table.queue.push_front(waiting);
            } else {
                table.queue.push_back(waiting);
            }
            return LockOutcome::Queued;
        }

        let holder = table.take(&key);
        drop(table);
        start(&self.table, key, holder, job);
        LockOutcome::Started
    }

    /// Run `job` only if none of `keys` is held. Returns whether it started.
    pub fn lock_or_skip<F, Fut>(&self, keys: impl Into<LockKey>, job: F) -> bool
    where
        F: FnOnce(Unlock) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = keys.into();
        let mut table = self.table();
        if table.is_blocked(&key) {
            return false;
        }
        let holder = table.take(&key);
        drop(table);
        start(&self.table, key, holder, boxed(job));
        true
    }

    /// Wait until `keys` can be taken and return the held handle.
    pub async fn acquire(
        &self,
        keys: impl Into<LockKey>,
        options: LockOptions,
    ) -> Result<Unlock, MutexError> {
        let key = keys.into();
        let (tx, rx) = oneshot::channel();
        self.lock(key.clone(), options, move |unlock| async move {
            if let Err(mut unlock) = tx.send(unlock) {
                let _ = unlock.unlock();
            }
        });
        rx.await.map_err(|_| MutexError::Expired { key })
    }

    pub fn is_any_of_keys_locked(&self, keys: impl Into<LockKey>) -> bool {
        let key = keys.into();
        self.table().is_blocked(&key)
    }

    pub fn queue_len(&self) -> usize {
        self.table().queue.len()
    }

    /// Drop queued jobs whose deadline has passed. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Waiting> = {
            let mut table = self.table();
            let (expired, kept): (Vec<Waiting>, Vec<Waiting>) = std::mem::take(&mut table.queue)
                .into_iter()
                .partition(|w| w.deadline.is_some_and(|deadline| deadline <= now));
            table.queue = kept.into();
            expired
        };
        expired.len()
    }

    /// Report jobs queued longer than [`DEADLOCK_THRESHOLD`].
    pub fn check_for_deadlocks(&self) -> Result<(), MutexError> {
        let now = Instant::now();
        let table = self.table();
        let mut first = None;
        for waiting in &table.queue {
            let waited = now.saturating_duration_since(waiting.enqueued_at);
            if waited >= DEADLOCK_THRESHOLD {
                let waited = format_duration(waited.as_secs());
                tracing::error!(key = %waiting.key, waited = %waited, "queued job stuck behind held lock");
                first.get_or_insert_with(|| MutexError::Deadlock {
                    key: waiting.key.clone(),
                    waited,
                });
            }
        }
        first.map_or(Ok(()), Err)
    }
}
