//! Accessor-side retries with bounded exponential backoff.
//!
//! [`Retrying`] wraps any [`RemoteAccessor`] and repeats calls that fail with
//! a retryable [`RemoteError`]. Once the retry budget is spent the last error
//! escalates unchanged. The apply orchestrator itself never retries.

use crate::remote::{RemoteAccessor, RemoteResult};
use crate::ItemRecord;
use rand::Rng;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Exponential delay schedule, optionally with full jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        let delay_ms = if self.jitter {
            rng.gen_range(0..=exp)
        } else {
            exp
        };
        Duration::from_millis(delay_ms)
    }
}

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Three retries, starting at one second and doubling up to sixteen.
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(16), false),
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping. Meant for tests and in-memory accessors.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::new(Duration::ZERO, Duration::ZERO, false),
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.backoff.jitter = jitter;
        self
    }
}

/// An accessor decorator that retries transient failures.
#[derive(Debug, Clone)]
pub struct Retrying<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A> Retrying<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call`, retrying retryable errors up to the policy's budget.
    pub fn call<T>(
        &self,
        what: &str,
        mut call: impl FnMut() -> RemoteResult<T>,
    ) -> RemoteResult<T> {
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff.delay(attempt);
                    warn!(
                        call = what,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying remote call"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<A: RemoteAccessor> RemoteAccessor for Retrying<A> {
    fn get(&self, id: &str) -> RemoteResult<ItemRecord> {
        self.call("get", || self.inner.get(id))
    }

    fn list_children(&self, parent_id: &str) -> RemoteResult<Vec<ItemRecord>> {
        self.call("list_children", || self.inner.list_children(parent_id))
    }

    fn create_folder(&self, name: &str, parent_id: &str) -> RemoteResult<ItemRecord> {
        self.call("create_folder", || self.inner.create_folder(name, parent_id))
    }

    fn rename(&self, id: &str, new_name: &str) -> RemoteResult<ItemRecord> {
        self.call("rename", || self.inner.rename(id, new_name))
    }

    fn move_item(&self, id: &str, new_parent_id: &str) -> RemoteResult<ItemRecord> {
        self.call("move_item", || self.inner.move_item(id, new_parent_id))
    }

    fn copy(
        &self,
        id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> RemoteResult<ItemRecord> {
        self.call("copy", || self.inner.copy(id, new_parent_id, new_name))
    }

    fn trash(&self, id: &str) -> RemoteResult<()> {
        self.call("trash", || self.inner.trash(id))
    }

    fn delete_permanently(&self, id: &str) -> RemoteResult<()> {
        self.call("delete_permanently", || self.inner.delete_permanently(id))
    }

    fn upload_file(
        &self,
        local_path: &Path,
        parent_id: &str,
        name: Option<&str>,
    ) -> RemoteResult<ItemRecord> {
        self.call("upload_file", || {
            self.inner.upload_file(local_path, parent_id, name)
        })
    }

    fn download_file(&self, id: &str, local_path: &Path, overwrite: bool) -> RemoteResult<()> {
        self.call("download_file", || {
            self.inner.download_file(id, local_path, overwrite)
        })
    }
}
