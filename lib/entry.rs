//! Per-path command output entries.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::attr::{EntryAttr, EntryTimes};
use crate::exec::Executor;

/// Bounds on how often a non-caching entry may regenerate.
///
/// After a generation that took `elapsed`, the next one is allowed no sooner
/// than `min(elapsed + min_interval, max_interval)` past completion. Cheap
/// commands stay fresh; expensive commands are not re-run on every stat a
/// polling reader (say, an editor's file watcher) issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefreshPolicy {
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(500),
            max_interval: Duration::from_millis(3500),
        }
    }
}

/// The backing command has never produced output, or its last run failed.
#[derive(Debug, Clone, Copy, Error)]
#[error("command has produced no output")]
pub struct NoOutput;

#[derive(Debug)]
struct EntryState {
    data: Option<Bytes>,
    size: u64,
    times: EntryTimes,
    next_refresh: Instant,
    open_count: u64,
}

/// One path's cached-or-live execution result.
///
/// Holds the decoded command text, the freshness policy, and the open-handle
/// count. All data access goes through a per-entry mutex so two simultaneous
/// reads of the same path cannot both observe missing data and launch
/// duplicate executions; generation runs with the lock held.
pub struct CommandOutput {
    command: String,
    caching: bool,
    policy: RefreshPolicy,
    executor: Arc<dyn Executor>,
    state: Mutex<EntryState>,
}

impl std::fmt::Debug for CommandOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandOutput")
            .field("command", &self.command)
            .field("caching", &self.caching)
            .finish_non_exhaustive()
    }
}

impl CommandOutput {
    pub fn new(
        command: impl Into<String>,
        caching: bool,
        policy: RefreshPolicy,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            command: command.into(),
            caching,
            policy,
            executor,
            state: Mutex::new(EntryState {
                data: None,
                size: 0,
                times: EntryTimes::now(),
                next_refresh: Instant::now(),
                open_count: 0,
            }),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// True iff this entry lives under the caching subtree and keeps its
    /// output until explicitly overwritten.
    #[must_use]
    pub fn is_caching(&self) -> bool {
        self.caching
    }

    fn lock_state(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(state: &mut EntryState, data: Option<Bytes>) {
        state.size = data.as_ref().map_or(0, |d| d.len() as u64);
        state.data = data;
        state.times = EntryTimes::now();
    }

    /// Replace the stored data and recompute the attribute snapshot.
    ///
    /// Does not alter the refresh deadline or the open-handle count.
    pub fn set(&self, data: Option<Bytes>) {
        let mut state = self.lock_state();
        Self::store(&mut state, data);
    }

    /// Runs the command and stores the outcome. Caller holds the state lock.
    fn generate(&self, state: &mut EntryState) {
        let started = Instant::now();
        match self.executor.execute(&self.command) {
            Ok(stdout) => {
                let elapsed = started.elapsed();
                debug!(
                    command = %self.command,
                    bytes = stdout.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "command produced output"
                );
                Self::store(state, Some(stdout));
                let backoff = (elapsed + self.policy.min_interval).min(self.policy.max_interval);
                state.next_refresh = Instant::now() + backoff;
            }
            Err(e) => {
                debug!(command = %self.command, error = %e, "command failed");
                Self::store(state, None);
            }
        }
    }

    /// Return the entry's data, generating it first when absent or stale.
    ///
    /// A non-caching entry is stale once the refresh deadline has passed.
    /// With `consume` set, a non-caching entry's data is cleared after being
    /// returned, giving exactly-once delivery; ordinary reads pass `false`.
    pub fn get(&self, consume: bool) -> Option<Bytes> {
        let mut state = self.lock_state();
        let stale = !self.caching && Instant::now() >= state.next_refresh;
        if state.data.is_none() || stale {
            self.generate(&mut state);
        }

        let out = state.data.clone();
        if consume && !self.caching {
            state.data = None;
            state.size = 0;
        }
        out
    }

    /// Whether the backing command currently produces output.
    ///
    /// Not a free check: this may execute the command.
    pub fn exists(&self) -> bool {
        self.get(false).is_some()
    }

    /// Guard for operations that require the command to have produced
    /// output. May execute the command, like [`Self::exists`].
    pub fn check(&self) -> Result<(), NoOutput> {
        if self.exists() { Ok(()) } else { Err(NoOutput) }
    }

    /// Non-executing peek: whether output is present right now.
    #[must_use]
    pub fn has_output(&self) -> bool {
        self.lock_state().data.is_some()
    }

    /// Current data length, without triggering generation.
    #[must_use]
    pub fn data_len(&self) -> u64 {
        self.lock_state().size
    }

    /// Attribute snapshot derived from the current data.
    #[must_use]
    pub fn attr(&self) -> EntryAttr {
        let state = self.lock_state();
        EntryAttr::file(state.size, state.times)
    }

    pub fn increment_open(&self) {
        self.lock_state().open_count += 1;
    }

    /// Decrement the open-handle count. Returns true when the count has
    /// reached zero, signaling eligibility for eviction.
    pub fn decrement_open(&self) -> bool {
        let mut state = self.lock_state();
        if state.open_count == 0 {
            warn!(command = %self.command, "open count underflow, clamping at zero");
            return true;
        }
        state.open_count -= 1;
        state.open_count == 0
    }

    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.lock_state().open_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::EchoExecutor;

    fn echo_entry(caching: bool) -> CommandOutput {
        CommandOutput::new(
            "date",
            caching,
            RefreshPolicy::default(),
            Arc::new(EchoExecutor),
        )
    }

    #[test]
    fn set_updates_size_and_leaves_open_count() {
        let entry = echo_entry(true);
        entry.increment_open();
        entry.set(Some(Bytes::from_static(b"abc")));
        assert_eq!(entry.data_len(), 3);
        assert_eq!(entry.open_count(), 1);

        entry.set(None);
        assert_eq!(entry.data_len(), 0);
    }

    #[test]
    fn decrement_past_zero_is_clamped() {
        let entry = echo_entry(false);
        assert!(entry.decrement_open());
        assert!(entry.decrement_open());
        assert_eq!(entry.open_count(), 0);
    }

    #[test]
    fn consume_clears_non_caching_data() {
        let entry = echo_entry(false);
        assert_eq!(entry.get(true).as_deref(), Some(b"date\n".as_slice()));
        assert!(!entry.has_output());
    }

    #[test]
    fn consume_is_ignored_for_caching_entries() {
        let entry = echo_entry(true);
        assert_eq!(entry.get(true).as_deref(), Some(b"date\n".as_slice()));
        assert!(entry.has_output());
    }
}
