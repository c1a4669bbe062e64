//! Path resolution and the dynamic entry registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use thiserror::Error;
use tracing::trace;

use crate::attr::{EntryAttr, EntryTimes};
use crate::entry::{CommandOutput, RefreshPolicy};
use crate::exec::Executor;
use crate::memo::LookupMemo;

/// Two-byte escape sequence rewritten to a literal `/` in command text.
///
/// A path segment cannot contain the separator, so commands with path-like
/// arguments are written as e.g. `cat ||etc||hosts`.
pub const SEPARATOR_ESCAPE: &str = "||";

/// Restore escaped separators in a path segment, yielding the command text.
#[must_use]
pub fn decode_command(segment: &str) -> String {
    segment.replace(SEPARATOR_ESCAPE, "/")
}

/// Strip a trailing separator, keeping the root path intact.
#[must_use]
pub fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Split a path into its parent directory and final segment.
fn parent_and_name(path: &str) -> Option<(&str, &str)> {
    let (parent, name) = path.rsplit_once('/')?;
    if name.is_empty() {
        return None;
    }
    Some((if parent.is_empty() { "/" } else { parent }, name))
}

#[derive(Debug, Clone, Copy, Error)]
#[error("no such directory in the namespace")]
pub struct UnknownDirectory;

#[derive(Debug, Clone, Copy, Error)]
pub enum RemoveError {
    #[error("static entries cannot be removed")]
    NotPermitted,

    #[error("no such entry")]
    NotFound,
}

/// The path → entry registry.
///
/// Holds the immutable static-directory table (the root and the caching
/// subtree), the dynamic [`CommandOutput`] registry, and a bounded lookup
/// memo that collapses back-to-back resolutions of the same unregistered
/// path.
pub struct Namespace {
    cache_root: String,
    static_entries: HashMap<String, EntryAttr>,
    dynamic: RwLock<HashMap<String, Arc<CommandOutput>>>,
    memo: Mutex<LookupMemo>,
    policy: RefreshPolicy,
    executor: Arc<dyn Executor>,
}

impl Namespace {
    /// Create a namespace with static directories `/` and `/<cache_dir>`.
    pub fn new(
        cache_dir: &str,
        memo_capacity: usize,
        policy: RefreshPolicy,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let cache_root = format!("/{}", cache_dir.trim_matches('/'));
        let times = EntryTimes::now();

        let mut static_entries = HashMap::new();
        static_entries.insert("/".to_owned(), EntryAttr::directory(times));
        static_entries.insert(cache_root.clone(), EntryAttr::directory(times));

        Self {
            cache_root,
            static_entries,
            dynamic: RwLock::new(HashMap::new()),
            memo: Mutex::new(LookupMemo::new(memo_capacity)),
            policy,
            executor,
        }
    }

    #[must_use]
    pub fn cache_root(&self) -> &str {
        &self.cache_root
    }

    fn lock_memo(&self) -> MutexGuard<'_, LookupMemo> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Direct lookup in the static-directory table.
    #[must_use]
    pub fn resolve_static(&self, path: &str) -> Option<EntryAttr> {
        self.static_entries.get(normalize(path)).copied()
    }

    fn build_entry(&self, path: &str) -> CommandOutput {
        let command = parent_and_name(path)
            .map(|(_, name)| decode_command(name))
            .unwrap_or_default();
        let caching = path.starts_with(&format!("{}/", self.cache_root));
        trace!(path, command = %command, caching, "building entry");
        CommandOutput::new(command, caching, self.policy, Arc::clone(&self.executor))
    }

    /// Resolve a path to its [`CommandOutput`], constructing one on first
    /// sight.
    ///
    /// An already-registered entry is returned as-is. Otherwise the memo is
    /// consulted so that a getattr immediately followed by an open on the
    /// same path shares one instance. With `create_if_absent` the entry is
    /// also registered in the dynamic table.
    pub fn resolve_dynamic(&self, path: &str, create_if_absent: bool) -> Arc<CommandOutput> {
        let path = normalize(path);
        if let Some(entry) = self.read_dynamic().get(path) {
            return Arc::clone(entry);
        }

        let entry = {
            let mut memo = self.lock_memo();
            let entry = memo
                .get(path)
                .unwrap_or_else(|| Arc::new(self.build_entry(path)));
            memo.insert(path, Arc::clone(&entry));
            entry
        };

        if create_if_absent {
            self.write_dynamic()
                .insert(path.to_owned(), Arc::clone(&entry));
        }

        entry
    }

    /// The registered entry for `path`, if any. Never constructs.
    #[must_use]
    pub fn registered(&self, path: &str) -> Option<Arc<CommandOutput>> {
        self.read_dynamic().get(normalize(path)).map(Arc::clone)
    }

    /// List the names under a static directory.
    ///
    /// Returns `.`, `..`, every static child, and every registered dynamic
    /// child that currently produces output. Listing is a side-effecting
    /// operation: each dynamic entry's `exists()` check may execute its
    /// command (or reuse a still-fresh result).
    pub fn list_children(&self, dir: &str) -> Result<Vec<String>, UnknownDirectory> {
        let dir = normalize(dir);
        if !self.static_entries.contains_key(dir) {
            return Err(UnknownDirectory);
        }

        let mut children: Vec<String> = self
            .static_entries
            .keys()
            .filter_map(|path| parent_and_name(path))
            .filter(|(parent, _)| *parent == dir)
            .map(|(_, name)| name.to_owned())
            .collect();

        // Snapshot the candidates, then drop the registry lock before the
        // exists() checks: generation can block for the full duration of an
        // external process.
        let candidates: Vec<(String, Arc<CommandOutput>)> = self
            .read_dynamic()
            .iter()
            .filter_map(|(path, entry)| {
                let (parent, name) = parent_and_name(path)?;
                (parent == dir).then(|| (name.to_owned(), Arc::clone(entry)))
            })
            .collect();

        for (name, entry) in candidates {
            if entry.exists() {
                children.push(name);
            }
        }

        children.sort_unstable();

        let mut names = vec![".".to_owned(), "..".to_owned()];
        names.extend(children);
        Ok(names)
    }

    /// Remove a dynamic entry. Static directories cannot be removed.
    pub fn remove(&self, path: &str) -> Result<(), RemoveError> {
        let path = normalize(path);
        if self.static_entries.contains_key(path) {
            return Err(RemoveError::NotPermitted);
        }
        if self.write_dynamic().remove(path).is_none() {
            return Err(RemoveError::NotFound);
        }
        self.lock_memo().remove(path);
        Ok(())
    }

    /// Drop a dynamic entry without existence reporting. Used when the last
    /// open handle on a non-caching entry is released.
    pub fn evict(&self, path: &str) {
        let path = normalize(path);
        self.write_dynamic().remove(path);
        self.lock_memo().remove(path);
    }

    /// Total bytes currently held across all dynamic entries.
    #[must_use]
    pub fn total_data_bytes(&self) -> u64 {
        self.read_dynamic()
            .values()
            .map(|entry| entry.data_len())
            .sum()
    }

    /// Number of registered dynamic entries.
    #[must_use]
    pub fn dynamic_count(&self) -> usize {
        self.read_dynamic().len()
    }

    fn read_dynamic(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<CommandOutput>>> {
        self.dynamic.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_dynamic(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<CommandOutput>>> {
        self.dynamic.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_command_restores_separators() {
        assert_eq!(decode_command("cat ||etc||hosts"), "cat /etc/hosts");
        assert_eq!(decode_command("uptime"), "uptime");
    }

    #[test]
    fn normalize_strips_trailing_separator_but_keeps_root() {
        assert_eq!(normalize("/cached/"), "/cached");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/a"), "/a");
    }

    #[test]
    fn parent_and_name_treats_root_children() {
        assert_eq!(parent_and_name("/ls"), Some(("/", "ls")));
        assert_eq!(parent_and_name("/cached/date"), Some(("/cached", "date")));
        assert_eq!(parent_and_name("relative"), None);
        assert_eq!(parent_and_name("/"), None);
    }
}
