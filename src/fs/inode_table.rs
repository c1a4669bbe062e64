//! Inode to path bookkeeping with reference counting.
//!
//! The kernel speaks inodes; the engine speaks paths. This table owns the
//! mapping between the two and tracks the kernel's lookup counts so records
//! are dropped once the kernel forgets them.

use std::collections::HashMap;

use tracing::{trace, warn};

pub type Inode = u64;

struct InodeRecord {
    path: String,
    rc: u64,
}

pub struct InodeTable {
    by_ino: HashMap<Inode, InodeRecord>,
    by_path: HashMap<String, Inode>,
    next_ino: Inode,
}

impl InodeTable {
    pub const ROOT_INO: Inode = 1;

    #[must_use]
    pub fn new() -> Self {
        let mut by_ino = HashMap::new();
        by_ino.insert(
            Self::ROOT_INO,
            InodeRecord {
                path: "/".to_owned(),
                rc: 1,
            },
        );

        let mut by_path = HashMap::new();
        by_path.insert("/".to_owned(), Self::ROOT_INO);

        Self {
            by_ino,
            by_path,
            next_ino: Self::ROOT_INO + 1,
        }
    }

    #[must_use]
    pub fn path(&self, ino: Inode) -> Option<&str> {
        self.by_ino.get(&ino).map(|record| record.path.as_str())
    }

    fn get_or_insert(&mut self, path: &str) -> Inode {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }

        let ino = self.next_ino;
        self.next_ino += 1;
        self.by_ino.insert(
            ino,
            InodeRecord {
                path: path.to_owned(),
                rc: 0,
            },
        );
        self.by_path.insert(path.to_owned(), ino);
        trace!(ino, path, "allocated inode");
        ino
    }

    /// Inode for `path`, bumping the kernel lookup count. Used on lookup
    /// replies, which the kernel balances with forget.
    pub fn bind(&mut self, path: &str) -> Inode {
        let ino = self.get_or_insert(path);
        if let Some(record) = self.by_ino.get_mut(&ino) {
            record.rc += 1;
        }
        ino
    }

    /// Inode for `path` without touching the lookup count. Used for readdir
    /// listings, which do not pin entries in the kernel.
    pub fn peek(&mut self, path: &str) -> Inode {
        self.get_or_insert(path)
    }

    /// Decrement the lookup count by `nlookups`, evicting the record when it
    /// drains. The root inode is never evicted.
    pub fn forget(&mut self, ino: Inode, nlookups: u64) {
        if ino == Self::ROOT_INO {
            return;
        }

        match self.by_ino.entry(ino) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                if entry.get().rc <= nlookups {
                    let record = entry.remove();
                    self.by_path.remove(&record.path);
                    trace!(ino, path = %record.path, "evicted inode");
                } else {
                    entry.get_mut().rc -= nlookups;
                }
            }
            std::collections::hash_map::Entry::Vacant(_) => {
                warn!(ino, "forget on unknown inode");
            }
        }
    }

    #[must_use]
    pub fn inode_count(&self) -> usize {
        self.by_ino.len()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_is_stable_for_the_same_path() {
        let mut table = InodeTable::new();
        let a = table.bind("/a");
        let b = table.bind("/a");
        assert_eq!(a, b);
        assert_eq!(table.path(a), Some("/a"));
    }

    #[test]
    fn forget_drains_lookup_counts() {
        let mut table = InodeTable::new();
        let ino = table.bind("/a");
        let _ = table.bind("/a");

        table.forget(ino, 1);
        assert_eq!(table.path(ino), Some("/a"));

        table.forget(ino, 1);
        assert_eq!(table.path(ino), None);
        assert_eq!(table.inode_count(), 1);
    }

    #[test]
    fn peek_does_not_pin() {
        let mut table = InodeTable::new();
        let ino = table.peek("/b");
        table.forget(ino, 1);
        assert_eq!(table.path(ino), None);
    }

    #[test]
    fn root_survives_forget() {
        let mut table = InodeTable::new();
        table.forget(InodeTable::ROOT_INO, 100);
        assert_eq!(table.path(InodeTable::ROOT_INO), Some("/"));
    }
}
