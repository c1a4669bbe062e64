//! Protocol-facing filesystem operations.
//!
//! [`Driver`] is the thin contract the filesystem-protocol adapter calls
//! into. Every operation is keyed by path; the Driver asks the [`Namespace`]
//! to resolve the backing [`CommandOutput`](crate::entry::CommandOutput) and
//! translates its state into attributes, bytes, and errno-shaped errors.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::attr::{EntryAttr, EntryTimes, FilesystemStats};
use crate::entry::{NoOutput, RefreshPolicy};
use crate::exec::{EchoExecutor, Executor, ShellExecutor};
use crate::memo::LookupMemo;
use crate::namespace::{Namespace, RemoveError, UnknownDirectory, normalize};

pub type FileHandle = u64;

/// Monotonically increasing file handle allocator. Handle ids carry no
/// meaning beyond uniqueness within the session.
struct HandleTable {
    next_fh: AtomicU64,
}

impl HandleTable {
    fn new() -> Self {
        Self {
            next_fh: AtomicU64::new(1),
        }
    }

    #[must_use]
    fn allocate(&self) -> FileHandle {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Error)]
pub enum GetAttrError {
    #[error("no such entry")]
    NotFound,
}

impl From<NoOutput> for GetAttrError {
    fn from(_: NoOutput) -> Self {
        Self::NotFound
    }
}

impl From<GetAttrError> for i32 {
    fn from(e: GetAttrError) -> Self {
        match e {
            GetAttrError::NotFound => libc::ENOENT,
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
pub enum ReaddirError {
    #[error("no such directory")]
    NotFound,
}

impl From<UnknownDirectory> for ReaddirError {
    fn from(_: UnknownDirectory) -> Self {
        Self::NotFound
    }
}

impl From<ReaddirError> for i32 {
    fn from(e: ReaddirError) -> Self {
        match e {
            ReaddirError::NotFound => libc::ENOENT,
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
pub enum OpenError {
    #[error("no such entry")]
    NotFound,

    #[error("entry is a directory")]
    IsDirectory,
}

impl From<NoOutput> for OpenError {
    fn from(_: NoOutput) -> Self {
        Self::NotFound
    }
}

impl From<OpenError> for i32 {
    fn from(e: OpenError) -> Self {
        match e {
            OpenError::NotFound => libc::ENOENT,
            OpenError::IsDirectory => libc::EISDIR,
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
pub enum ReadError {
    #[error("no such entry")]
    NotFound,
}

impl From<ReadError> for i32 {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::NotFound => libc::ENOENT,
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
pub enum WriteError {
    #[error("entry is a directory")]
    IsDirectory,
}

impl From<WriteError> for i32 {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::IsDirectory => libc::EISDIR,
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
pub enum UnlinkError {
    #[error("no such entry")]
    NotFound,

    #[error("operation not permitted")]
    NotPermitted,
}

impl From<RemoveError> for UnlinkError {
    fn from(e: RemoveError) -> Self {
        match e {
            RemoveError::NotFound => Self::NotFound,
            RemoveError::NotPermitted => Self::NotPermitted,
        }
    }
}

impl From<UnlinkError> for i32 {
    fn from(e: UnlinkError) -> Self {
        match e {
            UnlinkError::NotFound => libc::ENOENT,
            UnlinkError::NotPermitted => libc::EPERM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirEntryKind {
    RegularFile,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    pub name: String,
    pub kind: DirEntryKind,
}

/// Configuration consumed by the Driver at construction.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Name of the caching subtree directory.
    pub cache_dir: String,

    /// Report placeholder attributes for unknown paths instead of executing
    /// their commands on getattr.
    pub unsafe_attrs: bool,

    /// Diagnostic mode: generation returns the command text itself instead
    /// of executing it.
    pub echo: bool,

    /// Working directory for command execution.
    pub workdir: Option<PathBuf>,

    pub refresh: RefreshPolicy,

    /// Capacity of the lookup memo.
    pub memo_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            cache_dir: "cached".to_owned(),
            unsafe_attrs: false,
            echo: false,
            workdir: None,
            refresh: RefreshPolicy::default(),
            memo_capacity: LookupMemo::DEFAULT_CAPACITY,
        }
    }
}

/// The filesystem-protocol surface, built purely on [`Namespace`] and
/// [`CommandOutput`](crate::entry::CommandOutput).
pub struct Driver {
    namespace: Namespace,
    handles: HandleTable,
    unsafe_attrs: bool,
}

impl Driver {
    pub const BLOCK_SIZE: u32 = 4096;

    /// Size reported for unknown paths in unsafe mode. Must be nonzero so
    /// that stat-before-open callers (shells doing tab completion) go on to
    /// open the file; the exact value is tunable, not load-bearing.
    pub const PLACEHOLDER_SIZE: u64 = 4 * 1024 * 1024;

    const MAX_FILENAME_LENGTH: u32 = 255;

    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        let executor: Arc<dyn Executor> = if config.echo {
            Arc::new(EchoExecutor)
        } else {
            Arc::new(ShellExecutor::new(config.workdir.clone()))
        };
        Self::with_executor(config, executor)
    }

    /// Construct with an explicit execution capability.
    #[must_use]
    pub fn with_executor(config: DriverConfig, executor: Arc<dyn Executor>) -> Self {
        Self {
            namespace: Namespace::new(
                &config.cache_dir,
                config.memo_capacity,
                config.refresh,
                executor,
            ),
            handles: HandleTable::new(),
            unsafe_attrs: config.unsafe_attrs,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn join(dir: &str, name: &str) -> String {
        if dir == "/" {
            format!("/{name}")
        } else {
            format!("{dir}/{name}")
        }
    }

    /// Attribute snapshot for a path.
    ///
    /// Static paths return fixed directory attributes. Dynamic paths require
    /// the command to have produced output, which may execute it here. In
    /// unsafe mode an unknown path is optimistically given placeholder
    /// regular-file attributes without execution.
    #[instrument(name = "Driver::getattr", level = "debug", skip(self))]
    pub fn getattr(&self, path: &str) -> Result<EntryAttr, GetAttrError> {
        let path = normalize(path);
        if let Some(attr) = self.namespace.resolve_static(path) {
            return Ok(attr);
        }

        let entry = self.namespace.resolve_dynamic(path, false);
        if self.unsafe_attrs && !entry.has_output() {
            return Ok(EntryAttr::file(Self::PLACEHOLDER_SIZE, EntryTimes::now()));
        }

        entry.check()?;
        Ok(entry.attr())
    }

    /// List a directory. Enumerating dynamic entries executes their commands
    /// as a side effect (or reuses still-fresh results).
    #[instrument(name = "Driver::readdir", level = "debug", skip(self))]
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, ReaddirError> {
        let dir = normalize(path);
        let names = self.namespace.list_children(dir)?;
        Ok(names
            .into_iter()
            .map(|name| {
                let kind = if name == "." || name == ".." {
                    DirEntryKind::Directory
                } else if self
                    .namespace
                    .resolve_static(&Self::join(dir, &name))
                    .is_some()
                {
                    DirEntryKind::Directory
                } else {
                    DirEntryKind::RegularFile
                };
                DirEntry { name, kind }
            })
            .collect())
    }

    /// Open a path, registering its entry and taking an open handle.
    #[instrument(name = "Driver::open", level = "debug", skip(self, _flags))]
    pub fn open(&self, path: &str, _flags: i32) -> Result<FileHandle, OpenError> {
        let path = normalize(path);
        if self.namespace.resolve_static(path).is_some() {
            return Err(OpenError::IsDirectory);
        }

        let entry = self.namespace.resolve_dynamic(path, true);
        entry.check()?;
        entry.increment_open();
        Ok(self.handles.allocate())
    }

    /// Read `[offset, offset + size)` from the entry's data, clipped to the
    /// available length. May trigger generation.
    #[instrument(name = "Driver::read", level = "debug", skip(self))]
    pub fn read(&self, path: &str, size: u32, offset: u64) -> Result<Bytes, ReadError> {
        let entry = self.namespace.resolve_dynamic(normalize(path), true);
        let data = entry.get(false).ok_or(ReadError::NotFound)?;

        let len = data.len() as u64;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "start and end are clipped to the buffer length"
        )]
        let (start, end) = (
            offset.min(len) as usize,
            offset.saturating_add(u64::from(size)).min(len) as usize,
        );
        Ok(data.slice(start..end))
    }

    /// Splice `buffer` into the entry's data at `offset`, zero-padding any
    /// gap. Succeeds structurally regardless of caching mode.
    #[instrument(name = "Driver::write", level = "debug", skip(self, buffer))]
    pub fn write(&self, path: &str, buffer: &[u8], offset: u64) -> Result<u32, WriteError> {
        let path = normalize(path);
        if self.namespace.resolve_static(path).is_some() {
            return Err(WriteError::IsDirectory);
        }

        let entry = self.namespace.resolve_dynamic(path, true);
        let current = entry.get(false).unwrap_or_default();

        #[expect(
            clippy::cast_possible_truncation,
            reason = "write offsets beyond addressable memory cannot be honored anyway"
        )]
        let offset = offset as usize;
        let end = offset + buffer.len();

        let mut out = Vec::with_capacity(current.len().max(end));
        out.extend_from_slice(&current);
        if out.len() < end {
            out.resize(end, 0);
        }
        out[offset..end].copy_from_slice(buffer);

        entry.set(Some(Bytes::from(out)));
        Ok(buffer.len() as u32)
    }

    /// Truncate or zero-pad the entry's data to exactly `length` bytes.
    #[instrument(name = "Driver::truncate", level = "debug", skip(self))]
    pub fn truncate(&self, path: &str, length: u64) -> Result<(), WriteError> {
        let path = normalize(path);
        if self.namespace.resolve_static(path).is_some() {
            return Err(WriteError::IsDirectory);
        }

        let entry = self.namespace.resolve_dynamic(path, true);
        let current = entry.get(false).unwrap_or_default();

        #[expect(
            clippy::cast_possible_truncation,
            reason = "lengths beyond addressable memory cannot be honored anyway"
        )]
        let length = length as usize;
        let mut out = current.to_vec();
        out.resize(length, 0);

        entry.set(Some(Bytes::from(out)));
        Ok(())
    }

    /// Drop an open handle. When the last handle on a non-caching entry goes
    /// away the entry is evicted from the registry, freeing its memory.
    #[instrument(name = "Driver::release", level = "debug", skip(self))]
    pub fn release(&self, path: &str, fh: FileHandle) {
        let path = normalize(path);
        let Some(entry) = self.namespace.registered(path) else {
            warn!(path, fh, "release of unregistered path");
            return;
        };

        let was_last = entry.decrement_open();
        if was_last && !entry.is_caching() {
            self.namespace.evict(path);
        }
    }

    /// Remove a dynamic entry. Static directories report NotPermitted.
    #[instrument(name = "Driver::unlink", level = "debug", skip(self))]
    pub fn unlink(&self, path: &str) -> Result<(), UnlinkError> {
        self.namespace.remove(normalize(path))?;
        Ok(())
    }

    /// Aggregate statistics. Block count reflects the bytes currently held
    /// by dynamic entries; no writable free space is exposed.
    #[must_use]
    pub fn statfs(&self) -> FilesystemStats {
        let total_bytes = self.namespace.total_data_bytes();
        FilesystemStats {
            block_size: Self::BLOCK_SIZE,
            total_blocks: 1 + total_bytes / u64::from(Self::BLOCK_SIZE),
            free_blocks: 0,
            available_blocks: 0,
            total_inodes: 2 + self.namespace.dynamic_count() as u64,
            free_inodes: 0,
            max_filename_length: Self::MAX_FILENAME_LENGTH,
        }
    }
}
