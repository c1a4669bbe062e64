//! Attribute snapshots for namespace entries.
//!
//! A slimmed-down attribute model: this filesystem only ever exposes regular
//! files (command outputs) and directories (the root and the caching
//! subtree), so the attribute type carries exactly those two kinds.

use std::time::SystemTime;

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u16 {
        // Other
        const OTHER_EXECUTE = 1 << 0;
        const OTHER_WRITE   = 1 << 1;
        const OTHER_READ    = 1 << 2;

        // Group
        const GROUP_EXECUTE = 1 << 3;
        const GROUP_WRITE   = 1 << 4;
        const GROUP_READ    = 1 << 5;

        // Owner
        const OWNER_EXECUTE = 1 << 6;
        const OWNER_WRITE   = 1 << 7;
        const OWNER_READ    = 1 << 8;

        // Special bits
        const STICKY        = 1 << 9;

        const OTHER_RWX = Self::OTHER_READ.bits()
            | Self::OTHER_WRITE.bits()
            | Self::OTHER_EXECUTE.bits();
        const GROUP_RWX = Self::GROUP_READ.bits()
            | Self::GROUP_WRITE.bits()
            | Self::GROUP_EXECUTE.bits();
        const OWNER_RWX = Self::OWNER_READ.bits()
            | Self::OWNER_WRITE.bits()
            | Self::OWNER_EXECUTE.bits();
    }
}

impl Permissions {
    /// Command-output files are world-writable with the sticky bit (0o1777):
    /// any caller may write into an entry, but the mode advertises the same
    /// shared-scratch semantics as /tmp.
    #[must_use]
    pub fn file_default() -> Self {
        Self::OWNER_RWX | Self::GROUP_RWX | Self::OTHER_RWX | Self::STICKY
    }

    /// Directories are `rwxr-xr-x` (0o755).
    #[must_use]
    pub fn dir_default() -> Self {
        Self::OWNER_RWX
            | Self::GROUP_READ
            | Self::GROUP_EXECUTE
            | Self::OTHER_READ
            | Self::OTHER_EXECUTE
    }
}

/// Timestamps shared by files and directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryTimes {
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl EntryTimes {
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now();
        Self {
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

/// Attribute snapshot for a namespace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryAttr {
    RegularFile {
        size: u64,
        perm: Permissions,
        times: EntryTimes,
    },
    Directory {
        perm: Permissions,
        times: EntryTimes,
    },
}

impl EntryAttr {
    /// A file attribute snapshot with default permissions.
    #[must_use]
    pub fn file(size: u64, times: EntryTimes) -> Self {
        Self::RegularFile {
            size,
            perm: Permissions::file_default(),
            times,
        }
    }

    /// A directory attribute snapshot with default permissions.
    #[must_use]
    pub fn directory(times: EntryTimes) -> Self {
        Self::Directory {
            perm: Permissions::dir_default(),
            times,
        }
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Self::RegularFile { size, .. } => *size,
            Self::Directory { .. } => 0,
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }
}

/// Aggregate statistics reported by statfs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilesystemStats {
    pub block_size: u32,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub available_blocks: u64,
    pub total_inodes: u64,
    pub free_inodes: u64,
    pub max_filename_length: u32,
}
