//! The fuser adapter.
//!
//! Translates the kernel's inode-addressed requests into the Driver's
//! path-addressed contract. All work happens inline on the FUSE dispatch
//! thread: command execution is synchronous and blocking by design, so a
//! slow command suspends the request that triggered it.

use std::ffi::OsStr;
use std::time::{Duration, SystemTime};

use tracing::{debug, instrument, warn};

use exec_fs::attr::EntryAttr;
use exec_fs::driver::{DirEntryKind, Driver};

use super::inode_table::{Inode, InodeTable};

/// Attribute TTL handed to the kernel. Zero: non-caching entries can change
/// on every refresh, so the kernel must re-ask us each time.
const ATTR_TTL: Duration = Duration::ZERO;

pub struct FuserAdapter {
    driver: Driver,
    inodes: InodeTable,
    owner: (u32, u32),
}

impl FuserAdapter {
    #[must_use]
    pub fn new(driver: Driver, owner: (u32, u32)) -> Self {
        Self {
            driver,
            inodes: InodeTable::new(),
            owner,
        }
    }

    fn join(dir: &str, name: &str) -> String {
        if dir == "/" {
            format!("/{name}")
        } else {
            format!("{dir}/{name}")
        }
    }

    /// Path for `ino`, owned so the table can be mutated afterwards.
    fn path_of(&self, ino: Inode) -> Option<String> {
        let path = self.inodes.path(ino);
        if path.is_none() {
            warn!(ino, "request for unknown inode");
        }
        path.map(str::to_owned)
    }

    fn to_fuser_attr(&self, ino: Inode, attr: EntryAttr) -> fuser::FileAttr {
        let (kind, size, perm, times, nlink) = match attr {
            EntryAttr::RegularFile { size, perm, times } => {
                (fuser::FileType::RegularFile, size, perm, times, 1)
            }
            EntryAttr::Directory { perm, times } => {
                (fuser::FileType::Directory, 0, perm, times, 2)
            }
        };

        fuser::FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: times.atime,
            mtime: times.mtime,
            ctime: times.ctime,
            crtime: times.ctime,
            kind,
            perm: perm.bits(),
            nlink,
            uid: self.owner.0,
            gid: self.owner.1,
            rdev: 0,
            blksize: Driver::BLOCK_SIZE,
            flags: 0,
        }
    }
}

impl fuser::Filesystem for FuserAdapter {
    #[instrument(name = "FuserAdapter::lookup", skip(self, _req, reply))]
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };

        let path = Self::join(&parent_path, name);
        match self.driver.getattr(&path) {
            Ok(attr) => {
                let ino = self.inodes.bind(&path);
                debug!(path, ino, "lookup hit");
                reply.entry(&ATTR_TTL, &self.to_fuser_attr(ino, attr), 0);
            }
            Err(e) => {
                debug!(path, error = %e, "lookup miss");
                reply.error(e.into());
            }
        }
    }

    #[instrument(name = "FuserAdapter::getattr", skip(self, _req, _fh, reply))]
    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.getattr(&path) {
            Ok(attr) => reply.attr(&ATTR_TTL, &self.to_fuser_attr(ino, attr)),
            Err(e) => reply.error(e.into()),
        }
    }

    #[expect(clippy::too_many_arguments, reason = "mirrors fuser setattr API")]
    #[instrument(name = "FuserAdapter::setattr", skip_all, fields(ino, size))]
    fn setattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        if let Some(length) = size
            && let Err(e) = self.driver.truncate(&path, length)
        {
            reply.error(e.into());
            return;
        }

        // Mode/owner/time changes are accepted but not stored.
        match self.driver.getattr(&path) {
            Ok(attr) => reply.attr(&ATTR_TTL, &self.to_fuser_attr(ino, attr)),
            Err(e) => reply.error(e.into()),
        }
    }

    #[instrument(name = "FuserAdapter::readdir", skip(self, _req, _fh, reply))]
    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let entries = match self.driver.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path, error = %e, "readdir failed");
                reply.error(e.into());
                return;
            }
        };

        #[expect(
            clippy::cast_possible_truncation,
            reason = "fuser offset is i64 but always non-negative"
        )]
        for (i, entry) in entries
            .iter()
            .enumerate()
            .skip(offset.cast_unsigned() as usize)
        {
            let child_ino = match entry.name.as_str() {
                "." => ino,
                ".." => InodeTable::ROOT_INO,
                name => self.inodes.peek(&Self::join(&path, name)),
            };
            let kind = match entry.kind {
                DirEntryKind::RegularFile => fuser::FileType::RegularFile,
                DirEntryKind::Directory => fuser::FileType::Directory,
            };

            let Ok(idx) = i64::try_from(i + 1) else {
                reply.error(libc::EIO);
                return;
            };
            if reply.add(child_ino, idx, kind, &entry.name) {
                break;
            }
        }

        reply.ok();
    }

    #[instrument(name = "FuserAdapter::open", skip(self, _req, reply))]
    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.open(&path, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.into()),
        }
    }

    #[expect(clippy::too_many_arguments, reason = "mirrors fuser read API")]
    #[instrument(name = "FuserAdapter::read", skip(self, _req, _fh, _flags, _lock_owner, reply))]
    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.read(&path, size, offset.cast_unsigned()) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.into()),
        }
    }

    #[expect(clippy::too_many_arguments, reason = "mirrors fuser write API")]
    #[instrument(
        name = "FuserAdapter::write",
        skip(self, _req, _fh, data, _write_flags, _flags, _lock_owner, reply)
    )]
    fn write(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.write(&path, data, offset.cast_unsigned()) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.into()),
        }
    }

    #[instrument(
        name = "FuserAdapter::release",
        skip(self, _req, _flags, _lock_owner, _flush, reply)
    )]
    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        self.driver.release(&path, fh);
        reply.ok();
    }

    #[instrument(name = "FuserAdapter::unlink", skip(self, _req, reply))]
    fn unlink(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.unlink(&Self::join(&parent_path, name)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.into()),
        }
    }

    #[instrument(name = "FuserAdapter::forget", skip(self, _req))]
    fn forget(&mut self, _req: &fuser::Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    #[instrument(name = "FuserAdapter::statfs", skip(self, _req, _ino, reply))]
    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let stats = self.driver.statfs();
        reply.statfs(
            stats.total_blocks,
            stats.free_blocks,
            stats.available_blocks,
            stats.total_inodes,
            stats.free_inodes,
            stats.block_size,
            stats.max_filename_length,
            stats.block_size,
        );
    }
}
