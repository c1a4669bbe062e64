//! exec-fs core library.
//!
//! A virtual filesystem in which files hold no stored bytes: the final path
//! segment names a shell command, and reading the file returns that command's
//! captured stdout. Entries under the caching subtree keep their output
//! forever; all other entries refresh under an adaptive backoff policy.
//!
//! Existence checks and directory listings are *not* pure reads in this
//! filesystem: enumerating a dynamic entry may execute its command as a side
//! effect. See [`namespace::Namespace::list_children`].

/// Entry attribute snapshots and permission bits.
pub mod attr;
/// Protocol-facing filesystem operations.
pub mod driver;
/// Per-path command output entries and the refresh policy.
pub mod entry;
/// The command execution capability.
pub mod exec;
/// Bounded LRU memo for repeated path lookups.
pub mod memo;
/// Path resolution and the dynamic entry registry.
pub mod namespace;
