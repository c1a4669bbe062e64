//! FUSE-facing glue: inode bookkeeping and the fuser adapter.

pub mod fuse;
pub mod inode_table;
