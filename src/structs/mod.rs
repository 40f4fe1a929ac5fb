mod block;
mod free_list;
mod inode;
mod version;

use std::io::{Read, Write};

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

pub use version::timestamp_now;

/// Storage unit size in bytes
pub const BLOCK_SIZE: usize = 4096;
/// Maximum file name length including the terminating null byte
pub const MAX_FILENAME_LENGTH: usize = 255;
/// Maximum count of files in the engine
pub const MAX_FILES: usize = 1024;
/// Block index 0 is reserved as the "no block" marker and never allocated
pub const SENTINEL_BLOCK: u64 = 0;
/// Length of a `YYYY-MM-DD HH:MM:SS` timestamp
pub const TIMESTAMP_LENGTH: usize = 19;

/// Record that can round-trip through a sequentially written device stream
pub(crate) trait PersistentRecord: Sized {
    type Error;
    fn load<D: Read>(device: &mut D) -> Result<Self, Self::Error>;
    fn flush<D: Write>(&self, device: &mut D) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone)]
pub struct Block {
    /// Raw data as bytes
    pub(crate) data: Vec<u8>,
    /// Index of the next block in the chain, [`SENTINEL_BLOCK`] at the end
    pub(crate) next: u64,
    /// Occupancy flag
    pub(crate) in_use: bool,
    /// Count of version chains holding this block alive
    pub(crate) ref_count: u64,
}

/// Immutable snapshot entry in a file's version history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// 1-based version number, monotonically increasing per file
    pub version_number: u64,
    /// First block of the version's content chain, [`SENTINEL_BLOCK`] if empty
    pub head_block: u64,
    /// Content length in bytes
    pub size: u64,
    /// Creation time as `YYYY-MM-DD HH:MM:SS` in local time
    pub timestamp: String,
    /// Offset at which this version starts to differ from its predecessor
    pub delta_start: u64,
    /// Length of the differing byte range
    pub delta_size: u64,
    /// Version number this one was derived from, 0 for the first
    pub prev_version: u64,
}

#[derive(Debug, Clone)]
pub struct Inode {
    /// Null-terminated file name
    pub(crate) filename: [u8; MAX_FILENAME_LENGTH],
    /// Head block of the current version
    pub(crate) head_block: u64,
    /// Size of the current version in bytes
    pub(crate) size: u64,
    /// Count of recorded versions
    pub(crate) version_count: u64,
    /// Occupancy flag
    pub(crate) in_use: bool,
    /// Append-only version history, oldest first
    pub(crate) history: Vec<VersionInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

/// Point-in-time status of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStatus {
    pub is_open: bool,
    pub is_modified: bool,
    pub size: u64,
    pub version: u64,
}

/// Open-file handle state, runtime only and never persisted
#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor {
    /// Slot of the owning inode
    pub(crate) inode: usize,
    pub(crate) mode: FileMode,
    /// Current byte position
    pub(crate) position: u64,
    pub(crate) valid: bool,
}

/// Contiguous run of free blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeExtent {
    pub(crate) start: u64,
    pub(crate) count: u64,
}

/// Ordered set of free extents, sorted by start, non-overlapping and merged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeList {
    pub(crate) extents: Vec<FreeExtent>,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct InodeRecord {
    pub(crate) filename: [u8; MAX_FILENAME_LENGTH],
    pub(crate) head_block: u64,
    pub(crate) size: u64,
    pub(crate) version_count: u64,
    pub(crate) in_use: u8,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct VersionRecord {
    pub(crate) version_number: u64,
    pub(crate) head_block: u64,
    pub(crate) size: u64,
    pub(crate) timestamp: [u8; TIMESTAMP_LENGTH],
    pub(crate) delta_start: u64,
    pub(crate) delta_size: u64,
    pub(crate) prev_version: u64,
}

/// Trailer following the data bytes of every serialized block
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct BlockRecord {
    pub(crate) next: u64,
    pub(crate) in_use: u8,
    pub(crate) ref_count: u64,
}
