//! Client-facing views of directory state.

use chrono::NaiveDate;
use rt11_types::Rad50Name;
use serde::Serialize;

/// A directory entry in a form usable by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEnt {
    /// The raw status word of the entry.
    pub status: u16,
    /// The file name as stored on disk.
    pub rad50_name: Rad50Name,
    /// The printable "BASENAME.EXT" form.
    pub name: String,
    /// File length in bytes.
    pub length: u64,
    /// First data sector of the file.
    pub sector0: u64,
    /// Decoded creation date, if one was recorded and is valid.
    pub created: Option<NaiveDate>,
}

/// Volume-level usage counters, statvfs-shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeStats {
    pub block_size: u32,
    pub fragment_size: u32,
    /// Sectors in the data region (volume minus boot area and directory).
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    /// Directory entry capacity, reserving the end marker slot per segment.
    pub files: u64,
    pub files_free: u64,
    pub name_max: u32,
}
