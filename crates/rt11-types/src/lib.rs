#![forbid(unsafe_code)]
//! On-disk constants and codecs shared across the rt11fs workspace.
//!
//! Everything in this crate describes the RT-11 volume format itself: the
//! directory segment and entry layout, the entry status bits, the Rad50
//! filename packing, and the packed creation-date word.

pub mod date;
pub mod rad50;

pub use rad50::{Rad50Name, format_filename, parse_filename};

/// Unit of addressing on the volume.
pub const SECTOR_SIZE: usize = 512;

/// Sector address of the first directory segment.
pub const FIRST_SEGMENT_SECTOR: u64 = 6;

/// Every directory segment is exactly two sectors (1 KiB).
pub const SECTORS_PER_SEGMENT: u64 = 2;

/// Byte length of one directory segment.
pub const SEGMENT_BYTES: usize = SECTOR_SIZE * SECTORS_PER_SEGMENT as usize;

// ── Segment header words (byte offsets from the segment start) ──────────────

/// Total segments allocated for the directory, fixed at format time.
pub const TOTAL_SEGMENTS: usize = 0;
/// 1-based index of the next segment in the chain; 0 terminates the list.
pub const NEXT_SEGMENT: usize = 2;
/// Highest segment in use. Maintained only in segment 1.
pub const HIGHEST_SEGMENT: usize = 4;
/// Extra bytes appended to every entry; identical across all segments.
pub const EXTRA_BYTES: usize = 6;
/// Starting sector of the first file described by this segment.
pub const SEGMENT_DATA_SECTOR: usize = 8;
/// Entries begin at this offset within the segment.
pub const FIRST_ENTRY_OFFSET: usize = 10;

// ── Entry fields (byte offsets from the entry start) ────────────────────────

/// Status bitmask word.
pub const STATUS_WORD: usize = 0;
/// Three Rad50 words holding the 6.3 filename.
pub const FILENAME_WORDS: usize = 2;
/// File length in sectors.
pub const TOTAL_LENGTH_WORD: usize = 8;
/// Owning job, meaningful only on tentative entries.
pub const JOB_BYTE: usize = 10;
/// Owning channel, meaningful only on tentative entries.
pub const CHANNEL_BYTE: usize = 11;
/// Packed creation date word.
pub const CREATION_DATE_WORD: usize = 12;
/// Entry length before any per-volume extra bytes.
pub const ENTRY_LENGTH: usize = 14;

/// Directory entry status bits.
///
/// Values are the RT-11 on-disk bit assignments (octal, PDP-11 convention).
pub mod status {
    /// Entry has prefix blocks; such files are carried opaquely.
    pub const PREFIX: u16 = 0o20;
    /// Entry is tentative: an open file not yet made permanent.
    pub const TENTATIVE: u16 = 0o400;
    /// Entry is free space.
    pub const EMPTY: u16 = 0o1000;
    /// Entry is a permanent file.
    pub const PERMANENT: u16 = 0o2000;
    /// Entry marks the end of its segment.
    pub const END_OF_SEGMENT: u16 = 0o4000;
    /// File is read-only.
    pub const READ_ONLY: u16 = 0o40000;
    /// File is protected.
    pub const PROTECTED: u16 = 0o100000;
}

/// Longest printable filename: six basename characters, a dot, and a
/// three-character extension.
pub const FILENAME_MAX: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_fields_fit_in_minimal_entry() {
        assert!(CREATION_DATE_WORD + 2 <= ENTRY_LENGTH);
        assert_eq!(SEGMENT_BYTES, 1024);
    }

    #[test]
    fn status_bits_are_distinct() {
        let bits = [
            status::PREFIX,
            status::TENTATIVE,
            status::EMPTY,
            status::PERMANENT,
            status::END_OF_SEGMENT,
            status::READ_ONLY,
            status::PROTECTED,
        ];
        for (i, a) in bits.iter().enumerate() {
            for b in &bits[i + 1..] {
                assert_eq!(a & b, 0, "{a:#o} overlaps {b:#o}");
            }
        }
    }
}
