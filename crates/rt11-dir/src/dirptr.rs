//! The directory cursor.

use crate::tracker::EntryPos;
use rt11_block::BlockRef;
use rt11_error::{Result, Rt11Error};
use rt11_types::{
    EXTRA_BYTES, ENTRY_LENGTH, FIRST_ENTRY_OFFSET, NEXT_SEGMENT, SEGMENT_BYTES,
    SEGMENT_DATA_SECTOR, STATUS_WORD, TOTAL_LENGTH_WORD, status,
};

/// Sentinel value of `segment` before the first entry.
const BEFORE_START: i32 = -1;
/// Sentinel value of `segment` past the last entry.
const AFTER_END: i32 = 0;

/// A cursor into the directory: (segment, index) plus the cached byte
/// offset of the segment header and the starting data sector of the entry
/// under the cursor.
///
/// The whole directory lives in one oversized block, so entry addresses are
/// plain byte offsets within it. Cursors are cheap to clone and compare by
/// (segment, index); they must not outlive the block cache that owns the
/// directory block.
#[derive(Debug, Clone)]
pub struct DirPtr {
    dirblk: BlockRef,
    entry_size: usize,
    segment: i32,
    index: usize,
    segment_base: usize,
    data_sector: u64,
}

impl PartialEq for DirPtr {
    fn eq(&self, other: &Self) -> bool {
        self.segment == other.segment && self.index == other.index
    }
}

impl Eq for DirPtr {}

impl DirPtr {
    /// A cursor at the "before start" sentinel.
    pub(crate) fn start(dirblk: &BlockRef) -> Result<Self> {
        let (entry_size, data_sector) = {
            let block = dirblk.lock();
            let extra = block.extract_word(EXTRA_BYTES)? as usize;
            let first_data = u64::from(block.extract_word(SEGMENT_DATA_SECTOR)?);
            (ENTRY_LENGTH + extra, first_data)
        };

        Ok(Self {
            dirblk: BlockRef::clone(dirblk),
            entry_size,
            segment: BEFORE_START,
            index: 0,
            segment_base: 0,
            data_sector,
        })
    }

    #[must_use]
    pub fn before_start(&self) -> bool {
        self.segment == BEFORE_START
    }

    #[must_use]
    pub fn after_end(&self) -> bool {
        self.segment == AFTER_END
    }

    /// 1-based segment of the entry under the cursor.
    ///
    /// Only meaningful when the cursor is on an entry.
    #[must_use]
    pub fn segment(&self) -> u16 {
        debug_assert!(!self.before_start() && !self.after_end());
        self.segment as u16
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Starting data sector of the entry under the cursor.
    #[must_use]
    pub fn data_sector(&self) -> u64 {
        self.data_sector
    }

    pub(crate) fn entry_pos(&self) -> EntryPos {
        EntryPos {
            segment: self.segment(),
            index: self.index,
        }
    }

    /// Byte offset, within the directory block, of a field of the entry
    /// under the cursor.
    #[must_use]
    pub(crate) fn offset(&self, delta: usize) -> usize {
        self.segment_base + FIRST_ENTRY_OFFSET + self.index * self.entry_size + delta
    }

    pub fn get_word(&self, delta: usize) -> Result<u16> {
        self.dirblk.lock().extract_word(self.offset(delta))
    }

    pub fn set_word(&self, delta: usize, value: u16) -> Result<()> {
        self.dirblk.lock().set_word(self.offset(delta), value)
    }

    pub fn get_byte(&self, delta: usize) -> Result<u8> {
        self.dirblk.lock().get_byte(self.offset(delta))
    }

    pub fn set_byte(&self, delta: usize, value: u8) -> Result<()> {
        self.dirblk.lock().set_byte(self.offset(delta), value)
    }

    /// Read a word from the header of the segment under the cursor.
    pub fn segment_word(&self, offset: usize) -> Result<u16> {
        self.dirblk.lock().extract_word(self.segment_base + offset)
    }

    /// Write a word into the header of the segment under the cursor.
    pub fn set_segment_word(&self, offset: usize, value: u16) -> Result<()> {
        self.dirblk.lock().set_word(self.segment_base + offset, value)
    }

    /// File length in sectors of the entry under the cursor.
    pub fn length(&self) -> Result<u64> {
        Ok(u64::from(self.get_word(TOTAL_LENGTH_WORD)?))
    }

    /// True when every bit of `mask` is set in the status word.
    pub fn has_status(&self, mask: u16) -> Result<bool> {
        Ok(self.get_word(STATUS_WORD)? & mask == mask)
    }

    /// True when any bit of `mask` is set in the status word.
    pub fn has_any_status(&self, mask: u16) -> Result<bool> {
        Ok(self.get_word(STATUS_WORD)? & mask != 0)
    }

    fn set_segment(&mut self, segment: u16) {
        self.segment = i32::from(segment);
        self.segment_base = (segment as usize - 1) * SEGMENT_BYTES;
    }

    /// Advance to the next entry in scan order.
    ///
    /// Past-the-end cursors stay put. Crossing into a segment reloads
    /// `data_sector` from that segment's header, keeping the arithmetic and
    /// the on-disk value consistent.
    pub fn increment(&mut self) -> Result<()> {
        if self.after_end() {
            return Ok(());
        }

        if self.before_start() {
            self.set_segment(1);
            self.index = 0;
            self.data_sector = u64::from(self.segment_word(SEGMENT_DATA_SECTOR)?);
            return Ok(());
        }

        if !self.has_status(status::END_OF_SEGMENT)? {
            self.data_sector += self.length()?;
            self.index += 1;
            return Ok(());
        }

        // at the end-of-segment marker: follow the chain
        let next = self.segment_word(NEXT_SEGMENT)?;
        if next == 0 {
            self.segment = AFTER_END;
            return Ok(());
        }

        self.set_segment(next);
        self.index = 0;
        self.data_sector = u64::from(self.segment_word(SEGMENT_DATA_SECTOR)?);
        Ok(())
    }

    /// Step back to the previous entry in scan order.
    ///
    /// Segment headers carry no back-link, so entering a segment from its
    /// end walks the chain from segment 1. The directory is small; the
    /// linear walk is fine.
    pub fn decrement(&mut self) -> Result<()> {
        if self.before_start() {
            return Ok(());
        }

        if self.after_end() {
            self.set_segment(1);
            loop {
                let next = self.segment_word(NEXT_SEGMENT)?;
                if next == 0 {
                    break;
                }
                self.set_segment(next);
            }
            return self.seek_end_of_segment();
        }

        if self.index > 0 {
            self.index -= 1;
            self.data_sector -= self.length()?;
            return Ok(());
        }

        if self.segment == 1 {
            self.segment = BEFORE_START;
            return Ok(());
        }

        // find the segment whose chain link points at us
        let current = self.segment as u16;
        self.set_segment(1);
        loop {
            let next = self.segment_word(NEXT_SEGMENT)?;
            if next == 0 {
                return Err(Rt11Error::Corrupt(format!(
                    "segment {current} is not on the directory chain"
                )));
            }
            if next == current {
                break;
            }
            self.set_segment(next);
        }
        self.seek_end_of_segment()
    }

    /// Position at the end-of-segment marker of the current segment.
    fn seek_end_of_segment(&mut self) -> Result<()> {
        self.index = 0;
        self.data_sector = u64::from(self.segment_word(SEGMENT_DATA_SECTOR)?);
        while !self.has_status(status::END_OF_SEGMENT)? {
            self.increment()?;
        }
        Ok(())
    }

    /// A copy advanced one entry.
    pub fn next(&self) -> Result<DirPtr> {
        let mut ptr = self.clone();
        ptr.increment()?;
        Ok(ptr)
    }

    /// A copy stepped back one entry.
    pub fn prev(&self) -> Result<DirPtr> {
        let mut ptr = self.clone();
        ptr.decrement()?;
        Ok(ptr)
    }
}
