//! The directory engine.
//!
//! Parses and mutates the RT-11 segment/entry structure. The entire
//! directory is pinned into one resized cache block at mount, so moves
//! between segments are plain byte copies inside that block. Every mutating
//! operation reports the net entry relocations it performed so the
//! open-file table can keep its handles valid.

use crate::dirptr::DirPtr;
use crate::ent::{DirEnt, VolumeStats};
use crate::tracker::{DirChangeTracker, EntryMove, EntryPos};
use rt11_block::{BlockCache, BlockRef};
use rt11_error::{Result, Rt11Error};
use rt11_types::{
    CHANNEL_BYTE, CREATION_DATE_WORD, ENTRY_LENGTH, EXTRA_BYTES, FILENAME_MAX, FILENAME_WORDS,
    FIRST_ENTRY_OFFSET, FIRST_SEGMENT_SECTOR, HIGHEST_SEGMENT, JOB_BYTE, NEXT_SEGMENT,
    Rad50Name, SECTOR_SIZE, SECTORS_PER_SEGMENT, SEGMENT_BYTES, SEGMENT_DATA_SECTOR, STATUS_WORD,
    TOTAL_LENGTH_WORD, TOTAL_SEGMENTS, date, parse_filename, rad50, status,
};
use tracing::{debug, warn};

fn to_word(value: u64) -> Result<u16> {
    u16::try_from(value).map_err(|_| Rt11Error::Corrupt(format!("value {value} overflows a word")))
}

/// The directory data structure of a mounted RT-11 volume.
pub struct Directory {
    dirblk: BlockRef,
    entry_size: usize,
    volume_sectors: u64,
}

impl Directory {
    /// Mount the directory: pin segment 1, grow the block over the whole
    /// segment chain, and validate it.
    ///
    /// The chain must link strictly forward with no gaps, every segment must
    /// agree on the extra-bytes word, and `highest_segment` must equal the
    /// chain length; anything else is a corrupt image.
    pub fn new(cache: &mut BlockCache) -> Result<Self> {
        let volume_sectors = cache.volume_sectors();
        let max_segments =
            volume_sectors.saturating_sub(FIRST_SEGMENT_SECTOR) / SECTORS_PER_SEGMENT;

        let dirblk = cache.get_block(FIRST_SEGMENT_SECTOR, 1)?;
        let total = dirblk.lock().extract_word(TOTAL_SEGMENTS)?;
        if total == 0 || u64::from(total) >= max_segments {
            return Err(Rt11Error::Corrupt(format!(
                "directory claims {total} segments on a {volume_sectors}-sector volume"
            )));
        }

        cache.resize_block(&dirblk, u64::from(total) * SECTORS_PER_SEGMENT)?;

        let extra = dirblk.lock().extract_word(EXTRA_BYTES)?;
        let entry_size = ENTRY_LENGTH + extra as usize;
        if (SEGMENT_BYTES - FIRST_ENTRY_OFFSET) / entry_size < 2 {
            return Err(Rt11Error::Corrupt(format!(
                "extra-bytes word {extra} leaves no room for entries"
            )));
        }

        let mut position: u16 = 1;
        loop {
            let base = (usize::from(position) - 1) * SEGMENT_BYTES;
            let block = dirblk.lock();
            let this_extra = block.extract_word(base + EXTRA_BYTES)?;
            if this_extra != extra {
                return Err(Rt11Error::Corrupt(format!(
                    "segment {position} disagrees on extra bytes ({this_extra} != {extra})"
                )));
            }
            let next = block.extract_word(base + NEXT_SEGMENT)?;
            drop(block);

            if next == 0 {
                break;
            }
            if next != position + 1 || next > total {
                return Err(Rt11Error::Corrupt(format!(
                    "segment {position} links to segment {next}"
                )));
            }
            position = next;
        }

        let highest = dirblk.lock().extract_word(HIGHEST_SEGMENT)?;
        if highest != position {
            return Err(Rt11Error::Corrupt(format!(
                "highest segment {highest} does not match chain length {position}"
            )));
        }

        Ok(Self {
            dirblk,
            entry_size,
            volume_sectors,
        })
    }

    #[must_use]
    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    /// Entries one segment can hold, including its end marker.
    #[must_use]
    pub fn max_entries_per_segment(&self) -> usize {
        (SEGMENT_BYTES - FIRST_ENTRY_OFFSET) / self.entry_size
    }

    /// A cursor positioned just before the first entry.
    pub fn start_scan(&self) -> Result<DirPtr> {
        DirPtr::start(&self.dirblk)
    }

    /// Find the entry carrying `name`, or the past-the-end cursor.
    ///
    /// Free-space and end-marker entries are skipped, so the zero-filled
    /// names free entries carry can never be looked up.
    pub fn get_dir_pointer(&self, name: &Rad50Name) -> Result<DirPtr> {
        let mut ptr = self.start_scan()?;
        loop {
            ptr.increment()?;
            if ptr.after_end() {
                return Ok(ptr);
            }
            if ptr.has_any_status(status::END_OF_SEGMENT | status::EMPTY)? {
                continue;
            }
            if entry_name(&ptr)? == *name {
                return Ok(ptr);
            }
        }
    }

    /// Look up a printable filename.
    pub fn get_ent(&self, name: &str) -> Result<DirEnt> {
        let rad50 = parse_filename(name).ok_or(Rt11Error::InvalidName)?;
        let ptr = self.get_dir_pointer(&rad50)?;
        self.get_ent_at(&ptr)?.ok_or(Rt11Error::NotFound)
    }

    /// Materialize the entry under a cursor.
    pub fn get_ent_at(&self, ptr: &DirPtr) -> Result<Option<DirEnt>> {
        if ptr.before_start() || ptr.after_end() {
            return Ok(None);
        }

        let rad50_name = entry_name(ptr)?;
        Ok(Some(DirEnt {
            status: ptr.get_word(STATUS_WORD)?,
            rad50_name,
            name: rad50::format_filename(&rad50_name),
            length: ptr.length()? * SECTOR_SIZE as u64,
            sector0: ptr.data_sector(),
            created: date::decode_date(ptr.get_word(CREATION_DATE_WORD)?),
        }))
    }

    /// Advance `ptr` to the next entry with any bit of `mask` set.
    pub fn move_next_filtered(&self, ptr: &mut DirPtr, mask: u16) -> Result<bool> {
        loop {
            ptr.increment()?;
            if ptr.after_end() {
                return Ok(false);
            }
            if ptr.has_any_status(mask)? {
                return Ok(true);
            }
        }
    }

    /// Seek a cursor to (segment, index), recomputing its data sector.
    pub fn pointer_to(&self, segment: u16, index: usize) -> Result<Option<DirPtr>> {
        let mut ptr = self.start_scan()?;
        loop {
            ptr.increment()?;
            if ptr.after_end() {
                return Ok(None);
            }
            if ptr.segment() == segment && ptr.index() == index {
                return Ok(Some(ptr));
            }
        }
    }

    /// Usage counters for the whole volume.
    pub fn statfs(&self) -> Result<VolumeStats> {
        let total = u64::from(self.dirblk.lock().extract_word(TOTAL_SEGMENTS)?);
        let per_segment = (self.max_entries_per_segment() - 1) as u64;
        let files = total * per_segment;

        let mut free_sectors = 0_u64;
        let mut used_inodes = 0_u64;

        let mut ptr = self.start_scan()?;
        loop {
            ptr.increment()?;
            if ptr.after_end() {
                break;
            }
            if ptr.has_status(status::EMPTY)? {
                free_sectors += ptr.length()?;
            } else if !ptr.has_status(status::END_OF_SEGMENT)? {
                used_inodes += 1;
            }
        }

        Ok(VolumeStats {
            block_size: SECTOR_SIZE as u32,
            fragment_size: SECTOR_SIZE as u32,
            blocks: self
                .volume_sectors
                .saturating_sub(FIRST_SEGMENT_SECTOR + total * SECTORS_PER_SEGMENT),
            blocks_free: free_sectors,
            blocks_available: free_sectors,
            files,
            files_free: files.saturating_sub(used_inodes),
            name_max: FILENAME_MAX as u32,
        })
    }

    /// Resize the file under `ptr` to `new_size_bytes`, rounded up to whole
    /// sectors. Net entry relocations are appended to `moves`.
    pub fn truncate(
        &mut self,
        cache: &mut BlockCache,
        ptr: &DirPtr,
        new_size_bytes: u64,
        moves: &mut Vec<EntryMove>,
    ) -> Result<()> {
        if ptr.before_start() || ptr.after_end() {
            return Err(Rt11Error::NotFound);
        }

        let new_sectors = new_size_bytes.div_ceil(SECTOR_SIZE as u64);
        if new_sectors > u64::from(u16::MAX) {
            return Err(Rt11Error::NoSpace);
        }
        let old_sectors = ptr.length()?;
        if new_sectors == old_sectors {
            return Ok(());
        }

        debug!(
            event = "truncate",
            segment = ptr.segment(),
            index = ptr.index(),
            from = old_sectors,
            to = new_sectors
        );

        let mut tracker = DirChangeTracker::new();
        if new_sectors < old_sectors {
            self.shrink_entry(ptr, new_sectors, &mut tracker)?;
        } else {
            self.grow_entry(cache, ptr, new_sectors, &mut tracker)?;
        }

        moves.extend(tracker.moves());
        Ok(())
    }

    /// Turn the named entry into free space and merge it with free
    /// neighbors. The entry keeps its length; it now describes a hole.
    pub fn remove_entry(&mut self, name: &str, moves: &mut Vec<EntryMove>) -> Result<()> {
        let rad50 = parse_filename(name).ok_or(Rt11Error::InvalidName)?;
        let ptr = self.get_dir_pointer(&rad50)?;
        if ptr.after_end() {
            return Err(Rt11Error::NotFound);
        }

        debug!(event = "remove_entry", name);

        ptr.set_word(STATUS_WORD, status::EMPTY)?;
        ptr.set_word(FILENAME_WORDS, 0)?;
        ptr.set_word(FILENAME_WORDS + 2, 0)?;
        ptr.set_word(FILENAME_WORDS + 4, 0)?;
        ptr.set_byte(JOB_BYTE, 0)?;
        ptr.set_byte(CHANNEL_BYTE, 0)?;
        ptr.set_word(CREATION_DATE_WORD, 0)?;

        let mut tracker = DirChangeTracker::new();
        self.coalesce_neighboring_free_blocks(&ptr, &mut tracker)?;
        moves.extend(tracker.moves());
        Ok(())
    }

    /// Rename a file. Renaming onto another existing file is refused;
    /// renaming to the current name succeeds and does nothing.
    pub fn rename(&mut self, cache: &mut BlockCache, old: &str, new: &str) -> Result<()> {
        let old50 = parse_filename(old).ok_or(Rt11Error::InvalidName)?;
        let new50 = parse_filename(new).ok_or(Rt11Error::InvalidName)?;

        let ptr = self.get_dir_pointer(&old50)?;
        if ptr.after_end() {
            return Err(Rt11Error::NotFound);
        }
        if old50 == new50 {
            return Ok(());
        }
        if !self.get_dir_pointer(&new50)?.after_end() {
            return Err(Rt11Error::Exists);
        }

        debug!(event = "rename", from = old, to = new);

        ptr.set_word(FILENAME_WORDS, new50[0])?;
        ptr.set_word(FILENAME_WORDS + 2, new50[1])?;
        ptr.set_word(FILENAME_WORDS + 4, new50[2])?;

        cache.sync()
    }

    /// Allocate a zero-sector tentative entry carrying `name`.
    ///
    /// The entry is carved out of the largest free block. When the entry
    /// right before that block is itself an open file, the block is split
    /// in half and the new entry placed in the middle, leaving the open
    /// file room to grow.
    pub fn create_entry(&mut self, name: &str, moves: &mut Vec<EntryMove>) -> Result<DirPtr> {
        let rad50 = parse_filename(name).ok_or(Rt11Error::InvalidName)?;
        let mut tracker = DirChangeTracker::new();

        let mut free = self.find_largest_free_block()?;
        if free.after_end() {
            return Err(Rt11Error::NoSpace);
        }

        let prev = free.prev()?;
        let mut at = if !prev.before_start()
            && prev.has_status(status::TENTATIVE)?
            && free.length()? >= 2
        {
            let half = free.length()? / 2;
            self.carve_free_block(&mut free, half, &mut tracker)?;
            free.next()?
        } else {
            free.clone()
        };

        self.insert_empty_at(&mut at, &mut tracker)?;

        at.set_word(STATUS_WORD, status::TENTATIVE)?;
        at.set_word(FILENAME_WORDS, rad50[0])?;
        at.set_word(FILENAME_WORDS + 2, rad50[1])?;
        at.set_word(FILENAME_WORDS + 4, rad50[2])?;
        at.set_word(TOTAL_LENGTH_WORD, 0)?;
        at.set_byte(JOB_BYTE, 0)?;
        at.set_byte(CHANNEL_BYTE, 0)?;
        at.set_word(CREATION_DATE_WORD, date::current_date_word())?;

        debug!(
            event = "create_entry",
            name,
            segment = at.segment(),
            index = at.index()
        );

        moves.extend(tracker.moves());
        Ok(at)
    }

    /// Commit a tentative entry. Called when the last open handle closes.
    pub fn make_entry_permanent(&mut self, ptr: &DirPtr) -> Result<()> {
        if ptr.before_start() || ptr.after_end() {
            return Err(Rt11Error::NotFound);
        }
        let word = ptr.get_word(STATUS_WORD)?;
        ptr.set_word(
            STATUS_WORD,
            (word & !status::TENTATIVE) | status::PERMANENT,
        )
    }

    // ── Internal algorithms ─────────────────────────────────────────────────

    /// Shrink a file, handing the freed sectors to the free block on its
    /// right — materializing one there first if needed.
    fn shrink_entry(
        &mut self,
        dirp0: &DirPtr,
        new_size: u64,
        tracker: &mut DirChangeTracker,
    ) -> Result<()> {
        let mut dirp = dirp0.clone();
        let old_size = dirp.length()?;
        let mut hole = dirp.next()?;

        if !hole.has_status(status::EMPTY)? {
            self.insert_empty_at(&mut hole, tracker)?;
            // the insert may have spilled the file itself to another
            // segment; its entry is the one right before the new hole
            dirp = hole.prev()?;
        }

        let delta = old_size - new_size;
        dirp.set_word(TOTAL_LENGTH_WORD, to_word(new_size)?)?;
        hole.set_word(TOTAL_LENGTH_WORD, to_word(hole.length()? + delta)?)?;
        Ok(())
    }

    /// Grow a file: steal from a free right neighbor when possible, else
    /// relocate the file into a carved slice of the largest free block.
    fn grow_entry(
        &mut self,
        cache: &mut BlockCache,
        dirp0: &DirPtr,
        new_size: u64,
        tracker: &mut DirChangeTracker,
    ) -> Result<()> {
        let dirp = dirp0.clone();
        let old_size = dirp.length()?;

        let next = dirp.next()?;
        if next.has_status(status::EMPTY)? && old_size + next.length()? >= new_size {
            let delta = new_size - old_size;
            let remaining = next.length()? - delta;
            dirp.set_word(TOTAL_LENGTH_WORD, to_word(new_size)?)?;
            next.set_word(TOTAL_LENGTH_WORD, to_word(remaining)?)?;
            if remaining == 0 {
                self.delete_empty_at(&next, tracker)?;
            }
            return Ok(());
        }

        let name = entry_name(&dirp)?;

        let mut newp = self.find_largest_free_block()?;
        if newp.after_end() || newp.length()? < new_size {
            warn!(event = "grow_no_space", requested = new_size);
            return Err(Rt11Error::NoSpace);
        }

        self.carve_free_block(&mut newp, new_size, tracker)?;

        // the carve may have shifted entries, including the file's own;
        // re-resolving by name also refreshes its data sector
        let dirp = self.get_dir_pointer(&name)?;
        if dirp.after_end() {
            return Err(Rt11Error::Corrupt(
                "entry vanished while carving free space".into(),
            ));
        }

        // safe before the directory is updated: the destination is free
        let src0 = dirp.data_sector();
        let dst0 = newp.data_sector();
        for i in 0..old_size {
            let src = cache.get_block(src0 + i, 1)?;
            let dst = cache.get_block(dst0 + i, 1)?;
            {
                let src_guard = src.lock();
                let mut dst_guard = dst.lock();
                dst_guard.copy_from_other_block(&src_guard, 0, 0, SECTOR_SIZE)?;
            }
            cache.put_block(&src);
            cache.put_block(&dst);
        }

        self.move_entry_across_segments(&dirp, &newp, tracker)?;

        // the copy brought the old length along; stamp the real one
        newp.set_word(TOTAL_LENGTH_WORD, to_word(new_size)?)?;

        // the old slot becomes a hole of the file's former size
        dirp.set_word(STATUS_WORD, status::EMPTY)?;
        dirp.set_word(FILENAME_WORDS, 0)?;
        dirp.set_word(FILENAME_WORDS + 2, 0)?;
        dirp.set_word(FILENAME_WORDS + 4, 0)?;
        dirp.set_byte(JOB_BYTE, 0)?;
        dirp.set_byte(CHANNEL_BYTE, 0)?;
        dirp.set_word(CREATION_DATE_WORD, 0)?;

        self.coalesce_neighboring_free_blocks(&dirp, tracker)?;
        Ok(())
    }

    /// Shift the entries from `at` through the end marker one slot right
    /// and write a zero-sector free entry at the vacated position.
    ///
    /// `at` is updated to the new free entry; when a spill pushes the
    /// addressed position into the next segment, that is where `at` ends
    /// up.
    fn insert_empty_at(&mut self, at: &mut DirPtr, tracker: &mut DirChangeTracker) -> Result<()> {
        let mut eos = self.end_of_segment(at)?;

        if eos.index() + 1 >= self.max_entries_per_segment() {
            let spilled_index = eos.index() - 1;
            self.spill_last_entry(at, tracker)?;

            if at.index() > spilled_index {
                // `at` addressed the end-marker slot; its scan position now
                // sits right after the spilled entry heading the next segment
                let next_segment = at.segment_word(NEXT_SEGMENT)?;
                let mut slot = self
                    .pointer_to(next_segment, 1)?
                    .ok_or_else(|| Rt11Error::Corrupt("spill left no successor entry".into()))?;
                self.insert_empty_at(&mut slot, tracker)?;
                *at = slot;
                return Ok(());
            }

            eos = self.end_of_segment(at)?;
        }

        let count = eos.index() - at.index() + 1;
        self.move_entries_within_segment(at, at.index() + 1, count, tracker)?;

        at.set_word(STATUS_WORD, status::EMPTY)?;
        at.set_word(FILENAME_WORDS, 0)?;
        at.set_word(FILENAME_WORDS + 2, 0)?;
        at.set_word(FILENAME_WORDS + 4, 0)?;
        at.set_word(TOTAL_LENGTH_WORD, 0)?;
        at.set_byte(JOB_BYTE, 0)?;
        at.set_byte(CHANNEL_BYTE, 0)?;
        at.set_word(CREATION_DATE_WORD, 0)?;
        Ok(())
    }

    /// Remove a zero-length free entry by shifting everything after it one
    /// slot left. Non-empty entries cannot be deleted this way; the sector
    /// addresses of every following file would shift.
    fn delete_empty_at(&mut self, at: &DirPtr, tracker: &mut DirChangeTracker) -> Result<()> {
        debug_assert!(at.has_status(status::EMPTY)? && at.length()? == 0);

        let eos = self.end_of_segment(at)?;
        let from = at.next()?;
        let count = eos.index() - at.index();
        self.move_entries_within_segment(&from, at.index(), count, tracker)
    }

    /// Push the last entry of `within`'s segment into the first slot of the
    /// next segment, allocating one if the chain ends here. A full next
    /// segment spills recursively.
    fn spill_last_entry(
        &mut self,
        within: &DirPtr,
        tracker: &mut DirChangeTracker,
    ) -> Result<()> {
        let eos = self.end_of_segment(within)?;
        if eos.index() == 0 {
            // just the end marker; nothing to spill
            return Ok(());
        }

        let mut next_segment = eos.segment_word(NEXT_SEGMENT)?;
        if next_segment == 0 {
            self.allocate_new_segment()?;
            next_segment = eos.segment_word(NEXT_SEGMENT)?;
        }

        let last = eos.prev()?;

        let mut slot = self
            .pointer_to(next_segment, 0)?
            .ok_or_else(|| Rt11Error::Corrupt("next segment has no entries".into()))?;
        self.insert_empty_at(&mut slot, tracker)?;

        self.move_entry_across_segments(&last, &slot, tracker)?;
        slot.set_segment_word(SEGMENT_DATA_SECTOR, to_word(last.data_sector())?)?;

        // retire the old slot as the segment's end marker; the previous
        // marker's slot is simply left beyond the end, as RT-11 does
        last.set_word(STATUS_WORD, status::END_OF_SEGMENT)?;
        last.set_word(FILENAME_WORDS, 0)?;
        last.set_word(FILENAME_WORDS + 2, 0)?;
        last.set_word(FILENAME_WORDS + 4, 0)?;
        last.set_word(TOTAL_LENGTH_WORD, 0)?;
        Ok(())
    }

    /// Initialize and link the next unused segment.
    fn allocate_new_segment(&mut self) -> Result<()> {
        let (total, highest, extra) = {
            let block = self.dirblk.lock();
            (
                block.extract_word(TOTAL_SEGMENTS)?,
                block.extract_word(HIGHEST_SEGMENT)?,
                block.extract_word(EXTRA_BYTES)?,
            )
        };

        let next = highest + 1;
        if next > total {
            warn!(event = "segment_table_full", total);
            return Err(Rt11Error::NoSpace);
        }

        // the final end marker carries the end-of-data pointer and sits in
        // the current last segment
        let mut eos = self.start_scan()?;
        loop {
            let ahead = eos.next()?;
            if ahead.after_end() {
                break;
            }
            eos = ahead;
        }

        let header = (usize::from(next) - 1) * SEGMENT_BYTES;
        let entry0 = header + FIRST_ENTRY_OFFSET;
        {
            let mut block = self.dirblk.lock();
            block.set_word(header + TOTAL_SEGMENTS, total)?;
            block.set_word(header + NEXT_SEGMENT, 0)?;
            // per the format, only segment 1 maintains this word
            block.set_word(header + HIGHEST_SEGMENT, 0)?;
            block.set_word(header + EXTRA_BYTES, extra)?;
            block.set_word(header + SEGMENT_DATA_SECTOR, to_word(eos.data_sector())?)?;

            block.set_word(entry0 + STATUS_WORD, status::END_OF_SEGMENT)?;
            block.set_word(entry0 + FILENAME_WORDS, 0)?;
            block.set_word(entry0 + FILENAME_WORDS + 2, 0)?;
            block.set_word(entry0 + FILENAME_WORDS + 4, 0)?;
            block.set_word(entry0 + TOTAL_LENGTH_WORD, 0)?;
            block.set_byte(entry0 + JOB_BYTE, 0)?;
            block.set_byte(entry0 + CHANNEL_BYTE, 0)?;
            block.set_word(entry0 + CREATION_DATE_WORD, 0)?;
        }

        // link it and record the new high-water mark
        eos.set_segment_word(NEXT_SEGMENT, next)?;
        self.dirblk.lock().set_word(HIGHEST_SEGMENT, next)?;

        warn!(event = "segment_allocated", segment = next);
        Ok(())
    }

    /// Cursor to the largest free block, or past-the-end if there is none.
    fn find_largest_free_block(&self) -> Result<DirPtr> {
        let mut best: Option<DirPtr> = None;
        let mut best_len = 0_u64;

        let mut ptr = self.start_scan()?;
        loop {
            ptr.increment()?;
            if ptr.after_end() {
                break;
            }
            if !ptr.has_status(status::EMPTY)? {
                continue;
            }
            let len = ptr.length()?;
            if best.is_none() || len > best_len {
                best_len = len;
                best = Some(ptr.clone());
            }
        }

        Ok(best.unwrap_or(ptr))
    }

    /// Split `free` so it is exactly `size` sectors, pushing the remainder
    /// into a newly inserted free entry right after it.
    ///
    /// `free` is updated to its final position. Returns the position of the
    /// inserted remainder entry, if the split inserted one.
    fn carve_free_block(
        &mut self,
        free: &mut DirPtr,
        size: u64,
        tracker: &mut DirChangeTracker,
    ) -> Result<Option<EntryPos>> {
        let current = free.length()?;
        if size > current {
            return Err(Rt11Error::InvalidArgument(
                "carve larger than the free block",
            ));
        }
        if size == current {
            return Ok(None);
        }

        let mut tail = free.next()?;
        self.insert_empty_at(&mut tail, tracker)?;

        // wherever the insert (and any spill) left things, the free block
        // is the entry right before the new tail
        let carved = tail.prev()?;
        let delta = current - size;
        carved.set_word(TOTAL_LENGTH_WORD, to_word(size)?)?;
        tail.set_word(TOTAL_LENGTH_WORD, to_word(delta)?)?;

        *free = carved;
        Ok(Some(tail.entry_pos()))
    }

    /// Merge runs of adjacent free entries around `from` into one.
    ///
    /// End markers bound the walk, so free space never merges across a
    /// segment boundary; RT-11 cannot express that.
    fn coalesce_neighboring_free_blocks(
        &mut self,
        from: &DirPtr,
        tracker: &mut DirChangeTracker,
    ) -> Result<()> {
        let mut cur = from.clone();
        loop {
            let prev = cur.prev()?;
            if prev.before_start() || !prev.has_status(status::EMPTY)? {
                break;
            }
            cur = prev;
        }

        loop {
            let next = cur.next()?;
            if next.after_end() || !next.has_status(status::EMPTY)? {
                break;
            }
            let merged = cur.length()? + next.length()?;
            cur.set_word(TOTAL_LENGTH_WORD, to_word(merged)?)?;
            next.set_word(TOTAL_LENGTH_WORD, 0)?;
            self.delete_empty_at(&next, tracker)?;
        }
        Ok(())
    }

    /// Log and perform a shift of `count` entries within one segment.
    ///
    /// The moves are recorded as one transaction before the bytes move, so
    /// the tracker always reflects the final layout.
    fn move_entries_within_segment(
        &mut self,
        from: &DirPtr,
        dst_index: usize,
        count: usize,
        tracker: &mut DirChangeTracker,
    ) -> Result<()> {
        debug_assert!(dst_index + count <= self.max_entries_per_segment());

        let segment = from.segment();

        tracker.begin_transaction();
        for i in 0..count {
            let status_offset = self.entry_offset(segment, from.index() + i) + STATUS_WORD;
            let entry_status = self.dirblk.lock().extract_word(status_offset)?;
            tracker.move_dir_entry(
                entry_status,
                EntryPos {
                    segment,
                    index: from.index() + i,
                },
                EntryPos {
                    segment,
                    index: dst_index + i,
                },
            );
        }
        tracker.end_transaction();

        let src = self.entry_offset(segment, from.index());
        let dst = self.entry_offset(segment, dst_index);
        self.dirblk
            .lock()
            .copy_within_block(src, dst, count * self.entry_size)
    }

    /// Copy one entry's bytes to another slot and log the move.
    fn move_entry_across_segments(
        &mut self,
        src: &DirPtr,
        dst: &DirPtr,
        tracker: &mut DirChangeTracker,
    ) -> Result<()> {
        tracker.begin_transaction();
        let entry_status = src.get_word(STATUS_WORD)?;
        tracker.move_dir_entry(entry_status, src.entry_pos(), dst.entry_pos());
        tracker.end_transaction();

        self.dirblk
            .lock()
            .copy_within_block(src.offset(0), dst.offset(0), self.entry_size)
    }

    /// Cursor to the end marker of the segment holding `from`.
    fn end_of_segment(&self, from: &DirPtr) -> Result<DirPtr> {
        let mut eos = from.clone();
        while !eos.has_status(status::END_OF_SEGMENT)? {
            eos.increment()?;
        }
        Ok(eos)
    }

    fn entry_offset(&self, segment: u16, index: usize) -> usize {
        (usize::from(segment) - 1) * SEGMENT_BYTES + FIRST_ENTRY_OFFSET + index * self.entry_size
    }
}

fn entry_name(ptr: &DirPtr) -> Result<Rad50Name> {
    Ok([
        ptr.get_word(FILENAME_WORDS)?,
        ptr.get_word(FILENAME_WORDS + 2)?,
        ptr.get_word(FILENAME_WORDS + 4)?,
    ])
}
