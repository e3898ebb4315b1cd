//! The open-file table.
//!
//! File handles are small indices into a slot vector. Each slot holds a
//! reference count and a directory cursor; when the directory relocates
//! entries, the emitted move log is applied here so every live handle keeps
//! pointing at its file.

use rt11_block::BlockCache;
use rt11_dir::{DirPtr, Directory, EntryMove};
use rt11_error::{Result, Rt11Error};
use rt11_types::{SECTOR_SIZE, TOTAL_LENGTH_WORD, parse_filename};
use tracing::debug;

/// A file handle: an index into the table.
pub type Fd = usize;

#[derive(Debug)]
struct OpenFileEntry {
    refs: u32,
    ptr: DirPtr,
}

/// Reference-counted table of open files.
#[derive(Debug, Default)]
pub struct OpenFileTable {
    files: Vec<OpenFileEntry>,
}

impl OpenFileTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total references held across all slots.
    #[must_use]
    pub fn open_handles(&self) -> u32 {
        self.files.iter().map(|slot| slot.refs).sum()
    }

    fn slot(&self, fd: Fd) -> Result<&OpenFileEntry> {
        match self.files.get(fd) {
            Some(slot) if slot.refs > 0 => Ok(slot),
            _ => Err(Rt11Error::BadFileHandle),
        }
    }

    /// Open a named file. Opening the same file twice shares one slot.
    pub fn open(&mut self, dir: &Directory, name: &str) -> Result<Fd> {
        let rad50 = parse_filename(name).ok_or(Rt11Error::InvalidName)?;
        let ptr = dir.get_dir_pointer(&rad50)?;
        if ptr.after_end() {
            return Err(Rt11Error::NotFound);
        }
        Ok(self.insert(ptr))
    }

    fn insert(&mut self, ptr: DirPtr) -> Fd {
        if let Some(fd) = self
            .files
            .iter()
            .position(|slot| slot.refs > 0 && slot.ptr == ptr)
        {
            self.files[fd].refs += 1;
            return fd;
        }

        let entry = OpenFileEntry { refs: 1, ptr };
        match self.files.iter().position(|slot| slot.refs == 0) {
            Some(fd) => {
                self.files[fd] = entry;
                fd
            }
            None => {
                self.files.push(entry);
                self.files.len() - 1
            }
        }
    }

    /// Open a file, creating it if absent. An existing file is truncated
    /// to zero, keeping its identity.
    pub fn create(&mut self, dir: &mut Directory, cache: &mut BlockCache, name: &str) -> Result<Fd> {
        let rad50 = parse_filename(name).ok_or(Rt11Error::InvalidName)?;

        let existing = dir.get_dir_pointer(&rad50)?;
        if !existing.after_end() {
            let fd = self.insert(existing);
            self.truncate(dir, cache, fd, 0)?;
            return Ok(fd);
        }

        let mut moves = Vec::new();
        let ptr = dir.create_entry(name, &mut moves)?;
        self.apply_moves(dir, &moves)?;
        Ok(self.insert(ptr))
    }

    /// Drop one reference. Releasing the last reference commits a
    /// tentative entry and flushes the cache.
    pub fn close(&mut self, dir: &mut Directory, cache: &mut BlockCache, fd: Fd) -> Result<()> {
        self.slot(fd)?;

        self.files[fd].refs -= 1;
        if self.files[fd].refs == 0 {
            debug!(event = "last_close", fd);
            dir.make_entry_permanent(&self.files[fd].ptr)?;
            cache.sync()?;
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes at `offset`. Reads past the end of the
    /// file transfer fewer bytes.
    pub fn read(
        &mut self,
        cache: &mut BlockCache,
        fd: Fd,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize> {
        let slot = self.slot(fd)?;
        let length = slot.ptr.get_word(TOTAL_LENGTH_WORD)?;
        let sector0 = slot.ptr.data_sector();

        let sector_size = SECTOR_SIZE as u64;
        let end = offset + buf.len() as u64;
        let mut at = offset;
        let mut got = 0_usize;

        while at < end {
            let sector = at / sector_size;
            if sector >= u64::from(length) {
                break;
            }
            let in_sector = (at % sector_size) as usize;
            let to_copy = (SECTOR_SIZE - in_sector).min((end - at) as usize);

            let block = cache.get_block(sector0 + sector, 1)?;
            block
                .lock()
                .copy_out(in_sector, &mut buf[got..got + to_copy])?;
            cache.put_block(&block);

            got += to_copy;
            at += to_copy as u64;
        }

        Ok(got)
    }

    /// Write `buf` at `offset`, extending the file first if needed.
    ///
    /// When an extension relocates the file, the tail of the last touched
    /// sector may hold whatever the free block held before; it is zeroed
    /// so short writes never expose stale bytes.
    pub fn write(
        &mut self,
        dir: &mut Directory,
        cache: &mut BlockCache,
        fd: Fd,
        buf: &[u8],
        offset: u64,
    ) -> Result<usize> {
        let slot = self.slot(fd)?;

        let sector_size = SECTOR_SIZE as u64;
        let end = offset + buf.len() as u64;
        let length_bytes = slot.ptr.get_word(TOTAL_LENGTH_WORD)? as u64 * sector_size;
        let extending = end > length_bytes;

        if extending {
            let ptr = slot.ptr.clone();
            let mut moves = Vec::new();
            dir.truncate(cache, &ptr, end, &mut moves)?;
            self.apply_moves(dir, &moves)?;
        }

        // the slot's cursor may have been rewritten by the move log
        let sector0 = self.slot(fd)?.ptr.data_sector();

        let mut at = offset;
        let mut put = 0_usize;

        while at < end {
            let sector = at / sector_size;
            let in_sector = (at % sector_size) as usize;
            let to_copy = (SECTOR_SIZE - in_sector).min((end - at) as usize);

            let block = cache.get_block(sector0 + sector, 1)?;
            {
                let mut guard = block.lock();
                guard.copy_in(in_sector, &buf[put..put + to_copy])?;
                if extending && in_sector + to_copy < SECTOR_SIZE {
                    guard.zero_fill(in_sector + to_copy, SECTOR_SIZE - (in_sector + to_copy))?;
                }
            }
            cache.put_block(&block);

            put += to_copy;
            at += to_copy as u64;
        }

        Ok(put)
    }

    /// Resize an open file.
    pub fn truncate(
        &mut self,
        dir: &mut Directory,
        cache: &mut BlockCache,
        fd: Fd,
        new_size: u64,
    ) -> Result<()> {
        let ptr = self.slot(fd)?.ptr.clone();
        let mut moves = Vec::new();
        dir.truncate(cache, &ptr, new_size, &mut moves)?;
        self.apply_moves(dir, &moves)
    }

    /// Remove a named file, fixing up any handles the removal displaced.
    pub fn unlink(&mut self, dir: &mut Directory, name: &str) -> Result<()> {
        let mut moves = Vec::new();
        dir.remove_entry(name, &mut moves)?;
        self.apply_moves(dir, &moves)
    }

    /// Rewrite the cursors of slots whose entries the directory moved.
    ///
    /// Matching runs against the positions held before any rewrite, so a
    /// chain like (1:1→1:2, 1:2→1:3) cannot double-apply. Rewritten
    /// cursors are re-seeked through the directory, which refreshes their
    /// data sectors from the segment headers.
    pub fn apply_moves(&mut self, dir: &Directory, moves: &[EntryMove]) -> Result<()> {
        if moves.is_empty() {
            return Ok(());
        }

        let mut targets: Vec<Option<&EntryMove>> = Vec::with_capacity(self.files.len());
        for slot in &self.files {
            if slot.refs == 0 {
                targets.push(None);
                continue;
            }
            targets.push(moves.iter().find(|m| {
                m.from.segment == slot.ptr.segment() && m.from.index == slot.ptr.index()
            }));
        }

        for (slot_index, target) in targets.iter().enumerate() {
            let Some(entry_move) = target else { continue };
            let moved = dir
                .pointer_to(entry_move.to.segment, entry_move.to.index)?
                .ok_or_else(|| {
                    Rt11Error::Corrupt("move log names a nonexistent destination".into())
                })?;
            debug!(
                event = "handle_moved",
                fd = slot_index,
                to_segment = entry_move.to.segment,
                to_index = entry_move.to.index
            );
            self.files[slot_index].ptr = moved;
        }
        Ok(())
    }
}
