//! A cached run of contiguous sectors.

use crate::DataSource;
use rt11_error::{Result, Rt11Error};
use rt11_types::SECTOR_SIZE;
use tracing::trace;

fn byte_len(sectors: u64) -> Result<usize> {
    let bytes = sectors
        .checked_mul(SECTOR_SIZE as u64)
        .ok_or_else(|| Rt11Error::Bounds(format!("sector count {sectors} overflows")))?;
    usize::try_from(bytes).map_err(|_| Rt11Error::Bounds(format!("byte length {bytes} overflows")))
}

/// A run of `count` contiguous sectors starting at `sector`, resident in
/// memory.
///
/// Blocks are owned by the cache; holders reference them through the cache's
/// `get_block`/`put_block` pairing. Every mutator marks the block dirty; the
/// dirty flag clears when the block is read or written through its data
/// source.
#[derive(Debug)]
pub struct Block {
    sector: u64,
    count: u64,
    data: Vec<u8>,
    dirty: bool,
    refs: u32,
}

impl Block {
    pub fn new(sector: u64, count: u64) -> Result<Self> {
        Ok(Self {
            sector,
            count,
            data: vec![0_u8; byte_len(count)?],
            dirty: false,
            refs: 0,
        })
    }

    #[must_use]
    pub fn sector(&self) -> u64 {
        self.sector
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn refs(&self) -> u32 {
        self.refs
    }

    pub fn add_ref(&mut self) {
        self.refs += 1;
    }

    pub fn release(&mut self) {
        self.refs = self.refs.saturating_sub(1);
    }

    fn check(&self, offset: usize, len: usize, what: &str) -> Result<()> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| Rt11Error::Bounds(format!("{what} range overflows")))?;
        if end > self.data.len() {
            return Err(Rt11Error::Bounds(format!(
                "{what} past end of block: offset={offset} len={len} block_len={}",
                self.data.len()
            )));
        }
        Ok(())
    }

    pub fn get_byte(&self, offset: usize) -> Result<u8> {
        self.check(offset, 1, "byte read")?;
        Ok(self.data[offset])
    }

    pub fn set_byte(&mut self, offset: usize, value: u8) -> Result<()> {
        self.check(offset, 1, "byte write")?;
        self.data[offset] = value;
        self.dirty = true;
        Ok(())
    }

    /// Read a 16-bit word in PDP-11 (little-endian) byte order.
    pub fn extract_word(&self, offset: usize) -> Result<u16> {
        self.check(offset, 2, "word read")?;
        Ok(u16::from_le_bytes([self.data[offset], self.data[offset + 1]]))
    }

    /// Store a 16-bit word in PDP-11 (little-endian) byte order.
    pub fn set_word(&mut self, offset: usize, value: u16) -> Result<()> {
        self.check(offset, 2, "word write")?;
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        self.dirty = true;
        Ok(())
    }

    /// Fill the block from its data source. Success clears the dirty flag;
    /// the caller is responsible for flushing a dirty block first.
    pub fn read(&mut self, source: &dyn DataSource) -> Result<()> {
        let offset = self.sector * SECTOR_SIZE as u64;
        source.read_exact_at(offset, &mut self.data)?;
        self.dirty = false;
        Ok(())
    }

    /// Write the block back to its data source, clearing the dirty flag.
    pub fn write(&mut self, source: &mut dyn DataSource) -> Result<()> {
        let offset = self.sector * SECTOR_SIZE as u64;
        source.write_all_at(offset, &self.data)?;
        self.dirty = false;
        Ok(())
    }

    /// Bounded copy out of the block into a caller buffer.
    pub fn copy_out(&self, offset: usize, dest: &mut [u8]) -> Result<()> {
        self.check(offset, dest.len(), "copy out")?;
        dest.copy_from_slice(&self.data[offset..offset + dest.len()]);
        Ok(())
    }

    /// Bounded copy from a caller buffer into the block.
    pub fn copy_in(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        self.check(offset, src.len(), "copy in")?;
        self.data[offset..offset + src.len()].copy_from_slice(src);
        self.dirty = true;
        Ok(())
    }

    /// Move bytes inside the block. Overlapping ranges are safe.
    pub fn copy_within_block(&mut self, src: usize, dst: usize, len: usize) -> Result<()> {
        self.check(src, len, "copy within")?;
        self.check(dst, len, "copy within")?;
        self.data.copy_within(src..src + len, dst);
        self.dirty = true;
        Ok(())
    }

    /// Copy bytes from another block. The cache guarantees resident blocks
    /// never overlap, so a plain copy suffices.
    pub fn copy_from_other_block(
        &mut self,
        source: &Block,
        src_offset: usize,
        dst_offset: usize,
        len: usize,
    ) -> Result<()> {
        source.check(src_offset, len, "copy between blocks")?;
        self.check(dst_offset, len, "copy between blocks")?;
        self.data[dst_offset..dst_offset + len]
            .copy_from_slice(&source.data[src_offset..src_offset + len]);
        self.dirty = true;
        Ok(())
    }

    /// Zero part of the block.
    pub fn zero_fill(&mut self, offset: usize, len: usize) -> Result<()> {
        self.check(offset, len, "zero fill")?;
        self.data[offset..offset + len].fill(0);
        self.dirty = true;
        Ok(())
    }

    /// Resize the block to `new_count` sectors.
    ///
    /// Growth reads the additional tail from the data source; if that read
    /// fails the buffer is restored to its previous size before the error
    /// propagates.
    pub fn resize(&mut self, new_count: u64, source: &dyn DataSource) -> Result<()> {
        let old_bytes = byte_len(self.count)?;
        let new_bytes = byte_len(new_count)?;
        self.data.resize(new_bytes, 0);

        if new_count > self.count {
            let offset = (self.sector + self.count) * SECTOR_SIZE as u64;
            if let Err(err) = source.read_exact_at(offset, &mut self.data[old_bytes..]) {
                self.data.truncate(old_bytes);
                return Err(err);
            }
        }

        trace!(
            event = "block_resize",
            sector = self.sector,
            from = self.count,
            to = new_count
        );
        self.count = new_count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDataSource;

    fn filled_source(len: usize) -> MemoryDataSource {
        let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        MemoryDataSource::from_vec(bytes)
    }

    #[test]
    fn words_are_little_endian() {
        let mut blk = Block::new(0, 1).unwrap();
        blk.set_word(10, 0o4000).unwrap();
        assert_eq!(blk.get_byte(10).unwrap(), 0x00);
        assert_eq!(blk.get_byte(11).unwrap(), 0x08);
        assert_eq!(blk.extract_word(10).unwrap(), 0o4000);
    }

    #[test]
    fn mutators_set_the_dirty_flag() {
        let mut blk = Block::new(0, 1).unwrap();
        assert!(!blk.is_dirty());
        blk.set_byte(0, 1).unwrap();
        assert!(blk.is_dirty());

        let mut src = MemoryDataSource::new(SECTOR_SIZE);
        blk.write(&mut src).unwrap();
        assert!(!blk.is_dirty());

        blk.zero_fill(0, 8).unwrap();
        assert!(blk.is_dirty());
    }

    #[test]
    fn out_of_range_access_is_fatal() {
        let mut blk = Block::new(0, 1).unwrap();
        assert!(matches!(blk.extract_word(511), Err(Rt11Error::Bounds(_))));
        assert!(matches!(blk.get_byte(512), Err(Rt11Error::Bounds(_))));
        assert!(matches!(
            blk.copy_within_block(500, 0, 100),
            Err(Rt11Error::Bounds(_))
        ));
        assert!(matches!(
            blk.copy_in(usize::MAX, &[0]),
            Err(Rt11Error::Bounds(_))
        ));
    }

    #[test]
    fn copy_within_handles_overlap() {
        let mut blk = Block::new(0, 1).unwrap();
        blk.copy_in(0, &[1, 2, 3, 4, 5, 6]).unwrap();
        blk.copy_within_block(0, 2, 4).unwrap();

        let mut out = [0_u8; 6];
        blk.copy_out(0, &mut out).unwrap();
        assert_eq!(out, [1, 2, 1, 2, 3, 4]);
    }

    #[test]
    fn copy_between_blocks() {
        let src_source = filled_source(SECTOR_SIZE);
        let mut a = Block::new(0, 1).unwrap();
        a.read(&src_source).unwrap();

        let mut b = Block::new(1, 1).unwrap();
        b.copy_from_other_block(&a, 0, 0, SECTOR_SIZE).unwrap();

        let mut out = [0_u8; 4];
        b.copy_out(100, &mut out).unwrap();
        assert_eq!(out, [100, 101, 102, 103]);
    }

    #[test]
    fn resize_grows_by_reading_the_tail() {
        let source = filled_source(4 * SECTOR_SIZE);
        let mut blk = Block::new(0, 1).unwrap();
        blk.read(&source).unwrap();

        blk.resize(3, &source).unwrap();
        assert_eq!(blk.count(), 3);
        assert_eq!(blk.get_byte(2 * SECTOR_SIZE).unwrap(), (1024 % 251) as u8);
    }

    #[test]
    fn failed_resize_restores_the_old_size() {
        let source = MemoryDataSource::new(SECTOR_SIZE);
        let mut blk = Block::new(0, 1).unwrap();
        blk.read(&source).unwrap();

        // the source has no second sector to backfill from
        assert!(blk.resize(2, &source).is_err());
        assert_eq!(blk.count(), 1);
        assert!(blk.extract_word(SECTOR_SIZE).is_err());
    }
}
