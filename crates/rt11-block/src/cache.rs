//! The resident block set.

use crate::{Block, DataSource};
use parking_lot::Mutex;
use rt11_error::{Result, Rt11Error};
use rt11_types::SECTOR_SIZE;
use std::sync::Arc;
use tracing::trace;

/// Shared handle to a resident block.
pub type BlockRef = Arc<Mutex<Block>>;

/// Non-overlapping set of resident blocks keyed by starting sector.
///
/// Blocks are read on first request and never evicted; the working set is
/// bounded by the directory size plus a few active data sectors. Each
/// `get_block` must be balanced by `put_block` when the holder is done.
pub struct BlockCache {
    source: Box<dyn DataSource>,
    volume_sectors: u64,
    blocks: Vec<BlockRef>,
}

impl BlockCache {
    pub fn new(source: Box<dyn DataSource>) -> Result<Self> {
        let volume_sectors = source.len_bytes()? / SECTOR_SIZE as u64;
        Ok(Self {
            source,
            volume_sectors,
            blocks: Vec::new(),
        })
    }

    #[must_use]
    pub fn volume_sectors(&self) -> u64 {
        self.volume_sectors
    }

    /// Number of resident blocks; test and diagnostics hook.
    #[must_use]
    pub fn resident_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Retrieve a block, reading it from the data source on a miss.
    ///
    /// A hit must request exactly the resident block's sector count. A
    /// request that straddles an existing block is refused; the resident
    /// set never overlaps.
    pub fn get_block(&mut self, sector: u64, count: u64) -> Result<BlockRef> {
        if count == 0 {
            return Err(Rt11Error::InvalidArgument("zero-sector block request"));
        }

        let mut insert_at = self.blocks.len();
        for (i, slot) in self.blocks.iter().enumerate() {
            let mut resident = slot.lock();

            if resident.sector() == sector {
                if resident.count() != count {
                    return Err(Rt11Error::InvalidArgument(
                        "block request does not match resident sector count",
                    ));
                }
                resident.add_ref();
                drop(resident);
                return Ok(Arc::clone(slot));
            }

            if sector >= resident.sector() + resident.count() {
                continue;
            }

            if sector + count <= resident.sector() {
                insert_at = i;
                break;
            }

            return Err(Rt11Error::InvalidArgument(
                "block request would overlap a resident block",
            ));
        }

        let mut block = Block::new(sector, count)?;
        block.read(self.source.as_ref())?;
        block.add_ref();
        trace!(event = "cache_insert", sector, count);

        let slot = Arc::new(Mutex::new(block));
        self.blocks.insert(insert_at, Arc::clone(&slot));
        Ok(slot)
    }

    /// Release one reference to a block. The block stays resident.
    pub fn put_block(&mut self, block: &BlockRef) {
        block.lock().release();
    }

    /// Resize a resident block.
    ///
    /// Growth must not reach the next resident block's starting sector.
    pub fn resize_block(&mut self, block: &BlockRef, new_count: u64) -> Result<()> {
        if new_count == 0 {
            return Err(Rt11Error::InvalidArgument("block resize to zero sectors"));
        }

        let index = self
            .blocks
            .iter()
            .position(|slot| Arc::ptr_eq(slot, block))
            .ok_or(Rt11Error::InvalidArgument("resize of a non-resident block"))?;

        let mut guard = block.lock();
        if let Some(next) = self.blocks.get(index + 1) {
            if guard.sector() + new_count > next.lock().sector() {
                return Err(Rt11Error::InvalidArgument(
                    "block resize would overlap a resident block",
                ));
            }
        }

        guard.resize(new_count, self.source.as_ref())
    }

    /// Write every dirty resident block to the data source.
    pub fn sync(&mut self) -> Result<()> {
        for slot in &self.blocks {
            let mut block = slot.lock();
            if block.is_dirty() {
                trace!(event = "cache_flush", sector = block.sector());
                block.write(self.source.as_mut())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDataSource;

    fn cache_over(sectors: usize) -> (MemoryDataSource, BlockCache) {
        let source = MemoryDataSource::new(sectors * SECTOR_SIZE);
        let cache = BlockCache::new(Box::new(source.clone())).unwrap();
        (source, cache)
    }

    #[test]
    fn miss_reads_and_hit_shares() {
        let (source, mut cache) = cache_over(8);
        source.with_bytes_mut(|b| b[2 * SECTOR_SIZE] = 0x5A);

        let a = cache.get_block(2, 1).unwrap();
        assert_eq!(a.lock().get_byte(0).unwrap(), 0x5A);
        assert_eq!(a.lock().refs(), 1);

        let b = cache.get_block(2, 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.lock().refs(), 2);
        assert_eq!(cache.resident_blocks(), 1);

        cache.put_block(&b);
        assert_eq!(a.lock().refs(), 1);
    }

    #[test]
    fn hit_with_wrong_count_is_refused() {
        let (_source, mut cache) = cache_over(8);
        let _a = cache.get_block(2, 2).unwrap();
        assert!(matches!(
            cache.get_block(2, 1),
            Err(Rt11Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn straddling_requests_are_refused() {
        let (_source, mut cache) = cache_over(16);
        let _mid = cache.get_block(4, 2).unwrap();

        assert!(matches!(
            cache.get_block(3, 2),
            Err(Rt11Error::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.get_block(5, 4),
            Err(Rt11Error::InvalidArgument(_))
        ));

        // adjacent on either side is fine
        cache.get_block(2, 2).unwrap();
        cache.get_block(6, 1).unwrap();
        assert_eq!(cache.resident_blocks(), 3);
    }

    #[test]
    fn blocks_stay_sorted_by_sector() {
        let (_source, mut cache) = cache_over(16);
        cache.get_block(9, 1).unwrap();
        cache.get_block(1, 1).unwrap();
        cache.get_block(5, 1).unwrap();

        let sectors: Vec<u64> = cache.blocks.iter().map(|b| b.lock().sector()).collect();
        assert_eq!(sectors, vec![1, 5, 9]);
    }

    #[test]
    fn read_failure_inserts_nothing() {
        let (_source, mut cache) = cache_over(4);
        assert!(cache.get_block(10, 1).is_err());
        assert_eq!(cache.resident_blocks(), 0);
    }

    #[test]
    fn sync_writes_only_dirty_blocks() {
        let (source, mut cache) = cache_over(8);

        let a = cache.get_block(1, 1).unwrap();
        a.lock().set_word(0, 0xBEEF).unwrap();
        cache.get_block(3, 1).unwrap();

        cache.sync().unwrap();
        assert!(!a.lock().is_dirty());

        let bytes = source.snapshot();
        assert_eq!(bytes[SECTOR_SIZE], 0xEF);
        assert_eq!(bytes[SECTOR_SIZE + 1], 0xBE);
    }

    #[test]
    fn resize_respects_neighbors() {
        let (_source, mut cache) = cache_over(16);
        let dir = cache.get_block(6, 1).unwrap();
        let _data = cache.get_block(10, 1).unwrap();

        cache.resize_block(&dir, 4).unwrap();
        assert_eq!(dir.lock().count(), 4);

        assert!(matches!(
            cache.resize_block(&dir, 5),
            Err(Rt11Error::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.resize_block(&dir, 0),
            Err(Rt11Error::InvalidArgument(_))
        ));

        let stray = Arc::new(Mutex::new(Block::new(0, 1).unwrap()));
        assert!(matches!(
            cache.resize_block(&stray, 1),
            Err(Rt11Error::InvalidArgument(_))
        ));
    }
}
