//! Positional-I/O data sources backing a mounted volume.

use parking_lot::Mutex;
use rt11_error::{Result, Rt11Error};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

/// Byte-addressed storage with pread/pwrite semantics.
///
/// Transfers are all-or-nothing: an implementation must fail any request it
/// cannot satisfy in full. Partial transfers are never reported.
pub trait DataSource {
    /// Total length of the image in bytes.
    fn len_bytes(&self) -> Result<u64>;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` to `offset`.
    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;
}

fn check_range(len: u64, offset: u64, count: usize, what: &str) -> Result<()> {
    let count = u64::try_from(count)
        .map_err(|_| Rt11Error::Bounds(format!("{what} length overflows u64")))?;
    let end = offset
        .checked_add(count)
        .ok_or_else(|| Rt11Error::Bounds(format!("{what} range overflows u64")))?;
    if end > len {
        return Err(Rt11Error::Bounds(format!(
            "{what} out of bounds: offset={offset} len={count} image_len={len}"
        )));
    }
    Ok(())
}

/// File-backed data source using positional I/O.
///
/// Uses `std::os::unix::fs::FileExt`, so no shared seek position is
/// involved. The image length is fixed at open time; requests past the end
/// fail rather than growing the file.
#[derive(Debug)]
pub struct FileDataSource {
    file: File,
    len: u64,
    writable: bool,
}

impl FileDataSource {
    /// Open an image read-write, falling back to read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut writable = true;
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(_) => {
                writable = false;
                OpenOptions::new().read(true).open(path)?
            }
        };

        Ok(Self {
            len: file.metadata()?.len(),
            file,
            writable,
        })
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }
}

impl DataSource for FileDataSource {
    fn len_bytes(&self) -> Result<u64> {
        Ok(self.len)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(self.len, offset, buf.len(), "read")?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Rt11Error::ReadOnlyVolume);
        }
        check_range(self.len, offset, buf.len(), "write")?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }
}

/// In-memory data source over a shared byte buffer.
///
/// Clones share the same storage, so a test can hold one handle for raw
/// inspection while the block cache owns another.
#[derive(Debug, Clone)]
pub struct MemoryDataSource {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryDataSource {
    /// A zero-filled image of `len` bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0_u8; len])),
        }
    }

    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes)),
        }
    }

    /// Snapshot of the full image contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// Run `f` with mutable access to the raw image bytes.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        f(&mut self.bytes.lock())
    }
}

impl DataSource for MemoryDataSource {
    fn len_bytes(&self) -> Result<u64> {
        Ok(self.bytes.lock().len() as u64)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.lock();
        check_range(bytes.len() as u64, offset, buf.len(), "read")?;
        let start = offset as usize;
        buf.copy_from_slice(&bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock();
        check_range(bytes.len() as u64, offset, buf.len(), "write")?;
        let start = offset as usize;
        bytes[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn memory_source_round_trips() {
        let mut src = MemoryDataSource::new(1024);
        src.write_all_at(512, b"hello").unwrap();

        let mut buf = [0_u8; 5];
        src.read_exact_at(512, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn memory_source_rejects_partial_transfers() {
        let mut src = MemoryDataSource::new(16);
        let mut buf = [0_u8; 8];
        assert!(matches!(
            src.read_exact_at(12, &mut buf),
            Err(Rt11Error::Bounds(_))
        ));
        assert!(matches!(
            src.write_all_at(12, &buf),
            Err(Rt11Error::Bounds(_))
        ));
    }

    #[test]
    fn clones_share_storage() {
        let src = MemoryDataSource::new(64);
        let mut other = src.clone();
        other.write_all_at(0, &[0xAA]).unwrap();
        assert_eq!(src.snapshot()[0], 0xAA);
    }

    #[test]
    fn file_source_reads_and_writes_in_place() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0_u8; 2048]).unwrap();
        tmp.flush().unwrap();

        let mut src = FileDataSource::open(tmp.path()).unwrap();
        assert!(src.writable());
        assert_eq!(src.len_bytes().unwrap(), 2048);

        src.write_all_at(1000, b"abc").unwrap();
        let mut buf = [0_u8; 3];
        src.read_exact_at(1000, &mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn file_source_does_not_grow_the_image() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0_u8; 512]).unwrap();
        tmp.flush().unwrap();

        let mut src = FileDataSource::open(tmp.path()).unwrap();
        assert!(matches!(
            src.write_all_at(510, &[1, 2, 3]),
            Err(Rt11Error::Bounds(_))
        ));
    }
}
