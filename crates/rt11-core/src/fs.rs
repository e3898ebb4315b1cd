//! The filesystem aggregate and its client-facing surface.
//!
//! Everything hangs off [`FileSystem`]: the data source (inside the block
//! cache), the directory engine, and the open-file table. The surface
//! mirrors what a filesystem adapter needs — path-denoted calls returning
//! `Result`, which the adapter maps to negated errno values via
//! [`Rt11Error::to_errno`].

use crate::oft::{Fd, OpenFileTable};
use chrono::NaiveDate;
use rt11_block::{BlockCache, DataSource, FileDataSource};
use rt11_dir::{DirEnt, Directory, VolumeStats};
use rt11_error::{Result, Rt11Error};
use rt11_types::status;
use serde::Serialize;
use std::path::Path;

/// What a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    /// The single flat directory at `/`.
    Directory,
    /// A regular file.
    File,
}

/// Attributes of a path, getattr-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttr {
    pub kind: FileKind,
    /// Size in bytes. Zero for the directory.
    pub size: u64,
    /// Set when the on-disk entry carries the read-only bit.
    pub read_only: bool,
    /// Set when the on-disk entry carries the protected bit.
    pub protected: bool,
    pub created: Option<NaiveDate>,
}

/// A mounted RT-11 volume.
pub struct FileSystem {
    cache: BlockCache,
    directory: Directory,
    files: OpenFileTable,
    writable: bool,
}

impl FileSystem {
    /// Mount a disk image from a file, read-write when permitted.
    pub fn open_image(path: impl AsRef<Path>) -> Result<Self> {
        let source = FileDataSource::open(path)?;
        let writable = source.writable();
        Self::with_source(Box::new(source), writable)
    }

    /// Mount over any data source.
    pub fn with_source(source: Box<dyn DataSource>, writable: bool) -> Result<Self> {
        let mut cache = BlockCache::new(source)?;
        let directory = Directory::new(&mut cache)?;
        Ok(Self {
            cache,
            directory,
            files: OpenFileTable::new(),
            writable,
        })
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Direct access to the directory engine, mainly for listings.
    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Rt11Error::ReadOnlyVolume)
        }
    }

    /// Attributes for a path; `/` is the directory itself.
    pub fn getattr(&self, path: &str) -> Result<FileAttr> {
        if path == "/" {
            return Ok(FileAttr {
                kind: FileKind::Directory,
                size: 0,
                read_only: !self.writable,
                protected: false,
                created: None,
            });
        }

        let name = validate_path(path)?;
        let ent = self.directory.get_ent(name)?;
        Ok(FileAttr {
            kind: FileKind::File,
            size: ent.length,
            read_only: ent.status & status::READ_ONLY != 0,
            protected: ent.status & status::PROTECTED != 0,
            created: ent.created,
        })
    }

    /// Volume usage counters. Only `/` has them.
    pub fn statfs(&self, path: &str) -> Result<VolumeStats> {
        if path != "/" {
            return Err(Rt11Error::NotFound);
        }
        self.directory.statfs()
    }

    /// All permanent files, in directory order.
    pub fn read_dir(&self) -> Result<Vec<DirEnt>> {
        let mut entries = Vec::new();
        let mut scan = self.directory.start_scan()?;
        while self.directory.move_next_filtered(&mut scan, status::PERMANENT)? {
            if let Some(ent) = self.directory.get_ent_at(&scan)? {
                entries.push(ent);
            }
        }
        Ok(entries)
    }

    pub fn open(&mut self, path: &str) -> Result<Fd> {
        let name = validate_path(path)?;
        self.files.open(&self.directory, name)
    }

    pub fn create(&mut self, path: &str) -> Result<Fd> {
        self.check_writable()?;
        let name = validate_path(path)?;
        self.files.create(&mut self.directory, &mut self.cache, name)
    }

    pub fn release(&mut self, fd: Fd) -> Result<()> {
        self.files.close(&mut self.directory, &mut self.cache, fd)
    }

    pub fn read(&mut self, fd: Fd, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.files.read(&mut self.cache, fd, buf, offset)
    }

    pub fn write(&mut self, fd: Fd, buf: &[u8], offset: u64) -> Result<usize> {
        self.check_writable()?;
        self.files
            .write(&mut self.directory, &mut self.cache, fd, buf, offset)
    }

    pub fn ftruncate(&mut self, fd: Fd, new_size: u64) -> Result<()> {
        self.check_writable()?;
        self.files
            .truncate(&mut self.directory, &mut self.cache, fd, new_size)
    }

    /// Flush all dirty cached blocks to the image.
    pub fn fsync(&mut self) -> Result<()> {
        self.cache.sync()
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        self.check_writable()?;
        let name = validate_path(path)?;
        self.files.unlink(&mut self.directory, name)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.check_writable()?;
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        self.directory.rename(&mut self.cache, from, to)
    }

    /// Accepted for adapter compatibility; RT-11 has no permission bits to
    /// persist beyond the read-only flag, which this does not touch.
    pub fn chmod(&mut self, path: &str, _mode: u32) -> Result<()> {
        validate_path(path)?;
        Ok(())
    }
}

/// A path names a file when it is exactly `/NAME` — one leading slash and
/// no others. `/` itself is the directory and never a file.
fn validate_path(path: &str) -> Result<&str> {
    let Some(name) = path.strip_prefix('/') else {
        return Err(Rt11Error::InvalidPath);
    };
    if name.is_empty() || name.contains('/') {
        return Err(Rt11Error::NotFound);
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_name_exactly_one_component() {
        assert!(matches!(validate_path("SWAP.SYS"), Err(Rt11Error::InvalidPath)));
        assert!(matches!(validate_path(""), Err(Rt11Error::InvalidPath)));
        assert!(matches!(validate_path("/"), Err(Rt11Error::NotFound)));
        assert!(matches!(validate_path("/A/B"), Err(Rt11Error::NotFound)));
        assert_eq!(validate_path("/SWAP.SYS").unwrap(), "SWAP.SYS");
    }
}
