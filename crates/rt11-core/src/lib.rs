#![forbid(unsafe_code)]
//! RT-11 filesystem core.
//!
//! Ties the block cache, directory engine and open-file table together
//! behind the path-denoted surface an adapter calls into.

mod fs;
mod oft;

pub use fs::{FileAttr, FileKind, FileSystem};
pub use oft::{Fd, OpenFileTable};
