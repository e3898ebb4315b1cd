#![forbid(unsafe_code)]
//! RT-11 directory engine.
//!
//! The directory is a linked list of 1 KiB segments, each a run of
//! variable-length entries terminated by an end marker. Files occupy
//! contiguous sectors, so growing a file can mean physically relocating it;
//! every mutating operation therefore reports a move log that the open-file
//! layer uses to keep its cursors valid.

mod directory;
mod dirptr;
mod ent;
mod tracker;

pub use directory::Directory;
pub use dirptr::DirPtr;
pub use ent::{DirEnt, VolumeStats};
pub use tracker::{DirChangeTracker, EntryMove, EntryPos};
