#![forbid(unsafe_code)]
//! Error types for rt11fs.
//!
//! Defines `Rt11Error` and a `Result<T>` alias used throughout the
//! workspace, plus the errno mapping the adapter layer replies with.

use thiserror::Error;

/// Unified error type for all rt11fs operations.
#[derive(Debug, Error)]
pub enum Rt11Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt directory structure: {0}")]
    Corrupt(String),

    #[error("block range violation: {0}")]
    Bounds(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("not a valid RT-11 filename")]
    InvalidName,

    #[error("invalid path")]
    InvalidPath,

    #[error("no such file")]
    NotFound,

    #[error("no space left on volume")]
    NoSpace,

    #[error("file exists")]
    Exists,

    #[error("bad file handle")]
    BadFileHandle,

    #[error("volume is read-only")]
    ReadOnlyVolume,
}

impl Rt11Error {
    /// Convert this error into a POSIX errno suitable for adapter replies.
    ///
    /// The value is positive; adapters that speak the negated-errno calling
    /// convention negate it themselves.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::Bounds(_) => libc::EIO,
            Self::Corrupt(_) | Self::InvalidArgument(_) | Self::InvalidName | Self::InvalidPath => {
                libc::EINVAL
            }
            Self::NotFound => libc::ENOENT,
            Self::NoSpace => libc::ENOSPC,
            Self::Exists => libc::EEXIST,
            Self::BadFileHandle => libc::EBADF,
            Self::ReadOnlyVolume => libc::EACCES,
        }
    }
}

/// Result alias using `Rt11Error`.
pub type Result<T> = std::result::Result<T, Rt11Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_matches_the_error_taxonomy() {
        assert_eq!(Rt11Error::NotFound.to_errno(), libc::ENOENT);
        assert_eq!(Rt11Error::NoSpace.to_errno(), libc::ENOSPC);
        assert_eq!(Rt11Error::InvalidName.to_errno(), libc::EINVAL);
        assert_eq!(Rt11Error::Bounds(String::new()).to_errno(), libc::EIO);
        assert_eq!(Rt11Error::BadFileHandle.to_errno(), libc::EBADF);
        assert_eq!(Rt11Error::Exists.to_errno(), libc::EEXIST);
    }

    #[test]
    fn io_errors_preserve_their_os_errno() {
        let err = Rt11Error::Io(std::io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(err.to_errno(), libc::ENOSPC);
    }
}
