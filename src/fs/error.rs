//! Errno taxonomy for filesystem operations.

/// Failure modes a filesystem operation can surface to the kernel.
///
/// Startup failures use [`crate::error::BtfsError`]; this type only covers
/// what maps onto an errno in a FUSE reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Unknown path or inode (`ENOENT`).
    NotFound,
    /// Directory operation on a file (`ENOTDIR`).
    NotADirectory,
    /// File operation on a directory (`EISDIR`).
    IsADirectory,
    /// Anything but read-only access (`EACCES`).
    AccessDenied,
    /// The mount is shutting down and cannot complete the call (`EIO`).
    Interrupted,
}

impl FsError {
    pub fn errno(self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::AccessDenied => libc::EACCES,
            FsError::Interrupted => libc::EIO,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FsError::NotFound => "ENOENT",
            FsError::NotADirectory => "ENOTDIR",
            FsError::IsADirectory => "EISDIR",
            FsError::AccessDenied => "EACCES",
            FsError::Interrupted => "EIO",
        }
    }
}
