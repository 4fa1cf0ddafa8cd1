use std::path::PathBuf;

use thiserror::Error;

/// Startup and engine errors.
///
/// Everything here is fatal at setup time and surfaces on stderr with a
/// nonzero exit; filesystem-operation failures use errno codes instead (see
/// [`crate::fs::error`]).
#[derive(Error, Debug)]
pub enum BtfsError {
    /// The metadata argument is a URL scheme we refuse to fetch.
    #[error("unsupported metadata scheme in {0:?} (expected a .torrent file or a magnet link)")]
    UnsupportedScheme(String),

    /// The metadata argument is neither a magnet link nor a readable file.
    #[error("metadata file not found: {0}")]
    MetadataNotFound(PathBuf),

    /// The engine rejected the metainfo or magnet link.
    #[error("invalid torrent metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid listen port range {min}-{max}")]
    PortRange { min: u16, max: u16 },

    #[error("failed to prepare save path under {path}")]
    SavePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mount point {0} is not a directory")]
    BadMountPoint(PathBuf),

    /// Anything the engine backend reports after setup started.
    #[error("engine error: {0}")]
    Engine(String),

    #[error("this build has no BitTorrent engine; rebuild with `--features libtorrent`")]
    EngineUnavailable,
}
