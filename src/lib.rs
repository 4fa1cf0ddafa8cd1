//! # btfs
//!
//! A read-only FUSE filesystem over a single BitTorrent swarm: name a
//! torrent (metainfo file or magnet link) and a mount point, and the
//! torrent's files appear as regular files whose byte ranges are fetched
//! from peers only when actually read.
//!
//! There is no "download then open" step. A `read(2)` blocks until the
//! pieces backing the requested range arrive, and piece priorities are
//! continuously re-aimed at the most recently read byte range, so linear
//! playback streams with a small download window and a seek simply moves
//! the window.
//!
//! ## Architecture
//!
//! ```text
//! FUSE worker threads                alert thread
//!   lookup/getattr/readdir/open        EngineSession::poll_alerts
//!   read ──► Reactor ◄──────────────── piece finished / piece payload
//!              │  one mutex, one condvar, active reads, window cursor
//!              ▼
//!        DirIndex (built once from metadata)
//!              ▼
//!        TorrentHandle (piece ops: have/map/read/prioritize)
//! ```
//!
//! The read path is the heart of the crate: [`reactor::Reactor`] turns VFS
//! `(file, offset, length)` requests into piece-level fetches
//! ([`read::ReadRequest`]), steers a sliding priority window ahead of the
//! reader ([`window::Window`]), and gates the calling thread on a condition
//! variable until the engine has delivered every byte.
//!
//! ## Modules
//!
//! - [`config`] - CLI arguments, metadata-source parsing, save-path staging
//! - [`index`] - directory tree over the torrent's file list
//! - [`read`] - decomposition of one VFS read into piece parts
//! - [`reactor`] - the mutex/condvar core gating reads on piece arrival
//! - [`window`] - sliding-window piece prioritization
//! - [`session`] - the engine seam: traits, alerts, the pump thread
//! - [`fs`] - the fuser op table
//!
//! ## Blocking behavior
//!
//! Filesystem operations block until torrent metadata is known (relevant
//! for magnet links), and reads block until their pieces arrive. There are
//! no per-read timeouts: a swarm that cannot make progress looks exactly
//! like a slow one, and the only cancellation is unmounting.

pub mod config;
pub mod error;
#[cfg(feature = "libtorrent")]
mod ffi;
pub mod fs;
pub mod index;
pub mod mount;
pub mod reactor;
pub mod read;
pub mod session;
pub mod window;

pub use config::{CliArgs, Config};
pub use error::BtfsError;
pub use fs::BtfsFs;
pub use reactor::Reactor;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Mount the configured torrent and serve until unmounted.
///
/// Blocks for the lifetime of the mount. On a clean unmount the staged
/// piece data is removed unless the configuration says to keep it.
pub fn run(config: Config) -> Result<()> {
    info!(source = ?config.source, mountpoint = %config.mount_point.display(), "btfs starting");

    mount::validate_mount_point(&config.mount_point)?;
    let save_path = config::prepare_save_path().context("failed to prepare save path")?;

    let reactor = Arc::new(Reactor::new());
    let fs = BtfsFs::new(
        Arc::clone(&reactor),
        config.session_options(save_path.clone()),
        config.source.clone(),
    );

    let result = fs.mount(&config.mount_point);

    if !config.keep_data {
        if let Err(e) = std::fs::remove_dir_all(&save_path) {
            warn!(save_path = %save_path.display(), error = %e, "failed to remove staged data");
        }
    }

    result
}
