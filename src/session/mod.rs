//! The seam between the filesystem core and the BitTorrent engine.
//!
//! The core never talks to a concrete engine. It consumes two traits: an
//! [`EngineSession`] that torrents are added to and alerts drained from, and
//! a [`TorrentHandle`] for per-torrent piece operations. The native backend
//! (feature `libtorrent`) binds libtorrent-rasterbar; [`sim`] is a
//! deterministic in-memory engine driven by the test-suite.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::BtfsError;
use crate::reactor::Reactor;

#[cfg(feature = "libtorrent")]
mod native;
pub mod sim;

/// How long one `poll_alerts` call may block before the pump re-checks its
/// stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One file inside the torrent, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Stable index used to address the file in the engine.
    pub index: u32,
    /// Path relative to the torrent root, `/`-separated.
    pub path: String,
    pub size: u64,
}

/// A byte range inside one piece, produced by [`TorrentHandle::map_file`].
///
/// `length` is not clamped to the piece end; callers split requests at piece
/// boundaries themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceRegion {
    pub piece: u32,
    pub start: usize,
    pub length: usize,
}

/// Piece and file priorities on the engine's 0..7 scale, where 0 disables
/// fetching entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    None = 0,
    Low = 1,
    High = 7,
}

impl Priority {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Where the torrent metadata comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    /// A `magnet:` URI; metadata is fetched from the swarm.
    Magnet(String),
    /// A local `.torrent` file.
    Metainfo(PathBuf),
}

/// Engine configuration applied at session creation.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory pieces are staged under.
    pub save_path: PathBuf,
    pub min_port: u16,
    pub max_port: u16,
    /// Bytes per second; `0` means unlimited.
    pub download_rate_limit: i64,
    pub upload_rate_limit: i64,
}

/// Asynchronous events drained from the engine.
///
/// One variant per event the core reacts to, plus a catch-all; everything
/// the engine emits beyond these (tracker errors, peer churn, hash
/// failures) is deliberately ignored and left to the swarm layer to retry.
pub enum Alert {
    TorrentAdded {
        handle: Arc<dyn TorrentHandle>,
        has_metadata: bool,
    },
    MetadataReceived {
        handle: Arc<dyn TorrentHandle>,
    },
    MetadataFailed,
    PieceFinished {
        piece: u32,
    },
    /// Payload of one whole piece, previously requested via
    /// [`TorrentHandle::read_piece`].
    ReadPiece {
        piece: u32,
        data: Bytes,
    },
    Other,
}

/// Per-torrent operations. Handles are cheap to clone behind an `Arc` and
/// safe to call from any thread.
pub trait TorrentHandle: Send + Sync {
    fn files(&self) -> Vec<FileEntry>;
    fn num_pieces(&self) -> u32;
    /// Size in bytes of the given piece (the last piece may be short).
    fn piece_size(&self, piece: u32) -> usize;
    fn have_piece(&self, piece: u32) -> bool;
    /// Map a byte range of a file onto the piece space. The returned region
    /// may extend past the end of its piece.
    fn map_file(&self, file: u32, offset: u64, size: usize) -> PieceRegion;
    /// Ask the engine to deliver the payload of a finished piece via an
    /// [`Alert::ReadPiece`].
    fn read_piece(&self, piece: u32);
    fn set_piece_priority(&self, piece: u32, priority: Priority);
    fn set_file_priority(&self, file: u32, priority: Priority);
}

/// A running engine session owning the swarm side of the mount.
pub trait EngineSession: Send {
    /// Enqueue the torrent asynchronously; completion is signalled by
    /// [`Alert::TorrentAdded`] / [`Alert::MetadataReceived`].
    fn add_torrent(&mut self, source: &TorrentSource) -> Result<(), BtfsError>;

    /// Block up to `timeout` for at least one alert, then drain everything
    /// pending. An empty vec means the timeout elapsed.
    fn poll_alerts(&mut self, timeout: Duration) -> Vec<Alert>;
}

/// Create the engine session for this build.
#[cfg(feature = "libtorrent")]
pub fn create_session(options: &SessionOptions) -> Result<Box<dyn EngineSession>, BtfsError> {
    native::create_session(options)
}

/// Create the engine session for this build.
#[cfg(not(feature = "libtorrent"))]
pub fn create_session(_options: &SessionOptions) -> Result<Box<dyn EngineSession>, BtfsError> {
    Err(BtfsError::EngineUnavailable)
}

/// The alert thread: drains [`EngineSession::poll_alerts`] and dispatches
/// into the [`Reactor`] until told to stop.
pub struct AlertPump {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AlertPump {
    /// Spawn the pump thread. The session moves onto the thread and never
    /// comes back: on shutdown it is deliberately leaked rather than
    /// destructed, skipping slow tracker goodbyes.
    pub fn spawn(
        mut session: Box<dyn EngineSession>,
        reactor: Arc<Reactor>,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("btfs-alerts".into())
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    for alert in session.poll_alerts(POLL_INTERVAL) {
                        dispatch(&reactor, alert);
                    }
                }
                debug!("alert pump stopping");
                // Skip the engine's teardown path entirely; the OS reclaims
                // sockets at process exit.
                std::mem::forget(session);
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stop and join the pump thread.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("alert pump panicked");
            }
        }
    }
}

impl Drop for AlertPump {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn dispatch(reactor: &Reactor, alert: Alert) {
    match alert {
        Alert::ReadPiece { piece, data } => reactor.on_read_piece(piece, &data),
        Alert::PieceFinished { piece } => reactor.on_piece_finished(piece),
        Alert::TorrentAdded {
            handle,
            has_metadata,
        } => {
            if has_metadata {
                reactor.attach(handle);
            } else {
                info!("torrent added, waiting for metadata");
            }
        }
        Alert::MetadataReceived { handle } => reactor.attach(handle),
        Alert::MetadataFailed => debug!("metadata fetch attempt failed, engine will retry"),
        Alert::Other => {}
    }
}
