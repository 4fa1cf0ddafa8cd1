//! Deterministic in-memory engine.
//!
//! Implements the [`EngineSession`] / [`TorrentHandle`] seam without any
//! networking: the test-suite scripts piece completion through a
//! [`SimController`] and the engine answers `read_piece` with real bytes,
//! so the whole reactor/pump path can be driven end to end.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use crate::error::BtfsError;
use crate::session::{
    Alert, EngineSession, FileEntry, PieceRegion, Priority, TorrentHandle, TorrentSource,
};

/// Description of a simulated torrent.
///
/// File contents are the byte pattern `offset % 256` over the torrent's
/// concatenated payload, so any subrange is self-describing.
#[derive(Debug, Clone)]
pub struct SimTorrent {
    piece_len: usize,
    files: Vec<FileEntry>,
    content: Vec<u8>,
    deferred: bool,
}

impl SimTorrent {
    pub fn new(piece_len: usize) -> Self {
        assert!(piece_len > 0, "piece length must be positive");
        Self {
            piece_len,
            files: Vec::new(),
            content: Vec::new(),
            deferred: false,
        }
    }

    /// Append a file of `size` bytes at the given torrent-relative path.
    pub fn file(mut self, path: &str, size: u64) -> Self {
        let index = self.files.len() as u32;
        self.files.push(FileEntry {
            index,
            path: path.to_string(),
            size,
        });
        let start = self.content.len();
        self.content
            .extend((start..start + size as usize).map(|i| (i % 256) as u8));
        self
    }

    /// Simulate a magnet add: metadata only arrives once the controller
    /// calls [`SimController::deliver_metadata`].
    pub fn deferred_metadata(mut self) -> Self {
        self.deferred = true;
        self
    }

    fn num_pieces(&self) -> u32 {
        self.content.len().div_ceil(self.piece_len) as u32
    }
}

struct TorrentState {
    piece_len: usize,
    files: Vec<FileEntry>,
    content: Vec<u8>,
    have: Vec<bool>,
    piece_priorities: Vec<Priority>,
    file_priorities: HashMap<u32, Priority>,
}

impl TorrentState {
    fn new(spec: SimTorrent) -> Self {
        let pieces = spec.num_pieces() as usize;
        Self {
            piece_len: spec.piece_len,
            files: spec.files,
            content: spec.content,
            have: vec![false; pieces],
            piece_priorities: vec![Priority::None; pieces],
            file_priorities: HashMap::new(),
        }
    }

    fn piece_size(&self, piece: u32) -> usize {
        let start = piece as usize * self.piece_len;
        self.content.len().saturating_sub(start).min(self.piece_len)
    }

    fn piece_bytes(&self, piece: u32) -> Bytes {
        let start = piece as usize * self.piece_len;
        let end = start + self.piece_size(piece);
        Bytes::copy_from_slice(&self.content[start..end])
    }

    /// Torrent-global offset where a file's payload begins.
    fn file_start(&self, file: u32) -> Option<u64> {
        let mut start = 0u64;
        for entry in &self.files {
            if entry.index == file {
                return Some(start);
            }
            start += entry.size;
        }
        None
    }
}

struct SimState {
    torrent: Option<TorrentState>,
    pending: Option<SimTorrent>,
    alerts: VecDeque<Alert>,
}

struct Shared {
    state: Mutex<SimState>,
    posted: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn post(&self, mut state: MutexGuard<'_, SimState>, alert: Alert) {
        state.alerts.push_back(alert);
        drop(state);
        self.posted.notify_all();
    }
}

/// The session half handed to the alert pump.
pub struct SimSession {
    shared: Arc<Shared>,
}

/// The scripting half kept by the test.
#[derive(Clone)]
pub struct SimController {
    shared: Arc<Shared>,
}

struct SimHandle {
    shared: Arc<Shared>,
}

impl SimSession {
    pub fn new(torrent: SimTorrent) -> (Self, SimController) {
        let (ready, pending) = if torrent.deferred {
            (None, Some(torrent))
        } else {
            (Some(TorrentState::new(torrent)), None)
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(SimState {
                torrent: ready,
                pending,
                alerts: VecDeque::new(),
            }),
            posted: Condvar::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            SimController { shared },
        )
    }
}

impl EngineSession for SimSession {
    fn add_torrent(&mut self, _source: &TorrentSource) -> Result<(), BtfsError> {
        let state = self.shared.lock();
        let has_metadata = state.torrent.is_some();
        let handle: Arc<dyn TorrentHandle> = Arc::new(SimHandle {
            shared: Arc::clone(&self.shared),
        });
        self.shared.post(
            state,
            Alert::TorrentAdded {
                handle,
                has_metadata,
            },
        );
        Ok(())
    }

    fn poll_alerts(&mut self, timeout: Duration) -> Vec<Alert> {
        let mut state = self.shared.lock();
        if state.alerts.is_empty() {
            let (guard, _timeout) = self
                .shared
                .posted
                .wait_timeout(state, timeout)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
        state.alerts.drain(..).collect()
    }
}

impl SimController {
    /// A handle over the simulated torrent, equivalent to the one carried
    /// by the add/metadata alerts.
    pub fn handle(&self) -> Arc<dyn TorrentHandle> {
        Arc::new(SimHandle {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Make deferred metadata available, as if fetched from the swarm.
    pub fn deliver_metadata(&self) {
        let mut state = self.shared.lock();
        if let Some(spec) = state.pending.take() {
            state.torrent = Some(TorrentState::new(spec));
            let handle: Arc<dyn TorrentHandle> = Arc::new(SimHandle {
                shared: Arc::clone(&self.shared),
            });
            self.shared.post(state, Alert::MetadataReceived { handle });
        }
    }

    /// Report one failed metadata fetch attempt.
    pub fn fail_metadata(&self) {
        let state = self.shared.lock();
        self.shared.post(state, Alert::MetadataFailed);
    }

    /// Inject an alert the core does not handle.
    pub fn post_other(&self) {
        let state = self.shared.lock();
        self.shared.post(state, Alert::Other);
    }

    /// Mark a piece as downloaded and verified; emits `PieceFinished`.
    pub fn complete_piece(&self, piece: u32) {
        let mut state = self.shared.lock();
        let Some(torrent) = state.torrent.as_mut() else {
            return;
        };
        let Some(have) = torrent.have.get_mut(piece as usize) else {
            return;
        };
        *have = true;
        self.shared.post(state, Alert::PieceFinished { piece });
    }

    pub fn complete_pieces(&self, pieces: std::ops::Range<u32>) {
        for piece in pieces {
            self.complete_piece(piece);
        }
    }

    pub fn have(&self, piece: u32) -> bool {
        self.with_torrent(|t| t.have.get(piece as usize).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn piece_priority(&self, piece: u32) -> Priority {
        self.with_torrent(|t| {
            t.piece_priorities
                .get(piece as usize)
                .copied()
                .unwrap_or(Priority::None)
        })
        .unwrap_or(Priority::None)
    }

    /// Priority explicitly set for a file, `None` if it was never touched.
    pub fn file_priority(&self, file: u32) -> Option<Priority> {
        self.with_torrent(|t| t.file_priorities.get(&file).copied())
            .unwrap_or(None)
    }

    /// The torrent's whole payload, for byte-exact assertions.
    pub fn content(&self) -> Vec<u8> {
        self.with_torrent(|t| t.content.clone()).unwrap_or_default()
    }

    fn with_torrent<R>(&self, f: impl FnOnce(&TorrentState) -> R) -> Option<R> {
        let state = self.shared.lock();
        state.torrent.as_ref().map(f)
    }
}

impl TorrentHandle for SimHandle {
    fn files(&self) -> Vec<FileEntry> {
        self.shared
            .lock()
            .torrent
            .as_ref()
            .map(|t| t.files.clone())
            .unwrap_or_default()
    }

    fn num_pieces(&self) -> u32 {
        self.shared
            .lock()
            .torrent
            .as_ref()
            .map(|t| t.have.len() as u32)
            .unwrap_or(0)
    }

    fn piece_size(&self, piece: u32) -> usize {
        self.shared
            .lock()
            .torrent
            .as_ref()
            .map(|t| t.piece_size(piece))
            .unwrap_or(0)
    }

    fn have_piece(&self, piece: u32) -> bool {
        self.shared
            .lock()
            .torrent
            .as_ref()
            .and_then(|t| t.have.get(piece as usize).copied())
            .unwrap_or(false)
    }

    fn map_file(&self, file: u32, offset: u64, size: usize) -> PieceRegion {
        let state = self.shared.lock();
        let Some(torrent) = state.torrent.as_ref() else {
            return PieceRegion {
                piece: 0,
                start: 0,
                length: 0,
            };
        };
        let Some(file_start) = torrent.file_start(file) else {
            return PieceRegion {
                piece: 0,
                start: 0,
                length: 0,
            };
        };
        let global = file_start + offset;
        PieceRegion {
            piece: (global / torrent.piece_len as u64) as u32,
            start: (global % torrent.piece_len as u64) as usize,
            length: size,
        }
    }

    fn read_piece(&self, piece: u32) {
        let state = self.shared.lock();
        let Some(torrent) = state.torrent.as_ref() else {
            return;
        };
        if !torrent.have.get(piece as usize).copied().unwrap_or(false) {
            return;
        }
        let data = torrent.piece_bytes(piece);
        self.shared.post(state, Alert::ReadPiece { piece, data });
    }

    fn set_piece_priority(&self, piece: u32, priority: Priority) {
        let mut state = self.shared.lock();
        if let Some(torrent) = state.torrent.as_mut() {
            if let Some(slot) = torrent.piece_priorities.get_mut(piece as usize) {
                *slot = priority;
            }
        }
    }

    fn set_file_priority(&self, file: u32, priority: Priority) {
        let mut state = self.shared.lock();
        if let Some(torrent) = state.torrent.as_mut() {
            torrent.file_priorities.insert(file, priority);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_follows_the_offset_pattern() {
        let spec = SimTorrent::new(16).file("a.bin", 10).file("b.bin", 10);
        let (_session, ctl) = SimSession::new(spec);
        let content = ctl.content();
        assert_eq!(content.len(), 20);
        assert_eq!(content[0], 0);
        assert_eq!(content[10], 10);
        assert_eq!(content[19], 19);
    }

    #[test]
    fn last_piece_is_short() {
        let (_session, ctl) = SimSession::new(SimTorrent::new(16).file("a.bin", 20));
        let handle = ctl.handle();
        assert_eq!(handle.num_pieces(), 2);
        assert_eq!(handle.piece_size(0), 16);
        assert_eq!(handle.piece_size(1), 4);
    }

    #[test]
    fn map_file_spans_files_in_index_order() {
        let spec = SimTorrent::new(16).file("a.bin", 10).file("b.bin", 10);
        let (_session, ctl) = SimSession::new(spec);
        let handle = ctl.handle();
        let region = handle.map_file(1, 4, 6);
        assert_eq!(region.piece, 0);
        assert_eq!(region.start, 14);
    }

    #[test]
    fn read_piece_only_answers_for_finished_pieces() {
        let (mut session, ctl) = SimSession::new(SimTorrent::new(16).file("a.bin", 16));
        let handle = ctl.handle();

        handle.read_piece(0);
        assert!(session.poll_alerts(Duration::from_millis(1)).is_empty());

        ctl.complete_piece(0);
        handle.read_piece(0);
        let alerts = session.poll_alerts(Duration::from_millis(1));
        assert_eq!(alerts.len(), 2);
        assert!(matches!(alerts[0], Alert::PieceFinished { piece: 0 }));
        match &alerts[1] {
            Alert::ReadPiece { piece, data } => {
                assert_eq!(*piece, 0);
                assert_eq!(data.as_ref(), ctl.content().as_slice());
            }
            _ => panic!("expected a read-piece alert"),
        }
    }
}
