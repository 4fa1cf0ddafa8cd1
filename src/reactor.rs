//! The meeting point of FUSE worker threads, the alert thread, and the
//! swarm scheduler.
//!
//! One mutex guards everything the threads share: the directory index, the
//! torrent handle, the set of in-flight reads, and the window cursor. One
//! condition variable signals "some piece was delivered"; blocked readers
//! re-test their own completion on every wake. The lock is coarse on
//! purpose: the critical sections are short memcpys and priority updates,
//! dwarfed by network latency.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::{debug, info, trace};

use crate::fs::error::FsError;
use crate::index::DirIndex;
use crate::read::ReadRequest;
use crate::session::{Priority, TorrentHandle};
use crate::window::Window;

struct State {
    /// Snapshotted from the engine once metadata is known.
    torrent: Option<Arc<dyn TorrentHandle>>,
    index: Option<DirIndex>,
    /// In-flight reads, keyed by registration id.
    reads: HashMap<u64, ReadRequest>,
    next_read: u64,
    window: Window,
    shutdown: bool,
}

pub struct Reactor {
    state: Mutex<State>,
    /// Signalled on every piece delivery, on setup completion, and on
    /// shutdown. Waiters re-test their predicate; spurious wakes are fine.
    delivered: Condvar,
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                torrent: None,
                index: None,
                reads: HashMap::new(),
                next_read: 0,
                window: Window::new(),
                shutdown: false,
            }),
            delivered: Condvar::new(),
        }
    }

    /// Adopt the torrent handle once metadata is available: build the
    /// directory index, zero every file priority so nothing downloads
    /// until it is read, and wake any operation waiting for setup.
    pub fn attach(&self, handle: Arc<dyn TorrentHandle>) {
        let mut state = self.lock();
        if state.index.is_some() {
            return;
        }

        let files = handle.files();
        for file in &files {
            handle.set_file_priority(file.index, Priority::None);
        }
        let index = DirIndex::build(&files);
        info!(
            files = files.len(),
            nodes = index.len(),
            pieces = handle.num_pieces(),
            "torrent metadata ready"
        );
        state.index = Some(index);
        state.torrent = Some(handle);
        self.delivered.notify_all();
    }

    /// Handler for a delivered piece payload: copy it into every read that
    /// wants it, then wake all waiters (several reads may depend on the
    /// same piece, so a single signal would not do).
    pub fn on_read_piece(&self, piece: u32, data: &[u8]) {
        let mut state = self.lock();
        trace!(piece, len = data.len(), "piece delivered");
        for read in state.reads.values_mut() {
            read.copy(piece, data);
        }
        self.delivered.notify_all();
    }

    /// Handler for a freshly completed piece: let every read request the
    /// payloads it now can, and slide the window forward. No wake here;
    /// the payload arrives with a later delivery.
    pub fn on_piece_finished(&self, piece: u32) {
        let mut state = self.lock();
        trace!(piece, "piece finished");
        let Some(torrent) = state.torrent.clone() else {
            return;
        };
        for read in state.reads.values() {
            read.trigger(&*torrent);
        }
        state.window.advance(&*torrent);
    }

    /// Invalidate every pending operation. Blocked reads and setup waits
    /// return [`FsError::Interrupted`]; the alert thread can then be
    /// joined without abandoning anyone mid-wait.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        debug!(pending_reads = state.reads.len(), "reactor shutdown");
        self.delivered.notify_all();
    }

    /// Run `f` against the directory index, blocking until metadata has
    /// arrived.
    pub fn with_index<R>(&self, f: impl FnOnce(&DirIndex) -> R) -> Result<R, FsError> {
        let state = self.wait_ready()?;
        Ok(f(state.index.as_ref().expect("index present after wait")))
    }

    /// Piece index at the head of the download window.
    pub fn cursor(&self) -> u32 {
        self.lock().window.cursor()
    }

    /// Serve one VFS read: decompose it into piece parts, register it,
    /// request whatever is already present, aim the window at its first
    /// piece, and sleep until every part has been filled.
    pub fn read(&self, file: u32, offset: u64, size: usize) -> Result<Vec<u8>, FsError> {
        let mut state = self.wait_ready()?;
        let torrent = state
            .torrent
            .clone()
            .expect("torrent present after wait");
        let file_size = state
            .index
            .as_ref()
            .and_then(|index| index.file_size(file))
            .ok_or(FsError::NotFound)?;

        let request = ReadRequest::new(&*torrent, file, offset, size, file_size);
        if request.is_empty() {
            return Ok(Vec::new());
        }
        let first_piece = request.first_piece().expect("non-empty read has parts");
        let total = request.len();

        let id = state.next_read;
        state.next_read += 1;
        state.reads.insert(id, request);
        if let Some(request) = state.reads.get(&id) {
            request.trigger(&*torrent);
        }
        state.window.jump(&*torrent, first_piece, total);

        loop {
            let done = state
                .reads
                .get(&id)
                .map(ReadRequest::finished)
                .unwrap_or(true);
            if done {
                break;
            }
            if state.shutdown {
                state.reads.remove(&id);
                return Err(FsError::Interrupted);
            }
            state = self.wait(state);
        }

        let request = state.reads.remove(&id).ok_or(FsError::Interrupted)?;
        Ok(request.into_bytes())
    }

    /// Block until setup has completed (or shutdown intervened).
    fn wait_ready(&self) -> Result<MutexGuard<'_, State>, FsError> {
        let mut state = self.lock();
        while state.index.is_none() {
            if state.shutdown {
                return Err(FsError::Interrupted);
            }
            state = self.wait(state);
        }
        if state.shutdown {
            return Err(FsError::Interrupted);
        }
        Ok(state)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.delivered
            .wait(guard)
            .unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::sim::{SimSession, SimTorrent};

    const PIECE: usize = 16 * 1024;

    fn ready_reactor(file_size: u64) -> (Arc<Reactor>, crate::session::sim::SimController) {
        let (_session, ctl) = SimSession::new(SimTorrent::new(PIECE).file("f.bin", file_size));
        let reactor = Arc::new(Reactor::new());
        reactor.attach(ctl.handle());
        (reactor, ctl)
    }

    #[test]
    fn zero_length_read_returns_without_waiting() {
        let (reactor, _ctl) = ready_reactor(1000);
        assert_eq!(reactor.read(0, 1000, 4096).unwrap(), Vec::<u8>::new());
        assert_eq!(reactor.read(0, 0, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn attach_zeroes_file_priorities() {
        let (_reactor, ctl) = ready_reactor(1000);
        assert_eq!(ctl.file_priority(0), Some(Priority::None));
    }

    #[test]
    fn read_completes_when_pieces_arrive() {
        let (reactor, ctl) = ready_reactor(32 * 1024);
        let content = ctl.content();

        let worker = {
            let reactor = Arc::clone(&reactor);
            std::thread::spawn(move || reactor.read(0, 0, 32 * 1024))
        };
        // Give the reader a moment to register and block.
        std::thread::sleep(std::time::Duration::from_millis(50));

        // Feed the handlers the way the alert thread would.
        reactor.on_piece_finished(0);
        reactor.on_read_piece(0, &content[..PIECE]);
        reactor.on_piece_finished(1);
        reactor.on_read_piece(1, &content[PIECE..]);

        let bytes = worker.join().unwrap().unwrap();
        assert_eq!(bytes, content);
    }

    #[test]
    fn shutdown_invalidates_blocked_reads() {
        let (reactor, _ctl) = ready_reactor(32 * 1024);
        let worker = {
            let reactor = Arc::clone(&reactor);
            std::thread::spawn(move || reactor.read(0, 0, 1024))
        };
        // Give the reader a moment to register and block.
        std::thread::sleep(std::time::Duration::from_millis(50));
        reactor.shutdown();
        assert_eq!(worker.join().unwrap(), Err(FsError::Interrupted));
    }

    #[test]
    fn ops_block_until_metadata_then_complete() {
        let (_session, ctl) = SimSession::new(SimTorrent::new(PIECE).file("a/b.bin", 100));
        let reactor = Arc::new(Reactor::new());

        let worker = {
            let reactor = Arc::clone(&reactor);
            std::thread::spawn(move || reactor.with_index(|ix| ix.readdir("/").unwrap()))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        reactor.attach(ctl.handle());
        assert_eq!(worker.join().unwrap().unwrap(), vec![".", "..", "a"]);
    }
}
