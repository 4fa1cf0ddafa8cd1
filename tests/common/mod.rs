//! Shared helpers for the integration suites.
//!
//! Every suite drives the real reactor and alert pump against the
//! deterministic sim engine; no networking is involved.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use btfs::reactor::Reactor;
use btfs::session::sim::{SimController, SimSession, SimTorrent};
use btfs::session::{AlertPump, EngineSession, TorrentSource};

/// Spin up the full pipeline: sim session -> alert pump -> reactor.
///
/// The torrent is already enqueued; keep the returned pump alive for the
/// duration of the test or alerts stop flowing.
pub fn spawn_mount(spec: SimTorrent) -> (Arc<Reactor>, SimController, AlertPump) {
    let (mut session, controller) = SimSession::new(spec);
    session
        .add_torrent(&TorrentSource::Magnet(
            "magnet:?xt=urn:btih:0000000000000000000000000000000000000000".to_string(),
        ))
        .expect("sim add_torrent cannot fail");

    let reactor = Arc::new(Reactor::new());
    let pump = AlertPump::spawn(Box::new(session), Arc::clone(&reactor))
        .expect("failed to spawn alert pump");
    (reactor, controller, pump)
}

/// Run a read on its own thread, the way a FUSE worker would.
pub fn read_in_thread(
    reactor: &Arc<Reactor>,
    file: u32,
    offset: u64,
    size: usize,
) -> std::thread::JoinHandle<Result<Vec<u8>, btfs::fs::error::FsError>> {
    let reactor = Arc::clone(reactor);
    std::thread::spawn(move || reactor.read(file, offset, size))
}

/// Poll until `predicate` holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

/// The byte pattern the sim engine fills files with.
pub fn pattern(range: std::ops::Range<usize>) -> Vec<u8> {
    range.map(|i| (i % 256) as u8).collect()
}
