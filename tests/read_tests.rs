//! End-to-end read scenarios: sim engine -> alert pump -> reactor -> bytes.

mod common;

use std::time::Duration;

use btfs::session::sim::SimTorrent;
use common::{pattern, read_in_thread, spawn_mount, wait_until};

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn single_piece_file_reads_back_exactly() {
    let piece = 64 * 1024;
    let (reactor, ctl, _pump) = spawn_mount(SimTorrent::new(piece).file("f", piece as u64));

    let reader = read_in_thread(&reactor, 0, 0, piece);
    ctl.complete_piece(0);

    let bytes = reader.join().unwrap().unwrap();
    assert_eq!(bytes.len(), piece);
    assert_eq!(bytes, pattern(0..piece));
}

#[test]
fn cross_piece_read_survives_reverse_delivery() {
    let piece = 16 * 1024;
    let (reactor, ctl, _pump) = spawn_mount(SimTorrent::new(piece).file("f", 48 * 1024));

    let reader = read_in_thread(&reactor, 0, 8 * 1024, 24 * 1024);
    // The jump marks piece 0 hot once the read has registered.
    assert!(wait_until(TIMEOUT, || {
        ctl.piece_priority(0) == btfs::session::Priority::High
    }));

    // Deliver the second piece before the first.
    ctl.complete_piece(1);
    ctl.complete_piece(0);

    let bytes = reader.join().unwrap().unwrap();
    assert_eq!(bytes, pattern(8 * 1024..32 * 1024));
}

#[test]
fn tail_read_is_clamped_to_file_size() {
    let (reactor, ctl, _pump) = spawn_mount(SimTorrent::new(16 * 1024).file("f", 1000));

    let reader = read_in_thread(&reactor, 0, 900, 500);
    ctl.complete_piece(0);

    let bytes = reader.join().unwrap().unwrap();
    assert_eq!(bytes.len(), 100);
    assert_eq!(bytes, pattern(900..1000));
}

#[test]
fn read_past_eof_returns_empty_without_engine_traffic() {
    let (reactor, _ctl, _pump) = spawn_mount(SimTorrent::new(16 * 1024).file("f", 1000));
    // Never completes any piece; a zero-length read must not wait.
    let bytes = reactor.read(0, 1000, 4096).unwrap();
    assert!(bytes.is_empty());
}

#[test]
fn reads_in_a_second_file_map_past_the_first() {
    let piece = 16 * 1024;
    let spec = SimTorrent::new(piece)
        .file("a.bin", 10 * 1024)
        .file("b.bin", 20 * 1024);
    let (reactor, ctl, _pump) = spawn_mount(spec);

    // b.bin's bytes start at global offset 10 KiB.
    let reader = read_in_thread(&reactor, 1, 0, 8 * 1024);
    ctl.complete_piece(0);
    ctl.complete_piece(1);

    let bytes = reader.join().unwrap().unwrap();
    assert_eq!(bytes, pattern(10 * 1024..18 * 1024));
}

#[test]
fn one_piece_wakes_every_read_waiting_on_it() {
    let piece = 16 * 1024;
    let (reactor, ctl, _pump) = spawn_mount(SimTorrent::new(piece).file("f", piece as u64));

    let first = read_in_thread(&reactor, 0, 0, 1024);
    let second = read_in_thread(&reactor, 0, 4096, 1024);
    ctl.complete_piece(0);

    assert_eq!(first.join().unwrap().unwrap(), pattern(0..1024));
    assert_eq!(second.join().unwrap().unwrap(), pattern(4096..5120));
}

#[test]
fn operations_block_until_magnet_metadata_arrives() {
    let spec = SimTorrent::new(16 * 1024)
        .file("dir/movie.mkv", 32 * 1024)
        .deferred_metadata();
    let (reactor, ctl, _pump) = spawn_mount(spec);

    let lister = {
        let reactor = std::sync::Arc::clone(&reactor);
        std::thread::spawn(move || reactor.with_index(|ix| ix.readdir("/").unwrap()))
    };

    // A failed fetch attempt is ignored; the op keeps waiting.
    ctl.fail_metadata();
    std::thread::sleep(Duration::from_millis(50));
    assert!(!lister.is_finished());

    ctl.deliver_metadata();
    assert_eq!(lister.join().unwrap().unwrap(), vec![".", "..", "dir"]);

    // And the data path works after late metadata, too.
    let reader = read_in_thread(&reactor, 0, 0, 1024);
    ctl.complete_piece(0);
    assert_eq!(reader.join().unwrap().unwrap(), pattern(0..1024));
}

#[test]
fn unhandled_alerts_are_ignored() {
    let piece = 16 * 1024;
    let (reactor, ctl, _pump) = spawn_mount(SimTorrent::new(piece).file("f", piece as u64));

    ctl.post_other();
    let reader = read_in_thread(&reactor, 0, 0, 512);
    ctl.post_other();
    ctl.complete_piece(0);

    assert_eq!(reader.join().unwrap().unwrap(), pattern(0..512));
}
