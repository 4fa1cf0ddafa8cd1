//! Piece-priority steering for sequential access.
//!
//! One cursor marks the head of the download window. Reads jump the cursor
//! to their first piece; every finished piece slides it forward. Pieces
//! just ahead of the cursor are fetched at the highest priority, the rest
//! of the currently requested byte range at a low one, and everything else
//! stays at whatever an earlier jump left it with (the engine tolerates
//! stale priorities and the next jump re-establishes the window).

use tracing::trace;

use crate::session::{Priority, TorrentHandle};

/// Bytes of missing pieces held at [`Priority::High`] ahead of the cursor.
pub const HEAD_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct Window {
    cursor: u32,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    /// Piece index at the head of the download window.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Re-aim the window at `piece`.
    ///
    /// The cursor lands on the first piece at or after `piece` that the
    /// engine is still missing. From there, missing pieces spanning at
    /// least [`HEAD_BYTES`] are raised to [`Priority::High`]; missing
    /// pieces covering the remaining `hint` bytes of the request (counted
    /// from `piece`) are raised to [`Priority::Low`]. Pieces already
    /// present are never reprioritized.
    pub fn jump(&mut self, torrent: &dyn TorrentHandle, piece: u32, hint: usize) {
        let pieces = torrent.num_pieces();
        if piece >= pieces {
            return;
        }

        let mut tail = piece;
        while tail < pieces && torrent.have_piece(tail) {
            tail += 1;
        }
        if tail == pieces {
            return;
        }
        self.cursor = tail;
        trace!(cursor = tail, hint, "window jump");

        // Hot window: HIGH until enough missing bytes are in flight.
        let mut hot_end = tail;
        let mut missing: u64 = 0;
        while hot_end < pieces && missing < HEAD_BYTES {
            if !torrent.have_piece(hot_end) {
                torrent.set_piece_priority(hot_end, Priority::High);
                missing += torrent.piece_size(hot_end) as u64;
            }
            hot_end += 1;
        }

        // Cold tail: LOW across the rest of the requested range so pieces
        // beyond the hot window are still being fetched.
        let mut span: u64 = 0;
        let mut range_end = piece;
        while range_end < pieces && span < hint as u64 {
            span += torrent.piece_size(range_end) as u64;
            range_end += 1;
        }
        for i in hot_end..range_end {
            if !torrent.have_piece(i) {
                torrent.set_piece_priority(i, Priority::Low);
            }
        }
    }

    /// Slide forward: re-find the next missing piece at or after the
    /// cursor and refill the hot window. Called on every finished piece.
    pub fn advance(&mut self, torrent: &dyn TorrentHandle) {
        let cursor = self.cursor;
        self.jump(torrent, cursor, 0);
    }
}
