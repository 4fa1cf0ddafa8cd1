//! Decomposition of one VFS read into piece-level fetches.

use crate::session::TorrentHandle;

/// One byte range inside one piece, with its destination in the read's
/// output buffer.
///
/// Invariants held by construction: `start + length` never exceeds the
/// piece size, `length > 0`, and the destination ranges of a request's
/// parts tile its buffer exactly. Each part flips `filled` once; the copy
/// is guarded so a piece delivered twice never rewrites bytes.
#[derive(Debug)]
pub struct PiecePart {
    pub piece: u32,
    /// Byte offset inside the piece.
    pub start: usize,
    pub length: usize,
    /// Byte offset inside the owning request's buffer.
    dst: usize,
    filled: bool,
}

impl PiecePart {
    pub fn filled(&self) -> bool {
        self.filled
    }
}

/// One in-flight VFS read: an ordered run of [`PiecePart`]s plus the buffer
/// they assemble into.
///
/// Created in the FUSE read op, registered with the reactor while waiting,
/// and consumed via [`ReadRequest::into_bytes`] once finished.
pub struct ReadRequest {
    parts: Vec<PiecePart>,
    buf: Vec<u8>,
}

impl ReadRequest {
    /// Split `(file, offset, size)` into piece parts.
    ///
    /// The request is first clamped so it never extends past the end of the
    /// file (possibly to zero bytes), then walked through the engine's
    /// file-to-piece mapping, clamping each region at its piece boundary.
    pub fn new(
        torrent: &dyn TorrentHandle,
        file: u32,
        offset: u64,
        size: usize,
        file_size: u64,
    ) -> Self {
        let mut size = (size as u64).min(file_size.saturating_sub(offset)) as usize;
        let mut buf = vec![0u8; size];
        let mut parts = Vec::new();

        let mut offset = offset;
        let mut dst = 0usize;
        while size > 0 {
            let region = torrent.map_file(file, offset, size);
            let piece_len = torrent.piece_size(region.piece);
            let length = region
                .length
                .min(size)
                .min(piece_len.saturating_sub(region.start));
            if length == 0 {
                // The engine mapped past the end of the piece space; the
                // buffer was sized for the clamped request, so shrink it.
                buf.truncate(dst);
                break;
            }
            parts.push(PiecePart {
                piece: region.piece,
                start: region.start,
                length,
                dst,
                filled: false,
            });
            offset += length as u64;
            dst += length;
            size -= length;
        }

        Self { parts, buf }
    }

    /// Total bytes this read will return; the clamped request size.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn parts(&self) -> &[PiecePart] {
        &self.parts
    }

    /// Piece index of the first part, if any.
    pub fn first_piece(&self) -> Option<u32> {
        self.parts.first().map(|p| p.piece)
    }

    /// Request delivery of every part whose piece the engine already has.
    ///
    /// Idempotent: a piece delivered twice is ignored by [`Self::copy`].
    pub fn trigger(&self, torrent: &dyn TorrentHandle) {
        for part in &self.parts {
            if !part.filled && torrent.have_piece(part.piece) {
                torrent.read_piece(part.piece);
            }
        }
    }

    /// Copy a delivered piece into every unfilled part it covers.
    pub fn copy(&mut self, piece: u32, data: &[u8]) {
        for part in &mut self.parts {
            if part.piece != piece || part.filled {
                continue;
            }
            let end = part.start + part.length;
            debug_assert!(end <= data.len(), "piece buffer shorter than mapped part");
            if end > data.len() {
                continue;
            }
            self.buf[part.dst..part.dst + part.length].copy_from_slice(&data[part.start..end]);
            part.filled = true;
        }
    }

    /// True once every part has been filled.
    pub fn finished(&self) -> bool {
        self.parts.iter().all(|p| p.filled)
    }

    /// Hand the assembled buffer back to the caller.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::sim::{SimSession, SimTorrent};

    const PIECE: usize = 16 * 1024;

    fn handle_with_file(size: u64) -> (std::sync::Arc<dyn TorrentHandle>, crate::session::sim::SimController) {
        let (_session, ctl) = SimSession::new(SimTorrent::new(PIECE).file("f.bin", size));
        (ctl.handle(), ctl)
    }

    #[test]
    fn cross_piece_request_splits_at_boundaries() {
        let (handle, _ctl) = handle_with_file(48 * 1024);
        let req = ReadRequest::new(&*handle, 0, 8 * 1024, 24 * 1024, 48 * 1024);

        assert_eq!(req.len(), 24 * 1024);
        let parts: Vec<_> = req
            .parts()
            .iter()
            .map(|p| (p.piece, p.start, p.length))
            .collect();
        assert_eq!(parts, vec![(0, 8 * 1024, 8 * 1024), (1, 0, 16 * 1024)]);
    }

    #[test]
    fn request_is_clamped_to_file_size() {
        let (handle, _ctl) = handle_with_file(1000);
        let req = ReadRequest::new(&*handle, 0, 900, 500, 1000);
        assert_eq!(req.len(), 100);

        let req = ReadRequest::new(&*handle, 0, 1000, 500, 1000);
        assert!(req.is_empty());
        assert!(req.finished());
    }

    #[test]
    fn copy_fills_each_destination_exactly_once() {
        let (handle, _ctl) = handle_with_file(32 * 1024);
        let mut req = ReadRequest::new(&*handle, 0, 0, 32 * 1024, 32 * 1024);

        let first: Vec<u8> = vec![0xAA; PIECE];
        let second: Vec<u8> = vec![0xBB; PIECE];
        req.copy(0, &first);
        assert!(!req.finished());
        // A repeated delivery must not rewrite the already-filled part.
        req.copy(0, &second);
        req.copy(1, &second);
        assert!(req.finished());

        let bytes = req.into_bytes();
        assert!(bytes[..PIECE].iter().all(|&b| b == 0xAA));
        assert!(bytes[PIECE..].iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn out_of_order_delivery_assembles_correctly() {
        let (handle, ctl) = handle_with_file(48 * 1024);
        let mut req = ReadRequest::new(&*handle, 0, 8 * 1024, 24 * 1024, 48 * 1024);

        let content = ctl.content();
        req.copy(1, &content[PIECE..2 * PIECE]);
        req.copy(0, &content[..PIECE]);
        assert!(req.finished());
        assert_eq!(req.into_bytes(), content[8 * 1024..32 * 1024].to_vec());
    }
}
