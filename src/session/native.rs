//! libtorrent-rasterbar backend, reached through the cxx shim in
//! `src/ffi`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::BtfsError;
use crate::ffi::ffi;
use crate::session::{
    Alert, EngineSession, FileEntry, PieceRegion, Priority, SessionOptions, TorrentHandle,
    TorrentSource,
};

struct SessionRef(cxx::UniquePtr<ffi::Session>);

// The shim only exposes const entry points; libtorrent sessions and
// torrent handles are internally synchronized.
unsafe impl Send for SessionRef {}
unsafe impl Sync for SessionRef {}

pub(crate) struct NativeSession {
    inner: Arc<SessionRef>,
}

struct NativeHandle {
    inner: Arc<SessionRef>,
}

pub(crate) fn create_session(
    options: &SessionOptions,
) -> Result<Box<dyn EngineSession>, BtfsError> {
    let opts = ffi::EngineOptions {
        save_path: options.save_path.to_string_lossy().into_owned(),
        min_port: options.min_port,
        max_port: options.max_port,
        download_rate_limit: options.download_rate_limit,
        upload_rate_limit: options.upload_rate_limit,
    };
    let session = ffi::new_session(&opts).map_err(|e| BtfsError::Engine(e.to_string()))?;
    Ok(Box::new(NativeSession {
        inner: Arc::new(SessionRef(session)),
    }))
}

impl NativeSession {
    fn handle(&self) -> Arc<dyn TorrentHandle> {
        Arc::new(NativeHandle {
            inner: Arc::clone(&self.inner),
        })
    }
}

impl EngineSession for NativeSession {
    fn add_torrent(&mut self, source: &TorrentSource) -> Result<(), BtfsError> {
        let error = match source {
            TorrentSource::Magnet(uri) => self.inner.0.add_magnet(uri),
            TorrentSource::Metainfo(path) => self.inner.0.add_metainfo(&path.to_string_lossy()),
        };
        if error.is_empty() {
            Ok(())
        } else {
            Err(BtfsError::InvalidMetadata(error))
        }
    }

    fn poll_alerts(&mut self, timeout: Duration) -> Vec<Alert> {
        self.inner
            .0
            .poll_alerts(timeout.as_millis() as i64)
            .into_iter()
            .map(|alert| self.convert(alert))
            .collect()
    }
}

impl NativeSession {
    fn convert(&self, alert: ffi::NativeAlert) -> Alert {
        match alert.kind {
            ffi::NativeAlertKind::TorrentAdded => Alert::TorrentAdded {
                handle: self.handle(),
                has_metadata: alert.has_metadata,
            },
            ffi::NativeAlertKind::MetadataReceived => Alert::MetadataReceived {
                handle: self.handle(),
            },
            ffi::NativeAlertKind::MetadataFailed => Alert::MetadataFailed,
            ffi::NativeAlertKind::PieceFinished => Alert::PieceFinished {
                piece: alert.piece.max(0) as u32,
            },
            ffi::NativeAlertKind::ReadPiece => Alert::ReadPiece {
                piece: alert.piece.max(0) as u32,
                data: Bytes::from(alert.data),
            },
            _ => Alert::Other,
        }
    }
}

impl TorrentHandle for NativeHandle {
    fn files(&self) -> Vec<FileEntry> {
        self.inner
            .0
            .files()
            .into_iter()
            .map(|file| FileEntry {
                index: file.index,
                path: file.path,
                size: file.size,
            })
            .collect()
    }

    fn num_pieces(&self) -> u32 {
        self.inner.0.num_pieces().max(0) as u32
    }

    fn piece_size(&self, piece: u32) -> usize {
        self.inner.0.piece_size(piece as i32).max(0) as usize
    }

    fn have_piece(&self, piece: u32) -> bool {
        self.inner.0.have_piece(piece as i32)
    }

    fn map_file(&self, file: u32, offset: u64, size: usize) -> PieceRegion {
        let region = self
            .inner
            .0
            .map_file(file as i32, offset as i64, size as i64);
        PieceRegion {
            piece: region.piece.max(0) as u32,
            start: region.start.max(0) as usize,
            length: region.length.max(0) as usize,
        }
    }

    fn read_piece(&self, piece: u32) {
        self.inner.0.read_piece(piece as i32);
    }

    fn set_piece_priority(&self, piece: u32, priority: Priority) {
        self.inner
            .0
            .set_piece_priority(piece as i32, priority.as_u8());
    }

    fn set_file_priority(&self, file: u32, priority: Priority) {
        self.inner.0.set_file_priority(file as i32, priority.as_u8());
    }
}
