#[allow(missing_docs)]
#[cxx::bridge(namespace = "btfs")]
pub mod ffi {
    #[derive(Debug)]
    struct EngineOptions {
        save_path: String,
        min_port: u16,
        max_port: u16,
        download_rate_limit: i64,
        upload_rate_limit: i64,
    }

    #[derive(Debug)]
    struct NativeFile {
        index: u32,
        path: String,
        size: u64,
    }

    #[derive(Debug)]
    struct NativeRegion {
        piece: i32,
        start: i64,
        length: i64,
    }

    #[derive(Debug)]
    struct NativeAlert {
        kind: NativeAlertKind,
        piece: i32,
        data: Vec<u8>,
        has_metadata: bool,
    }

    #[derive(Debug)]
    enum NativeAlertKind {
        TorrentAdded,
        MetadataReceived,
        MetadataFailed,
        PieceFinished,
        ReadPiece,
        Other,
    }

    unsafe extern "C++" {
        include!("btfs/session.hpp");

        type Session;

        /// Throws when the session cannot be constructed.
        fn new_session(options: &EngineOptions) -> Result<UniquePtr<Session>>;

        /// Returns an error message, empty on success.
        fn add_magnet(self: &Session, uri: &str) -> String;
        /// Returns an error message, empty on success.
        fn add_metainfo(self: &Session, path: &str) -> String;

        fn poll_alerts(self: &Session, timeout_ms: i64) -> Vec<NativeAlert>;

        fn files(self: &Session) -> Vec<NativeFile>;
        fn num_pieces(self: &Session) -> i32;
        fn piece_size(self: &Session, piece: i32) -> i32;
        fn have_piece(self: &Session, piece: i32) -> bool;
        fn map_file(self: &Session, file: i32, offset: i64, size: i64) -> NativeRegion;
        fn read_piece(self: &Session, piece: i32);
        fn set_piece_priority(self: &Session, piece: i32, priority: u8);
        fn set_file_priority(self: &Session, file: i32, priority: u8);
    }
}
