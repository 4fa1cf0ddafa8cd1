//! Configuration: CLI arguments, metadata-source parsing, save-path
//! staging.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;

use crate::error::BtfsError;
use crate::session::{SessionOptions, TorrentSource};

pub const DEFAULT_MIN_PORT: u16 = 6881;
pub const DEFAULT_MAX_PORT: u16 = 6889;
/// 5 Mbit/s expressed in bytes per second (~640 KiB/s).
pub const DEFAULT_RATE_LIMIT: i64 = 5 * 1024 * 1024 / 8;

/// Command-line surface: `btfs [OPTIONS] <METADATA> <MOUNTPOINT>`.
#[derive(Parser, Debug)]
#[command(
    name = "btfs",
    version,
    about = "Mount a torrent as a read-only filesystem, fetching bytes on demand"
)]
pub struct CliArgs {
    /// Path to a .torrent file, or a magnet link
    pub metadata: String,

    /// Directory to mount the torrent at
    pub mountpoint: PathBuf,

    /// Increase verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Lowest listen port
    #[arg(long, default_value_t = DEFAULT_MIN_PORT)]
    pub min_port: u16,

    /// Highest listen port
    #[arg(long, default_value_t = DEFAULT_MAX_PORT)]
    pub max_port: u16,

    /// Download rate limit in bytes per second (0 = unlimited)
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_RATE_LIMIT)]
    pub max_download_rate: i64,

    /// Upload rate limit in bytes per second (0 = unlimited)
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_RATE_LIMIT)]
    pub max_upload_rate: i64,

    /// Keep the staged piece data after unmount
    #[arg(short = 'k', long)]
    pub keep_data: bool,
}

impl CliArgs {
    /// Log level implied by the verbosity flags: errors only under `-q`,
    /// info by default, debug and trace as `-v` stacks up.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::INFO,
                1 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: TorrentSource,
    pub mount_point: PathBuf,
    pub min_port: u16,
    pub max_port: u16,
    pub max_download_rate: i64,
    pub max_upload_rate: i64,
    pub keep_data: bool,
}

impl Config {
    pub fn from_args(cli: &CliArgs) -> Result<Self, BtfsError> {
        if cli.min_port == 0 || cli.min_port > cli.max_port {
            return Err(BtfsError::PortRange {
                min: cli.min_port,
                max: cli.max_port,
            });
        }
        Ok(Self {
            source: parse_metadata(&cli.metadata)?,
            mount_point: cli.mountpoint.clone(),
            min_port: cli.min_port,
            max_port: cli.max_port,
            max_download_rate: cli.max_download_rate,
            max_upload_rate: cli.max_upload_rate,
            keep_data: cli.keep_data,
        })
    }

    pub fn session_options(&self, save_path: PathBuf) -> SessionOptions {
        SessionOptions {
            save_path,
            min_port: self.min_port,
            max_port: self.max_port,
            download_rate_limit: self.max_download_rate,
            upload_rate_limit: self.max_upload_rate,
        }
    }
}

/// Classify the metadata argument.
///
/// `magnet:` URIs pass through to the engine; anything `http(s):` is
/// refused (we do not fetch metadata over the web); everything else must
/// be an existing metainfo file.
pub fn parse_metadata(arg: &str) -> Result<TorrentSource, BtfsError> {
    let lower = arg.to_ascii_lowercase();
    if lower.starts_with("magnet:") {
        return Ok(TorrentSource::Magnet(arg.to_string()));
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Err(BtfsError::UnsupportedScheme(arg.to_string()));
    }
    let path = PathBuf::from(arg);
    if !path.is_file() {
        return Err(BtfsError::MetadataNotFound(path));
    }
    Ok(TorrentSource::Metainfo(path))
}

/// Create the per-mount staging directory: `<root>/btfs/btfs-XXXXXX`.
///
/// The `btfs` parent is created with mode `0755`, tolerating a prior run
/// having created it already; the unique subdirectory gets the OS default
/// secure mode.
pub fn prepare_save_path_in(root: &Path) -> Result<PathBuf, BtfsError> {
    let parent = root.join("btfs");
    match std::fs::create_dir(&parent) {
        Ok(()) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&parent, std::fs::Permissions::from_mode(0o755)).map_err(
                    |source| BtfsError::SavePath {
                        path: parent.clone(),
                        source,
                    },
                )?;
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(source) => {
            return Err(BtfsError::SavePath {
                path: parent,
                source,
            })
        }
    }

    let dir = tempfile::Builder::new()
        .prefix("btfs-")
        .tempdir_in(&parent)
        .map_err(|source| BtfsError::SavePath {
            path: parent.clone(),
            source,
        })?;
    let path = dir.into_path();
    info!(save_path = %path.display(), "staging pieces");
    Ok(path)
}

/// Staging directory under `$HOME`, falling back to `/tmp` when unset.
pub fn prepare_save_path() -> Result<PathBuf, BtfsError> {
    let root = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
    prepare_save_path_in(&root)
}
