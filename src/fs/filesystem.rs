//! The fuser op table.
//!
//! Thin translation between the kernel's inode-addressed requests and the
//! reactor/index core. Every operation that touches torrent state goes
//! through [`Reactor`], which blocks it until metadata has arrived; the
//! read path blocks further until its pieces have been delivered.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use fuser::{FileAttr, FileType, Filesystem, MountOption};
use tracing::{error, info, warn};

use crate::fs::error::FsError;
use crate::fs::macros::{fs_op, reply_fs_error};
use crate::reactor::Reactor;
use crate::session::{create_session, AlertPump, SessionOptions, TorrentSource};

/// Attribute cache TTL handed to the kernel.
const ATTR_TTL: Duration = Duration::from_secs(1);

/// The mounted filesystem.
///
/// Holds the reactor shared with the alert pump, plus the session
/// parameters needed to start the engine from `init`.
pub struct BtfsFs {
    reactor: Arc<Reactor>,
    boot: Option<Boot>,
    pump: Option<AlertPump>,
    uid: u32,
    gid: u32,
}

struct Boot {
    options: SessionOptions,
    source: TorrentSource,
}

impl BtfsFs {
    pub fn new(reactor: Arc<Reactor>, options: SessionOptions, source: TorrentSource) -> Self {
        Self {
            reactor,
            boot: Some(Boot { options, source }),
            pump: None,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    /// Mount at `mountpoint` and serve until unmounted.
    pub fn mount(self, mountpoint: &Path) -> Result<()> {
        let options = [
            MountOption::RO,
            MountOption::NoSuid,
            MountOption::NoDev,
            MountOption::NoAtime,
            MountOption::AutoUnmount,
            MountOption::FSName("btfs".to_string()),
        ];
        info!(mountpoint = %mountpoint.display(), "mounting");
        fuser::mount2(self, mountpoint, &options)
            .with_context(|| format!("failed to mount {}", mountpoint.display()))
    }

    fn file_attr(&self, ino: u64, size: u64) -> FileAttr {
        let now = SystemTime::now();
        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: FileType::RegularFile,
            perm: 0o444,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            flags: 0,
            blksize: 512,
        }
    }

    fn dir_attr(&self, ino: u64) -> FileAttr {
        let mut attr = self.file_attr(ino, 0);
        attr.kind = FileType::Directory;
        attr.perm = 0o755;
        attr.nlink = 2;
        attr.blocks = 0;
        attr
    }

    fn attr_of(&self, ino: u64, is_directory: bool, size: u64) -> FileAttr {
        if is_directory {
            self.dir_attr(ino)
        } else {
            self.file_attr(ino, size)
        }
    }
}

impl Filesystem for BtfsFs {
    /// Start the engine: create the session, enqueue the torrent, spawn
    /// the alert pump. Metadata arrives asynchronously; operations block
    /// on the reactor until it does.
    fn init(
        &mut self,
        _req: &fuser::Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        let Some(boot) = self.boot.take() else {
            error!("filesystem initialized twice");
            return Err(libc::EIO);
        };

        let mut session = match create_session(&boot.options) {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "failed to create engine session");
                return Err(libc::EIO);
            }
        };
        if let Err(e) = session.add_torrent(&boot.source) {
            error!(error = %e, "failed to add torrent");
            return Err(libc::EIO);
        }
        match AlertPump::spawn(session, Arc::clone(&self.reactor)) {
            Ok(pump) => self.pump = Some(pump),
            Err(e) => {
                error!(error = %e, "failed to spawn alert pump");
                return Err(libc::EIO);
            }
        }

        info!("filesystem initialized, engine session running");
        Ok(())
    }

    /// Invalidate pending reads, then stop and join the alert thread. The
    /// engine session itself is leaked by the pump on its way out.
    fn destroy(&mut self) {
        info!("unmounting, shutting down");
        self.reactor.shutdown();
        if let Some(pump) = self.pump.take() {
            pump.shutdown();
        }
    }

    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &std::ffi::OsStr,
        reply: fuser::ReplyEntry,
    ) {
        let name = name.to_string_lossy();
        fs_op!("lookup", parent = parent, name = name.as_ref());

        let resolved = self
            .reactor
            .with_index(|index| {
                let ino = index.lookup(parent, &name)?;
                let node = index.node(ino).ok_or(FsError::NotFound)?;
                Ok((ino, node.is_directory(), node.size()))
            })
            .and_then(|r| r);

        match resolved {
            Ok((ino, is_dir, size)) => {
                fs_op!(done: "lookup", parent = parent, ino = ino);
                reply.entry(&ATTR_TTL, &self.attr_of(ino, is_dir, size), 0);
            }
            Err(err) => reply_fs_error!(reply, "lookup", err, parent = parent),
        }
    }

    fn getattr(&mut self, _req: &fuser::Request<'_>, ino: u64, reply: fuser::ReplyAttr) {
        fs_op!("getattr", ino = ino);

        let resolved = self
            .reactor
            .with_index(|index| {
                let node = index.node(ino).ok_or(FsError::NotFound)?;
                Ok((node.is_directory(), node.size()))
            })
            .and_then(|r| r);

        match resolved {
            Ok((is_dir, size)) => {
                fs_op!(done: "getattr", ino = ino, size = size);
                reply.attr(&ATTR_TTL, &self.attr_of(ino, is_dir, size));
            }
            Err(err) => reply_fs_error!(reply, "getattr", err, ino = ino),
        }
    }

    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        fs_op!("open", ino = ino, flags = flags);

        let checked = self
            .reactor
            .with_index(|index| index.open_ino(ino, flags))
            .and_then(|r| r);

        match checked {
            Ok(()) => {
                fs_op!(done: "open", ino = ino);
                // Read handles carry no state; the inode doubles as the fh.
                reply.opened(ino, 0);
            }
            Err(err) => reply_fs_error!(reply, "open", err, ino = ino),
        }
    }

    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        fs_op!("readdir", ino = ino, offset = offset);

        let entries = self
            .reactor
            .with_index(|index| index.entries(ino))
            .and_then(|r| r);

        match entries {
            Ok(entries) => {
                for (i, (child, is_dir, name)) in
                    entries.into_iter().enumerate().skip(offset.max(0) as usize)
                {
                    let kind = if is_dir {
                        FileType::Directory
                    } else {
                        FileType::RegularFile
                    };
                    // Buffer full; the kernel resumes from the offset.
                    if reply.add(child, (i + 1) as i64, kind, &name) {
                        break;
                    }
                }
                fs_op!(done: "readdir", ino = ino);
                reply.ok();
            }
            Err(err) => reply_fs_error!(reply, "readdir", err, ino = ino),
        }
    }

    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        fs_op!("read", ino = ino, fh = fh, offset = offset, size = size);

        if offset < 0 {
            fs_op!(fail: "read", "EINVAL", ino = ino, offset = offset);
            reply.error(libc::EINVAL);
            return;
        }

        let target = self
            .reactor
            .with_index(|index| {
                let node = index.node(ino).ok_or(FsError::NotFound)?;
                if node.is_directory() {
                    return Err(FsError::IsADirectory);
                }
                index.file_at(ino).ok_or(FsError::NotFound)
            })
            .and_then(|r| r);

        let (file, _file_size) = match target {
            Ok(target) => target,
            Err(err) => {
                reply_fs_error!(reply, "read", err, ino = ino);
                return;
            }
        };

        // Blocks until every piece backing the range has been delivered.
        match self.reactor.read(file, offset as u64, size as usize) {
            Ok(bytes) => {
                fs_op!(done: "read", ino = ino, bytes_read = bytes.len());
                reply.data(&bytes);
            }
            Err(err) => {
                warn!(
                    op = "read",
                    ino = ino,
                    file_index = file,
                    error = err.name(),
                    "read failed"
                );
                reply.error(err.errno());
            }
        }
    }
}
