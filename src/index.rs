//! Directory tree over the torrent's file list.
//!
//! Built exactly once, when metadata becomes available, and immutable from
//! then on. The index is addressed two ways: by POSIX path (the contract
//! the tests exercise) and by inode number (what the kernel speaks). Inode
//! numbers are assigned in insertion order with the root fixed at 1.

use std::collections::BTreeMap;
use std::collections::HashMap;

use tracing::warn;

use crate::fs::error::FsError;
use crate::session::FileEntry;

pub const ROOT_INO: u64 = 1;

/// File mode reported for directories (`drwxr-xr-x`).
pub const DIR_MODE: u32 = (libc::S_IFDIR as u32) | 0o755;
/// File mode reported for files (`-r--r--r--`).
pub const FILE_MODE: u32 = (libc::S_IFREG as u32) | 0o444;

#[derive(Debug)]
pub enum Node {
    Directory {
        parent: u64,
        children: BTreeMap<String, u64>,
    },
    File {
        parent: u64,
        size: u64,
        file_index: u32,
    },
}

impl Node {
    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }

    pub fn size(&self) -> u64 {
        match self {
            Node::Directory { .. } => 0,
            Node::File { size, .. } => *size,
        }
    }

    pub fn parent(&self) -> u64 {
        match self {
            Node::Directory { parent, .. } | Node::File { parent, .. } => *parent,
        }
    }
}

pub struct DirIndex {
    /// Indexed by `ino - 1`.
    nodes: Vec<Node>,
    /// Engine file index to size, for read-time clamping.
    sizes: HashMap<u32, u64>,
}

impl DirIndex {
    /// Build the tree from the engine's file list.
    ///
    /// Each path is split on `/` with empty, `.` and `..` segments dropped;
    /// intermediate directories are created on first use. Entries that
    /// collide with an existing node of the other kind are skipped.
    pub fn build(files: &[FileEntry]) -> Self {
        let mut index = Self {
            nodes: vec![Node::Directory {
                parent: ROOT_INO,
                children: BTreeMap::new(),
            }],
            sizes: HashMap::new(),
        };

        for entry in files {
            let segments: Vec<&str> = entry
                .path
                .split('/')
                .filter(|s| !s.is_empty() && *s != "." && *s != "..")
                .collect();
            let Some((name, dirs)) = segments.split_last() else {
                warn!(path = %entry.path, "skipping torrent file with empty path");
                continue;
            };

            let mut dir = ROOT_INO;
            let mut ok = true;
            for seg in dirs {
                match index.child_directory(dir, seg) {
                    Some(ino) => dir = ino,
                    None => {
                        warn!(path = %entry.path, segment = %seg, "path component collides with a file");
                        ok = false;
                        break;
                    }
                }
            }
            if !ok {
                continue;
            }

            if index.child_of(dir, name).is_some() {
                warn!(path = %entry.path, "duplicate path in torrent, keeping the first");
                continue;
            }
            let node = Node::File {
                parent: dir,
                size: entry.size,
                file_index: entry.index,
            };
            let ino = index.push(node);
            index.link(dir, name, ino);
            index.sizes.insert(entry.index, entry.size);
        }

        index
    }

    /// Number of nodes, the root included (so never zero).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, ino: u64) -> Option<&Node> {
        ino.checked_sub(1).and_then(|i| self.nodes.get(i as usize))
    }

    /// Walk a `/`-separated absolute path down the tree.
    pub fn resolve(&self, path: &str) -> Option<u64> {
        let mut ino = ROOT_INO;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            ino = self.child_of(ino, seg)?;
        }
        Some(ino)
    }

    /// Resolve one name inside a directory, `.` and `..` included.
    pub fn lookup(&self, parent: u64, name: &str) -> Result<u64, FsError> {
        let node = self.node(parent).ok_or(FsError::NotFound)?;
        let Node::Directory { children, .. } = node else {
            return Err(FsError::NotADirectory);
        };
        match name {
            "." => Ok(parent),
            ".." => Ok(node.parent()),
            _ => children.get(name).copied().ok_or(FsError::NotFound),
        }
    }

    /// `(mode, size)` for a path, per the POSIX surface the mount exposes.
    pub fn getattr(&self, path: &str) -> Result<(u32, u64), FsError> {
        let ino = self.resolve(path).ok_or(FsError::NotFound)?;
        let node = self.node(ino).ok_or(FsError::NotFound)?;
        if node.is_directory() {
            Ok((DIR_MODE, 0))
        } else {
            Ok((FILE_MODE, node.size()))
        }
    }

    /// Immediate child names of a directory, `.` and `..` first.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let ino = self.resolve(path).ok_or(FsError::NotFound)?;
        Ok(self
            .entries(ino)?
            .into_iter()
            .map(|(_, _, name)| name)
            .collect())
    }

    /// Validate an open request against a path; returns the file's inode.
    pub fn open(&self, path: &str, flags: i32) -> Result<u64, FsError> {
        let ino = self.resolve(path).ok_or(FsError::NotFound)?;
        self.open_ino(ino, flags)?;
        Ok(ino)
    }

    /// Validate an open request against an inode.
    pub fn open_ino(&self, ino: u64, flags: i32) -> Result<(), FsError> {
        let node = self.node(ino).ok_or(FsError::NotFound)?;
        if node.is_directory() {
            return Err(FsError::IsADirectory);
        }
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(FsError::AccessDenied);
        }
        Ok(())
    }

    /// Directory listing as `(ino, is_directory, name)`, `.` and `..` first.
    pub fn entries(&self, ino: u64) -> Result<Vec<(u64, bool, String)>, FsError> {
        let node = self.node(ino).ok_or(FsError::NotFound)?;
        let Node::Directory { children, .. } = node else {
            return Err(FsError::NotADirectory);
        };
        let mut entries = vec![
            (ino, true, ".".to_string()),
            (node.parent(), true, "..".to_string()),
        ];
        for (name, child) in children {
            let is_dir = self.node(*child).map(Node::is_directory).unwrap_or(false);
            entries.push((*child, is_dir, name.clone()));
        }
        Ok(entries)
    }

    /// `(file_index, size)` when the inode names a regular file.
    pub fn file_at(&self, ino: u64) -> Option<(u32, u64)> {
        match self.node(ino)? {
            Node::File {
                file_index, size, ..
            } => Some((*file_index, *size)),
            Node::Directory { .. } => None,
        }
    }

    pub fn file_size(&self, file_index: u32) -> Option<u64> {
        self.sizes.get(&file_index).copied()
    }

    fn push(&mut self, node: Node) -> u64 {
        self.nodes.push(node);
        self.nodes.len() as u64
    }

    fn link(&mut self, dir: u64, name: &str, ino: u64) {
        if let Some(Node::Directory { children, .. }) = self.nodes.get_mut(dir as usize - 1) {
            children.insert(name.to_string(), ino);
        }
    }

    fn child_of(&self, dir: u64, name: &str) -> Option<u64> {
        match self.node(dir)? {
            Node::Directory { children, .. } => children.get(name).copied(),
            Node::File { .. } => None,
        }
    }

    /// Get or create the directory `name` under `dir`. `None` when the name
    /// is already taken by a file.
    fn child_directory(&mut self, dir: u64, name: &str) -> Option<u64> {
        if let Some(existing) = self.child_of(dir, name) {
            return match self.node(existing) {
                Some(Node::Directory { .. }) => Some(existing),
                _ => None,
            };
        }
        let ino = self.push(Node::Directory {
            parent: dir,
            children: BTreeMap::new(),
        });
        self.link(dir, name, ino);
        Some(ino)
    }
}
