//! Directory-tree surface: lookups, listings, attribute modes, open
//! checks, both straight on the index and through a live mount pipeline.

mod common;

use btfs::fs::error::FsError;
use btfs::index::{DirIndex, DIR_MODE, FILE_MODE, ROOT_INO};
use btfs::session::sim::SimTorrent;
use btfs::session::FileEntry;
use common::spawn_mount;

fn entry(index: u32, path: &str, size: u64) -> FileEntry {
    FileEntry {
        index,
        path: path.to_string(),
        size,
    }
}

#[test]
fn nested_file_is_reachable_level_by_level() {
    let index = DirIndex::build(&[entry(0, "a/b/c.bin", 4096)]);

    assert_eq!(index.readdir("/").unwrap(), vec![".", "..", "a"]);
    assert_eq!(index.readdir("/a").unwrap(), vec![".", "..", "b"]);
    assert_eq!(index.readdir("/a/b").unwrap(), vec![".", "..", "c.bin"]);
    assert_eq!(index.getattr("/a/b/c.bin").unwrap(), (FILE_MODE, 4096));
}

#[test]
fn every_path_prefix_is_listed_in_its_parent() {
    let files = [
        entry(0, "show/s01/e01.mkv", 700),
        entry(1, "show/s01/e02.mkv", 800),
        entry(2, "show/s02/e01.mkv", 900),
        entry(3, "readme.txt", 10),
    ];
    let index = DirIndex::build(&files);

    for file in &files {
        let mut dir = String::new();
        let segments: Vec<&str> = file.path.split('/').collect();
        for segment in &segments {
            let listing = index.readdir(if dir.is_empty() { "/" } else { &dir }).unwrap();
            assert!(
                listing.iter().any(|name| name == segment),
                "{segment} missing from {dir:?}"
            );
            dir.push('/');
            dir.push_str(segment);
        }
        assert_eq!(index.getattr(&file.path).unwrap(), (FILE_MODE, file.size));
    }
}

#[test]
fn modes_match_a_read_only_mount() {
    let index = DirIndex::build(&[entry(0, "a/b.bin", 1)]);
    assert_eq!(index.getattr("/").unwrap(), (DIR_MODE, 0));
    assert_eq!(index.getattr("/a").unwrap(), (DIR_MODE, 0));
    assert_eq!(index.getattr("/a/b.bin").unwrap().0, FILE_MODE);
    assert_eq!(index.getattr("/missing"), Err(FsError::NotFound));
}

#[test]
fn open_rejects_directories_and_writers() {
    let index = DirIndex::build(&[entry(0, "a/b/c.bin", 1)]);

    assert_eq!(index.open("/a", libc::O_RDWR), Err(FsError::IsADirectory));
    assert_eq!(
        index.open("/a/b/c.bin", libc::O_RDWR),
        Err(FsError::AccessDenied)
    );
    assert_eq!(
        index.open("/a/b/c.bin", libc::O_WRONLY),
        Err(FsError::AccessDenied)
    );
    assert_eq!(index.open("/missing", libc::O_RDONLY), Err(FsError::NotFound));
    assert!(index.open("/a/b/c.bin", libc::O_RDONLY).is_ok());
}

#[test]
fn inode_lookups_mirror_path_lookups() {
    let index = DirIndex::build(&[entry(0, "a/b.bin", 5)]);

    let a = index.lookup(ROOT_INO, "a").unwrap();
    assert_eq!(Some(a), index.resolve("/a"));
    let b = index.lookup(a, "b.bin").unwrap();
    assert_eq!(Some(b), index.resolve("/a/b.bin"));

    assert_eq!(index.lookup(a, ".").unwrap(), a);
    assert_eq!(index.lookup(a, "..").unwrap(), ROOT_INO);
    assert_eq!(index.lookup(ROOT_INO, "..").unwrap(), ROOT_INO);
    assert_eq!(index.lookup(b, "x"), Err(FsError::NotADirectory));
    assert_eq!(index.lookup(ROOT_INO, "zzz"), Err(FsError::NotFound));

    assert_eq!(index.file_at(b), Some((0, 5)));
    assert_eq!(index.file_at(a), None);
}

#[test]
fn listings_come_back_sorted() {
    let index = DirIndex::build(&[
        entry(0, "zeta.bin", 1),
        entry(1, "alpha.bin", 1),
        entry(2, "midway.bin", 1),
    ]);
    assert_eq!(
        index.readdir("/").unwrap(),
        vec![".", "..", "alpha.bin", "midway.bin", "zeta.bin"]
    );
}

#[test]
fn a_mounted_torrent_exposes_its_tree() {
    let spec = SimTorrent::new(16 * 1024)
        .file("a/b/c.bin", 4096)
        .file("a/d.bin", 100);
    let (reactor, _ctl, _pump) = spawn_mount(spec);

    let listing = reactor
        .with_index(|index| index.readdir("/a").unwrap())
        .unwrap();
    assert_eq!(listing, vec![".", "..", "b", "d.bin"]);

    let attr = reactor
        .with_index(|index| index.getattr("/a/b/c.bin").unwrap())
        .unwrap();
    assert_eq!(attr, (FILE_MODE, 4096));
}
