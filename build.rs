use std::env;
use std::path::PathBuf;

const MIN_VERSION: &str = "2.0.0";

fn main() {
    // The cxx bridge is only part of the crate when the libtorrent backend
    // is enabled; the default build has no C++ to compile.
    if env::var_os("CARGO_FEATURE_LIBTORRENT").is_none() {
        return;
    }

    println!("cargo:rerun-if-env-changed=LIBTORRENT_INCLUDE_DIR");
    println!("cargo:rerun-if-env-changed=LIBTORRENT_LIB_DIR");

    let mut bridge = cxx_build::bridge("src/ffi/bridge.rs");
    bridge.flag_if_supported("-std=c++17");
    bridge.file("src/ffi/session.cpp");
    bridge.include(PathBuf::from("src/ffi/include"));

    let mut libs: Vec<String> = Vec::new();
    if let Some(path) = env::var_os("LIBTORRENT_INCLUDE_DIR") {
        bridge.include(PathBuf::from(path));
    }
    if let Some(path) = env::var_os("LIBTORRENT_LIB_DIR") {
        println!(
            "cargo:rustc-link-search=native={}",
            PathBuf::from(&path).display()
        );
        libs.push("torrent-rasterbar".to_string());
    } else if let Ok(libtorrent) = pkg_config::Config::new()
        .atleast_version(MIN_VERSION)
        .probe("libtorrent-rasterbar")
    {
        for path in libtorrent.include_paths {
            bridge.include(path);
        }
        for lib_path in libtorrent.link_paths {
            println!("cargo:rustc-link-search=native={}", lib_path.display());
        }
        libs.extend(libtorrent.libs);
    } else {
        libs.push("torrent-rasterbar".to_string());
    }

    bridge.compile("btfs-libtorrent");
    for lib in libs {
        println!("cargo:rustc-link-lib={lib}");
    }

    println!("cargo:rerun-if-changed=src/ffi/bridge.rs");
    println!("cargo:rerun-if-changed=src/ffi/include/btfs/session.hpp");
    println!("cargo:rerun-if-changed=src/ffi/session.cpp");
}
