use std::path::Path;

use crate::error::BtfsError;

/// The mount point must be an existing directory before we hand it to the
/// kernel.
pub fn validate_mount_point(path: &Path) -> Result<(), BtfsError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(BtfsError::BadMountPoint(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_point_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_mount_point(dir.path()).is_ok());

        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            validate_mount_point(&file),
            Err(BtfsError::BadMountPoint(_))
        ));
        assert!(matches!(
            validate_mount_point(&dir.path().join("missing")),
            Err(BtfsError::BadMountPoint(_))
        ));
    }
}
