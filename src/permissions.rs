//! File mode helpers. All of them are no-ops on Windows.

/// User read/write permissions (0o600).
pub const READ_WRITE: u32 = 0o600;

/// Permissions forced onto every copied dispatcher.
pub const EXECUTABLE: u32 = 0o755;

#[cfg(unix)]
mod unix {
    use fs_err as fs;
    use std::fs::Permissions;
    use std::io;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Set the mode of `path` to exactly `mode`.
    pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, Permissions::from_mode(mode))
    }

    /// Adds mode bits to a file for as long as the guard is alive.
    pub struct ModeGuard {
        path: PathBuf,
        original: Permissions,
    }

    impl ModeGuard {
        /// OR `bits` into the current mode of `path`.
        pub fn new(path: &Path, bits: u32) -> io::Result<Self> {
            let original = fs::metadata(path)?.permissions();
            if original.mode() & bits != bits {
                fs::set_permissions(path, Permissions::from_mode(original.mode() | bits))?;
            }
            Ok(Self {
                path: path.to_path_buf(),
                original,
            })
        }
    }

    impl Drop for ModeGuard {
        fn drop(&mut self) {
            if let Err(e) = fs::set_permissions(&self.path, self.original.clone()) {
                tracing::warn!("Failed to restore file permissions: {}", e);
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn guard_adds_and_restores_bits() -> io::Result<()> {
            let dir = tempfile::tempdir()?;
            let file = dir.path().join("libfoo.dylib");
            fs::write(&file, "")?;
            set_mode(&file, 0o444)?;

            {
                let _guard = ModeGuard::new(&file, super::super::READ_WRITE)?;
                let mode = fs::metadata(&file)?.permissions().mode();
                assert_eq!(mode & 0o777, 0o644);
            }

            let mode = fs::metadata(&file)?.permissions().mode();
            assert_eq!(mode & 0o777, 0o444);
            Ok(())
        }

        #[test]
        fn guard_on_missing_file_fails() {
            assert!(ModeGuard::new(Path::new("does-not-exist"), 0o200).is_err());
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::io;
    use std::path::Path;

    pub fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
        Ok(())
    }

    pub struct ModeGuard;

    impl ModeGuard {
        pub fn new(_path: &Path, _bits: u32) -> io::Result<Self> {
            Ok(Self)
        }
    }
}

#[cfg(unix)]
pub use self::unix::{ModeGuard, set_mode};

#[cfg(windows)]
pub use self::windows::{ModeGuard, set_mode};
