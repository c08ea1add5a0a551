//! Filesystem seam.
//!
//! [`Kvs`](crate::Kvs) performs all file handling through the
//! [`Filesystem`] trait so that storage can be substituted in tests or on
//! platforms with a non-POSIX persistence layer. The trait speaks
//! `io::Result`; translation into domain error kinds happens at the call
//! site, which knows whether a failing read was the data file or the tag
//! file.

use std::fs;
use std::io;
use std::path::Path;

/// Byte-level file operations required by the persistence engine.
pub trait Filesystem: Send + Sync {
    /// Whether a file exists at `path`.
    ///
    /// Probing failures other than absence are reported, not folded into
    /// `false`.
    fn exists(&self, path: &Path) -> io::Result<bool>;

    /// Create `path` and all missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Read the full content of the file at `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write `data` to `path`, replacing any existing content.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Rename `from` to `to`, replacing any existing file at `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Delete the file at `path`.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// The standard-library filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exists_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let fs = StdFilesystem;

        assert!(!fs.exists(&path).unwrap());
        fs.write(&path, b"content").unwrap();
        assert!(fs.exists(&path).unwrap());
        assert_eq!(fs.read(&path).unwrap(), b"content");
    }

    #[test]
    fn write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let fs = StdFilesystem;

        fs.write(&path, b"first").unwrap();
        fs.write(&path, b"second").unwrap();
        assert_eq!(fs.read(&path).unwrap(), b"second");
    }

    #[test]
    fn rename_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let fs = StdFilesystem;

        fs.write(&a, b"a").unwrap();
        fs.write(&b, b"b").unwrap();
        fs.rename(&a, &b).unwrap();
        assert!(!fs.exists(&a).unwrap());
        assert_eq!(fs.read(&b).unwrap(), b"a");
    }

    #[test]
    fn remove_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        let fs = StdFilesystem;

        fs.write(&path, b"x").unwrap();
        fs.remove(&path).unwrap();
        assert!(!fs.exists(&path).unwrap());
    }

    #[test]
    fn create_dir_all_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        let fs = StdFilesystem;

        fs.create_dir_all(&nested).unwrap();
        fs.write(&nested.join("file"), b"x").unwrap();
        assert!(fs.exists(&nested.join("file")).unwrap());
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = StdFilesystem.read(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
