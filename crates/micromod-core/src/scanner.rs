//! Enumerating candidate modules in a directory.
//!
//! A scan lists the direct entries of one directory and never descends into
//! subdirectories. [`WalkDirScanner`] is the filesystem implementation.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Failure to open or release a directory scan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ScanError(pub String);

/// File type of a directory entry, as seen without following links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Symbolic link, whatever it points to.
    SymbolicLink,
    /// Directory. Never loaded and never descended into.
    Directory,
    /// Anything else (sockets, FIFOs, devices).
    Other,
}

impl EntryKind {
    /// Whether an entry of this kind is handed to the loader.
    #[must_use]
    pub fn is_loadable(self) -> bool {
        !matches!(self, Self::Directory)
    }
}

/// One direct entry of the scanned directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path of the entry.
    pub path: PathBuf,
    /// Its file type.
    pub kind: EntryKind,
}

/// Starts directory scans.
pub trait DirectoryScanner {
    /// An in-progress scan.
    type Scan: DirectoryScan;

    /// Opens `dir` for scanning.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`] if the directory cannot be opened.
    fn open(&self, dir: &Path) -> Result<Self::Scan, ScanError>;
}

/// A finite, non-restartable sequence of direct entries.
///
/// An `Err` item means the directory itself became unreadable.
pub trait DirectoryScan: Iterator<Item = Result<DirEntry, ScanError>> {
    /// Releases the resources held by the scan.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`] if releasing fails.
    fn close(self) -> Result<(), ScanError>;
}

/// Scans the filesystem with `walkdir`, in file name order.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkDirScanner;

impl DirectoryScanner for WalkDirScanner {
    type Scan = WalkDirScan;

    fn open(&self, dir: &Path) -> Result<WalkDirScan, ScanError> {
        let metadata = fs::metadata(dir).map_err(|e| ScanError(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(ScanError("not a directory".to_string()));
        }

        debug!(dir = %dir.display(), "Scanning modules directory");
        let inner = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Ok(WalkDirScan { inner })
    }
}

/// Scan started by [`WalkDirScanner`].
pub struct WalkDirScan {
    inner: walkdir::IntoIter,
}

impl Iterator for WalkDirScan {
    type Item = Result<DirEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    let kind = if file_type.is_symlink() {
                        EntryKind::SymbolicLink
                    } else if file_type.is_dir() {
                        EntryKind::Directory
                    } else if file_type.is_file() {
                        EntryKind::File
                    } else {
                        EntryKind::Other
                    };
                    return Some(Ok(DirEntry {
                        path: entry.into_path(),
                        kind,
                    }));
                }
                Err(err) if err.depth() == 0 => return Some(Err(ScanError(err.to_string()))),
                Err(err) => warn!(error = %err, "Skipping unreadable directory entry"),
            }
        }
    }
}

impl DirectoryScan for WalkDirScan {
    fn close(self) -> Result<(), ScanError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn scan_all(dir: &Path) -> Vec<DirEntry> {
        let scan = WalkDirScanner.open(dir).unwrap();
        scan.map(Result::unwrap).collect()
    }

    #[test]
    fn test_scan_lists_direct_entries_in_name_order() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.so"), b"").unwrap();
        fs::write(temp.path().join("a.so"), b"").unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("nested/c.so"), b"").unwrap();

        let entries = scan_all(temp.path());

        assert_eq!(
            entries,
            vec![
                DirEntry {
                    path: temp.path().join("a.so"),
                    kind: EntryKind::File,
                },
                DirEntry {
                    path: temp.path().join("b.so"),
                    kind: EntryKind::File,
                },
                DirEntry {
                    path: temp.path().join("nested"),
                    kind: EntryKind::Directory,
                },
            ]
        );
    }

    #[test]
    fn test_scan_reports_symlinks_without_following() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let entries = scan_all(temp.path());

        let link = entries
            .iter()
            .find(|e| e.path.ends_with("link"))
            .expect("link entry");
        assert_eq!(link.kind, EntryKind::SymbolicLink);
    }

    #[test]
    fn test_scan_of_empty_directory_yields_nothing() {
        let temp = TempDir::new().unwrap();

        assert!(scan_all(temp.path()).is_empty());
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let temp = TempDir::new().unwrap();

        assert!(WalkDirScanner.open(&temp.path().join("absent")).is_err());
    }

    #[test]
    fn test_open_regular_file_fails() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.so");
        fs::write(&file, b"").unwrap();

        let err = WalkDirScanner.open(&file).err().unwrap();

        assert_eq!(err, ScanError("not a directory".to_string()));
    }

    #[test]
    fn test_only_directories_are_not_loadable() {
        assert!(EntryKind::File.is_loadable());
        assert!(EntryKind::SymbolicLink.is_loadable());
        assert!(EntryKind::Other.is_loadable());
        assert!(!EntryKind::Directory.is_loadable());
    }
}
