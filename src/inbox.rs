//! Import directory where downloaded documents wait to be processed.
//!
//! Files are written to a temporary name and renamed into place, so a
//! reader never observes a partially written document.

use crate::core::model::TableLabel;
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct DocumentInbox {
    root: PathBuf,
}

impl DocumentInbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self, label: TableLabel) -> PathBuf {
        self.root.join(format!("Last{}.xml", label.as_str()))
    }

    pub fn archive_path(&self, label: TableLabel, year: i32) -> PathBuf {
        self.root
            .join(format!("Archive{}-{}.csv", label.as_str(), year))
    }

    pub fn deposit_snapshot(&self, label: TableLabel, bytes: &[u8]) -> Result<()> {
        self.write_atomic(&self.snapshot_path(label), bytes)
    }

    pub fn deposit_archive(&self, label: TableLabel, year: i32, bytes: &[u8]) -> Result<()> {
        self.write_atomic(&self.archive_path(label, year), bytes)
    }

    /// Returns `None` when no snapshot has been deposited for `label`.
    pub fn read_snapshot(&self, label: TableLabel) -> Result<Option<Vec<u8>>> {
        read_optional(&self.snapshot_path(label))
    }

    pub fn read_archive(&self, label: TableLabel, year: i32) -> Result<Option<Vec<u8>>> {
        read_optional(&self.archive_path(label, year))
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create directory: {}", self.root.display()))?;

        let tmp = target.with_extension("part");
        fs::write(&tmp, bytes)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, target).with_context(|| {
            format!("Failed to move {} to {}", tmp.display(), target.display())
        })?;
        debug!("Deposited {} bytes at {}", bytes.len(), target.display());
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_names() {
        let inbox = DocumentInbox::new("/import");
        assert_eq!(
            inbox.snapshot_path(TableLabel::A),
            PathBuf::from("/import/LastA.xml")
        );
        assert_eq!(
            inbox.archive_path(TableLabel::B, 2024),
            PathBuf::from("/import/ArchiveB-2024.csv")
        );
    }

    #[test]
    fn test_deposit_and_read() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let inbox = DocumentInbox::new(temp_dir.path().join("import"));

        assert!(inbox.read_snapshot(TableLabel::A)?.is_none());
        assert!(inbox.read_archive(TableLabel::A, 2024)?.is_none());

        inbox.deposit_snapshot(TableLabel::A, b"first")?;
        inbox.deposit_snapshot(TableLabel::A, b"second")?;
        inbox.deposit_archive(TableLabel::A, 2024, b"archive")?;

        assert_eq!(inbox.read_snapshot(TableLabel::A)?, Some(b"second".to_vec()));
        assert_eq!(
            inbox.read_archive(TableLabel::A, 2024)?,
            Some(b"archive".to_vec())
        );
        assert!(inbox.read_snapshot(TableLabel::B)?.is_none());

        // No temporary files are left behind
        let leftovers = fs::read_dir(inbox.root())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "part"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }
}
