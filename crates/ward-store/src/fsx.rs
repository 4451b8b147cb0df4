//! Atomic filesystem primitives.
//!
//! Directory rename is the only mutation the store trusts to be atomic, so
//! every user-visible write funnels through one of three operations: an
//! atomic file write (write to `_tmp`, fsync, rename), a staged directory
//! commit (build in `_tmp`, rename into place), and an atomic directory
//! delete (rename into `_tmp`, then unlink at leisure). The rename is the
//! linearization point in all three.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Junk files ignored by every directory scan.
const IGNORED_FILES: [&str; 2] = [".DS_Store", "Thumbs.db"];

/// Outcome of committing a staged directory.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The final path already exists (for lock directories this means the
    /// lock is already taken)
    #[error("commit target already exists")]
    Collision,

    /// Any other filesystem failure
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn unique_name() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Writes `bytes` to `final_path` atomically: temp file inside `tmp_root`,
/// write, fsync, rename into place.
pub async fn write_buffer_to_file(
    final_path: &Path,
    tmp_root: &Path,
    bytes: &[u8],
) -> io::Result<()> {
    let tmp_path = tmp_root.join(unique_name());

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, final_path).await?;
    debug!(path = %final_path.display(), len = bytes.len(), "wrote file");
    Ok(())
}

/// A directory being built inside the staging area.
///
/// Dropped without committing, the staged tree is removed best-effort.
#[derive(Debug)]
pub struct StagedDir {
    path: PathBuf,
    committed: bool,
}

/// Creates a fresh staging directory inside `tmp_root`.
pub async fn stage_directory(tmp_root: &Path) -> io::Result<StagedDir> {
    let path = tmp_root.join(unique_name());
    tokio::fs::create_dir(&path).await?;
    Ok(StagedDir {
        path,
        committed: false,
    })
}

impl StagedDir {
    /// The staging path to build content under.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the staged directory into `final_path`.
    ///
    /// An existing, non-empty final path fails with [`CommitError::Collision`]
    /// (the OS reports `EEXIST`/`ENOTEMPTY`/`EPERM` depending on platform).
    pub async fn commit(mut self, final_path: &Path) -> Result<(), CommitError> {
        match tokio::fs::rename(&self.path, final_path).await {
            Ok(()) => {
                self.committed = true;
                debug!(path = %final_path.display(), "committed directory");
                Ok(())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::AlreadyExists
                        | io::ErrorKind::DirectoryNotEmpty
                        | io::ErrorKind::PermissionDenied
                ) =>
            {
                Err(CommitError::Collision)
            }
            Err(e) => Err(CommitError::Io(e)),
        }
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

/// Deletes a directory atomically: rename into `tmp_root`, then unlink the
/// tombstone. Observers see the directory vanish in one step even when it
/// has many entries.
pub async fn delete_directory(path: &Path, tmp_root: &Path) -> io::Result<()> {
    let tombstone = tmp_root.join(unique_name());
    tokio::fs::rename(path, &tombstone).await?;
    tokio::fs::remove_dir_all(&tombstone).await?;
    debug!(path = %path.display(), "deleted directory");
    Ok(())
}

/// One entry from a directory scan.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    /// File or directory name
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// Lists a directory, filtering platform junk files and non-UTF-8 names.
pub async fn scan_dir(path: &Path) -> io::Result<Vec<ScanEntry>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(path).await?;
    while let Some(entry) = reader.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            debug!(path = %path.display(), "skipping non-UTF-8 directory entry");
            continue;
        };
        if IGNORED_FILES.contains(&name.as_str()) {
            continue;
        }
        let is_dir = entry.file_type().await?.is_dir();
        entries.push(ScanEntry { name, is_dir });
    }
    Ok(entries)
}
