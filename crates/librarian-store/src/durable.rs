//! Directory durability helpers.
//!
//! A new directory entry is only durable once the directory containing it has
//! been fsynced. `create_dir_all` syncs nothing, so the sharded tree is built
//! one level at a time instead.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Flushes a directory's entries to stable storage.
pub fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Creates every missing directory of `relative` below `root`, fsyncing the
/// parent after each creation, and returns the full path.
///
/// Levels that already exist are left alone. A level created concurrently by
/// another upload counts as existing.
pub fn ensure_durable_dir(root: &Path, relative: &Path) -> io::Result<PathBuf> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        let parent = current.clone();
        current.push(component);
        match fs::create_dir(&current) {
            Ok(()) => {
                fsync_dir(&parent)?;
                debug!(dir = %current.display(), "created shard directory");
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && current.is_dir() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(current)
}
