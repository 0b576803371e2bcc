//! Discovery of node lock files under a data root.

use std::path::{Path, PathBuf};

use crate::error::{OrchestratorError, Result};

/// A lock file left by a running (or crashed) node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockFile {
    /// Path of the lock file.
    pub path: PathBuf,

    /// Process id from the first line.
    pub pid: u32,
}

/// Finds `<data_root>/<dir>/<lock_file_name>` for every immediate
/// subdirectory, sorted by path.
///
/// A missing data root yields an empty list.
pub async fn find_lock_files(data_root: &Path, lock_file_name: &str) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(data_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let candidate = entry.path().join(lock_file_name);
        if tokio::fs::try_exists(&candidate).await? {
            found.push(candidate);
        }
    }
    found.sort();
    Ok(found)
}

/// Reads the pid from the first line of a lock file.
pub async fn read_lock_file(path: &Path) -> Result<LockFile> {
    let content = tokio::fs::read_to_string(path).await?;
    let first = content.lines().next().map(str::trim).unwrap_or_default();

    let pid = first.parse::<u32>().map_err(|_| {
        OrchestratorError::lock_file(path, format!("expected a pid, found {:?}", first))
    })?;
    if pid == 0 {
        return Err(OrchestratorError::lock_file(path, "pid 0 is not a process"));
    }

    Ok(LockFile {
        path: path.to_path_buf(),
        pid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_lock_files() {
        let root = tempfile::tempdir().unwrap();
        for (dir, locked) in [("primary_-1", true), ("primary_0", true), ("log", false)] {
            let path = root.path().join(dir);
            std::fs::create_dir(&path).unwrap();
            if locked {
                std::fs::write(path.join("postmaster.pid"), "100\n/data\n").unwrap();
            }
        }
        // a stray file at the top level is ignored
        std::fs::write(root.path().join("postmaster.pid"), "1\n").unwrap();

        let found = find_lock_files(root.path(), "postmaster.pid").await.unwrap();
        assert_eq!(
            found,
            vec![
                root.path().join("primary_-1/postmaster.pid"),
                root.path().join("primary_0/postmaster.pid"),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let found = find_lock_files(&root.path().join("absent"), "postmaster.pid")
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_read_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postmaster.pid");

        std::fs::write(&path, " 4242 \n/home/gpadmin/pgdata\n12345\n").unwrap();
        assert_eq!(read_lock_file(&path).await.unwrap().pid, 4242);

        std::fs::write(&path, "not-a-pid\n").unwrap();
        let err = read_lock_file(&path).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::LockFile { .. }));

        std::fs::write(&path, "").unwrap();
        assert!(read_lock_file(&path).await.is_err());
    }
}
