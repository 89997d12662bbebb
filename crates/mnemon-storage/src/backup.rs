//! Pre-migration backups via the SQLite backup API, with flat retention.
//! Safe for WAL-mode databases; readers are not blocked.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use tracing::{info, warn};

use mnemon_core::errors::StorageError;

const BACKUP_INFIX: &str = ".bak-v";

/// Copy the live database to `<db>.bak-v<version>-<ts>` before a schema
/// migration, then prune the oldest backups beyond `max_backups`.
pub fn backup_before_migration(
    source: &Connection,
    db_path: &Path,
    from_version: u32,
    max_backups: usize,
) -> Result<PathBuf, StorageError> {
    let ts = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let file_name = format!(
        "{}{}{}-{}",
        db_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("memory.db"),
        BACKUP_INFIX,
        from_version,
        ts
    );
    let backup_path = db_path.with_file_name(file_name);

    let mut dest = Connection::open_with_flags(
        &backup_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )?;
    {
        let backup = Backup::new(source, &mut dest)
            .map_err(|e| StorageError::BackupFailed(e.to_string()))?;
        backup
            .run_to_completion(64, Duration::from_millis(10), None)
            .map_err(|e| StorageError::BackupFailed(e.to_string()))?;
    }
    info!("backed up database to {}", backup_path.display());

    prune_backups(db_path, max_backups)?;
    Ok(backup_path)
}

/// Remove the oldest backups so at most `max_backups` remain. Backup
/// names embed a sortable timestamp, so lexicographic order is age order.
pub fn prune_backups(db_path: &Path, max_backups: usize) -> Result<usize, StorageError> {
    let Some(dir) = db_path.parent() else {
        return Ok(0);
    };
    let prefix = format!(
        "{}{}",
        db_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("memory.db"),
        BACKUP_INFIX
    );

    let mut backups: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();

    if backups.len() <= max_backups {
        return Ok(0);
    }

    backups.sort();
    let excess = backups.len() - max_backups;
    let mut removed = 0;
    for path in backups.into_iter().take(excess) {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("failed to prune backup {}: {e}", path.display()),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("memory.db");
        for i in 0..7 {
            std::fs::write(
                dir.path().join(format!("memory.db.bak-v1-2026010100000{i}")),
                b"x",
            )
            .unwrap();
        }
        let removed = prune_backups(&db_path, 5).unwrap();
        assert_eq!(removed, 2);
        let remaining: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().into_string().unwrap())
            .filter(|n| n.contains(".bak-v"))
            .collect();
        assert_eq!(remaining.len(), 5);
        assert!(!remaining.contains(&"memory.db.bak-v1-20260101000000".to_string()));
        assert!(!remaining.contains(&"memory.db.bak-v1-20260101000001".to_string()));
    }
}
