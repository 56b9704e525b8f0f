use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

/// Directories holding persistent game state; the Database backup mode
/// archives exactly this subset of the install tree.
pub const DATABASE_SUBSET: &[&str] = &["database", "saves"];

/// Backups land in this directory under the install dir; it is never
/// itself included in a backup archive.
pub const BACKUPS_DIR: &str = "backups";

/// Scope of pre-update archival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupMode {
    None,
    #[default]
    Database,
    Everything,
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("install directory {0} does not exist")]
    MissingInstallDir(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
}

impl BackupError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }
}

/// Archive the selected subset of the install directory before an update.
///
/// Returns the created archive path, or `None` for [`BackupMode::None`].
/// This must finish before any destructive apply step; the archive it
/// produces is the caller's recovery path if the update later fails.
///
/// # Errors
/// Returns an error if the install directory is missing or the archive
/// cannot be written. Nothing has been modified when this fails.
pub fn backup(install_dir: &Path, mode: BackupMode) -> Result<Option<PathBuf>, BackupError> {
    if mode == BackupMode::None {
        debug!("Backup mode is none, skipping");
        return Ok(None);
    }

    if !install_dir.is_dir() {
        return Err(BackupError::MissingInstallDir(install_dir.to_path_buf()));
    }

    let backups_dir = install_dir.join(BACKUPS_DIR);
    std::fs::create_dir_all(&backups_dir)
        .map_err(|e| BackupError::io("failed to create backups directory", e))?;

    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let archive_path = backups_dir.join(format!("backup-{stamp}.zip"));

    let file = std::fs::File::create(&archive_path)
        .map_err(|e| BackupError::io("failed to create backup archive", e))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    match mode {
        BackupMode::None => unreachable!("handled above"),
        BackupMode::Database => {
            for name in DATABASE_SUBSET {
                let dir = install_dir.join(name);
                if dir.is_dir() {
                    add_dir_recursive(&mut writer, options, install_dir, &dir)?;
                } else {
                    debug!("Database subset directory {name} absent, skipping");
                }
            }
        }
        BackupMode::Everything => {
            for entry in std::fs::read_dir(install_dir)
                .map_err(|e| BackupError::io("failed to read install directory", e))?
            {
                let entry =
                    entry.map_err(|e| BackupError::io("failed to read install dir entry", e))?;
                let path = entry.path();
                if entry.file_name() == BACKUPS_DIR {
                    continue;
                }
                if path.is_dir() {
                    add_dir_recursive(&mut writer, options, install_dir, &path)?;
                } else {
                    add_file(&mut writer, options, install_dir, &path)?;
                }
            }
        }
    }

    writer
        .finish()
        .map_err(|e| BackupError::zip("failed to finalize backup archive", e))?;

    info!("Backup written to {}", archive_path.display());
    Ok(Some(archive_path))
}

fn add_dir_recursive(
    writer: &mut zip::ZipWriter<std::fs::File>,
    options: zip::write::SimpleFileOptions,
    root: &Path,
    dir: &Path,
) -> Result<(), BackupError> {
    for entry in
        std::fs::read_dir(dir).map_err(|e| BackupError::io("failed to read backup directory", e))?
    {
        let entry = entry.map_err(|e| BackupError::io("failed to read backup dir entry", e))?;
        let path = entry.path();
        if path.is_dir() {
            add_dir_recursive(writer, options, root, &path)?;
        } else {
            add_file(writer, options, root, &path)?;
        }
    }
    Ok(())
}

fn add_file(
    writer: &mut zip::ZipWriter<std::fs::File>,
    options: zip::write::SimpleFileOptions,
    root: &Path,
    path: &Path,
) -> Result<(), BackupError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| BackupError::io("backup entry outside install dir", std::io::Error::other(path.display().to_string())))?;
    let name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    writer
        .start_file(&name, options)
        .map_err(|e| BackupError::zip("failed to start backup entry", e))?;

    let mut file =
        std::fs::File::open(path).map_err(|e| BackupError::io("failed to open backup source", e))?;
    let mut buffer = [0_u8; 8192];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| BackupError::io("failed to read backup source", e))?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .map_err(|e| BackupError::io("failed to write backup entry", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{BackupError, BackupMode, backup};

    fn populate_install_dir(root: &std::path::Path) {
        std::fs::create_dir_all(root.join("database")).expect("database dir should be created");
        std::fs::create_dir_all(root.join("saves/slot1")).expect("saves dir should be created");
        std::fs::write(root.join("database/world.db"), b"world").expect("db file written");
        std::fs::write(root.join("saves/slot1/save.dat"), b"save").expect("save file written");
        std::fs::write(root.join("Starfall.jar"), b"jar").expect("jar written");
    }

    fn archive_names(path: &std::path::Path) -> Vec<String> {
        let file = std::fs::File::open(path).expect("backup archive should open");
        let mut archive = zip::ZipArchive::new(file).expect("backup archive should parse");
        (0..archive.len())
            .map(|i| {
                archive
                    .by_index(i)
                    .expect("backup entry should read")
                    .name()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn none_mode_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let result = backup(temp.path(), BackupMode::None).expect("none mode should succeed");
        assert!(result.is_none());
        assert!(!temp.path().join("backups").exists());
    }

    #[test]
    fn database_mode_archives_only_game_state() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        populate_install_dir(temp.path());

        let archive = backup(temp.path(), BackupMode::Database)
            .expect("database backup should succeed")
            .expect("database backup should produce an archive");

        let names = archive_names(&archive);
        assert!(names.contains(&"database/world.db".to_string()));
        assert!(names.contains(&"saves/slot1/save.dat".to_string()));
        assert!(!names.iter().any(|n| n.contains("Starfall.jar")));
    }

    #[test]
    fn everything_mode_archives_whole_tree_except_backups() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        populate_install_dir(temp.path());
        std::fs::create_dir_all(temp.path().join("backups")).expect("backups dir created");
        std::fs::write(temp.path().join("backups/backup-old.zip"), b"old")
            .expect("old backup written");

        let archive = backup(temp.path(), BackupMode::Everything)
            .expect("full backup should succeed")
            .expect("full backup should produce an archive");

        let names = archive_names(&archive);
        assert!(names.contains(&"Starfall.jar".to_string()));
        assert!(names.contains(&"database/world.db".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("backups/")));
    }

    #[test]
    fn missing_install_dir_fails_without_side_effects() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let missing = temp.path().join("not-there");

        let result = backup(&missing, BackupMode::Everything);

        assert!(matches!(result, Err(BackupError::MissingInstallDir(_))));
        assert!(!missing.exists());
    }
}
