use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::archive::{ArchiveError, extract_zip, sha256_file};
use crate::backup::{BACKUPS_DIR, BackupError, BackupMode, backup};
use crate::catalog::VERSION_MARKER_FILE;
use crate::download::{CancelFlag, DownloadError, DownloadSession, file_name_from_url};
use crate::launch::GAME_JAR;
use crate::version::VersionEntry;

const UPDATE_LOCK_FILE: &str = ".update.lock";

/// Progress share of each pipeline stage, in order.
const BACKUP_END: f32 = 0.10;
const DOWNLOAD_END: f32 = 0.75;
const APPLY_END: f32 = 0.95;

/// Update pipeline state. `Finished` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Idle,
    BackingUp,
    Downloading,
    Applying,
    Verifying,
    Finished,
    Error,
}

impl UpdateStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::BackingUp => write!(f, "backing up"),
            Self::Downloading => write!(f, "downloading"),
            Self::Applying => write!(f, "applying"),
            Self::Verifying => write!(f, "verifying"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Read-only snapshot of the running session, sent with every progress
/// event. Only the update worker writes session state; consumers see it
/// exclusively through these messages.
#[derive(Debug, Clone)]
pub struct UpdateProgress {
    pub status: UpdateStatus,
    pub fraction: f32,
    pub current_file: String,
    pub bytes_downloaded: u64,
    pub bytes_total: u64,
    pub speed_bps: u64,
}

/// Events emitted by one update session: any number of `Progress` messages
/// followed by exactly one terminal `Finished` or `Failed`.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    Progress(UpdateProgress),
    Finished,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("an update is already running for {0}")]
    Busy(PathBuf),
    #[error("backup failed: {0}")]
    Backup(#[from] BackupError),
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("archive handling failed: {0}")]
    Archive(#[from] ArchiveError),
    #[error("update archive checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("verification failed: {0}")]
    Verify(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl UpdateError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Handle to a running update session.
pub struct UpdateHandle {
    events: mpsc::UnboundedReceiver<UpdateEvent>,
    cancel: CancelFlag,
}

impl UpdateHandle {
    /// Next event, or `None` once the worker has finished and the terminal
    /// event was consumed.
    pub async fn recv(&mut self) -> Option<UpdateEvent> {
        self.events.recv().await
    }

    /// Request cooperative cancellation; the session stops between chunks
    /// and reports a terminal `Failed` event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Coordinates backup, download, apply, and verify for one install
/// directory, enforcing single-flight per directory.
pub struct UpdateOrchestrator {
    client: reqwest::Client,
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

impl UpdateOrchestrator {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start an update session for `target` in `install_dir`.
    ///
    /// # Errors
    /// Returns [`UpdateError::Busy`] when a session for the same install
    /// directory is still in a non-terminal state (including one held by
    /// another launcher process, via the advisory lock file), or an I/O
    /// error when the install directory or lock file cannot be prepared.
    pub fn start(
        &self,
        target: &VersionEntry,
        mode: BackupMode,
        install_dir: &Path,
    ) -> Result<UpdateHandle, UpdateError> {
        std::fs::create_dir_all(install_dir)
            .map_err(|e| UpdateError::io("failed to create install directory", e))?;
        let key = install_dir
            .canonicalize()
            .unwrap_or_else(|_| install_dir.to_path_buf());

        {
            let mut active = self
                .active
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !active.insert(key.clone()) {
                return Err(UpdateError::Busy(key));
            }
        }
        let guard = ActiveGuard {
            active: Arc::clone(&self.active),
            key: key.clone(),
        };

        let lock_file = match acquire_update_lock(install_dir) {
            Ok(file) => file,
            Err(error) => {
                drop(guard);
                return Err(error);
            }
        };

        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancelFlag::new();
        let session = UpdateTask {
            client: self.client.clone(),
            target: target.clone(),
            mode,
            install_dir: install_dir.to_path_buf(),
            tx,
            cancel: cancel.clone(),
        };

        tokio::spawn(async move {
            let _guard = guard;
            let _lock = lock_file;
            session.run().await;
        });

        Ok(UpdateHandle { events, cancel })
    }
}

struct ActiveGuard {
    active: Arc<Mutex<HashSet<PathBuf>>>,
    key: PathBuf,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.key);
    }
}

fn acquire_update_lock(install_dir: &Path) -> Result<std::fs::File, UpdateError> {
    let lock_path = install_dir.join(UPDATE_LOCK_FILE);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| UpdateError::io("failed to open update lock file", e))?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
            Err(UpdateError::Busy(install_dir.to_path_buf()))
        }
        Err(error) => Err(UpdateError::io("failed to acquire update lock", error)),
    }
}

struct UpdateTask {
    client: reqwest::Client,
    target: VersionEntry,
    mode: BackupMode,
    install_dir: PathBuf,
    tx: mpsc::UnboundedSender<UpdateEvent>,
    cancel: CancelFlag,
}

impl UpdateTask {
    async fn run(self) {
        info!(
            "Starting update to {} in {}",
            self.target,
            self.install_dir.display()
        );
        match self.run_pipeline().await {
            Ok(()) => {
                info!("Update to {} finished", self.target);
                let _ = self.tx.send(UpdateEvent::Finished);
            }
            Err(e) => {
                error!("Update to {} failed: {e}", self.target);
                let _ = self.tx.send(UpdateEvent::Failed(e.to_string()));
            }
        }
    }

    fn emit(&self, status: UpdateStatus, fraction: f32, current_file: &str) {
        let _ = self.tx.send(UpdateEvent::Progress(UpdateProgress {
            status,
            fraction,
            current_file: current_file.to_string(),
            bytes_downloaded: 0,
            bytes_total: 0,
            speed_bps: 0,
        }));
    }

    fn check_cancelled(&self) -> Result<(), UpdateError> {
        if self.cancel.is_cancelled() {
            Err(DownloadError::Cancelled.into())
        } else {
            Ok(())
        }
    }

    async fn run_pipeline(&self) -> Result<(), UpdateError> {
        self.run_backup().await?;
        self.check_cancelled()?;

        let staging = tempfile::Builder::new()
            .prefix(".update-")
            .tempdir_in(&self.install_dir)
            .map_err(|e| UpdateError::io("failed to create update staging directory", e))?;

        let archive_path = self.run_download(staging.path()).await?;
        self.check_cancelled()?;

        self.verify_archive_checksum(&archive_path).await?;
        self.run_apply(staging.path(), &archive_path).await?;
        self.run_verify()
    }

    async fn run_backup(&self) -> Result<(), UpdateError> {
        if self.mode == BackupMode::None {
            debug!("Skipping backup stage");
            return Ok(());
        }

        self.emit(UpdateStatus::BackingUp, 0.0, "");
        let install_dir = self.install_dir.clone();
        let mode = self.mode;
        let created = tokio::task::spawn_blocking(move || backup(&install_dir, mode))
            .await
            .map_err(|e| UpdateError::io("backup task failed", std::io::Error::other(e)))??;
        if let Some(path) = created {
            info!("Pre-update backup at {}", path.display());
        }
        self.emit(UpdateStatus::BackingUp, BACKUP_END, "");
        Ok(())
    }

    async fn run_download(&self, staging: &Path) -> Result<PathBuf, UpdateError> {
        let archive_path = staging.join(file_name_from_url(&self.target.url));
        self.emit(UpdateStatus::Downloading, BACKUP_END, "");

        let session = DownloadSession::new(self.client.clone(), self.cancel.clone());
        let tx = self.tx.clone();
        session
            .fetch(&self.target.url, &archive_path, move |progress| {
                let ratio = if progress.bytes_total > 0 {
                    progress.bytes_downloaded as f32 / progress.bytes_total as f32
                } else {
                    0.0
                };
                let _ = tx.send(UpdateEvent::Progress(UpdateProgress {
                    status: UpdateStatus::Downloading,
                    fraction: BACKUP_END + (DOWNLOAD_END - BACKUP_END) * ratio.clamp(0.0, 1.0),
                    current_file: progress.current_file,
                    bytes_downloaded: progress.bytes_downloaded,
                    bytes_total: progress.bytes_total,
                    speed_bps: progress.speed_bps,
                }));
            })
            .await?;

        Ok(archive_path)
    }

    async fn verify_archive_checksum(&self, archive_path: &Path) -> Result<(), UpdateError> {
        let Some(expected) = self.target.checksum.clone() else {
            return Ok(());
        };

        let path = archive_path.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || sha256_file(&path))
            .await
            .map_err(|e| UpdateError::io("checksum task failed", std::io::Error::other(e)))??;

        if actual.eq_ignore_ascii_case(&expected) {
            debug!("Update archive checksum verified");
            Ok(())
        } else {
            Err(UpdateError::ChecksumMismatch { expected, actual })
        }
    }

    /// Extract into a staging subdirectory first, then move entries into
    /// place, so a failed extraction never leaves the install half-written.
    /// A failure after the first rename can still leave a mixed install;
    /// the backup from the first stage is the recovery path for that.
    async fn run_apply(&self, staging: &Path, archive_path: &Path) -> Result<(), UpdateError> {
        self.emit(UpdateStatus::Applying, DOWNLOAD_END, "");

        let extracted = staging.join("extracted");
        std::fs::create_dir_all(&extracted)
            .map_err(|e| UpdateError::io("failed to create extraction directory", e))?;

        let archive = archive_path.to_path_buf();
        let dest = extracted.clone();
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            extract_zip(&archive, &dest, |name| {
                let _ = tx.send(UpdateEvent::Progress(UpdateProgress {
                    status: UpdateStatus::Applying,
                    fraction: DOWNLOAD_END,
                    current_file: name.to_string(),
                    bytes_downloaded: 0,
                    bytes_total: 0,
                    speed_bps: 0,
                }));
            })
        })
        .await
        .map_err(|e| UpdateError::io("apply task failed", std::io::Error::other(e)))??;

        for entry in std::fs::read_dir(&extracted)
            .map_err(|e| UpdateError::io("failed to read extracted update", e))?
        {
            let entry = entry.map_err(|e| UpdateError::io("failed to read extracted entry", e))?;
            let name = entry.file_name();
            if name == BACKUPS_DIR {
                warn!("Update archive contains a backups directory, skipping it");
                continue;
            }
            let target = self.install_dir.join(&name);
            if target.is_dir() {
                std::fs::remove_dir_all(&target)
                    .map_err(|e| UpdateError::io("failed to replace existing directory", e))?;
            } else if target.exists() {
                std::fs::remove_file(&target)
                    .map_err(|e| UpdateError::io("failed to replace existing file", e))?;
            }
            std::fs::rename(entry.path(), &target)
                .map_err(|e| UpdateError::io("failed to move update into place", e))?;
        }

        std::fs::write(
            self.install_dir.join(VERSION_MARKER_FILE),
            format!("{}#{}", self.target.version, self.target.build),
        )
        .map_err(|e| UpdateError::io("failed to write version marker", e))?;

        self.emit(UpdateStatus::Applying, APPLY_END, "");
        Ok(())
    }

    fn run_verify(&self) -> Result<(), UpdateError> {
        self.emit(UpdateStatus::Verifying, APPLY_END, GAME_JAR);

        if !self.install_dir.join(GAME_JAR).exists() {
            return Err(UpdateError::Verify(format!(
                "{GAME_JAR} missing after apply"
            )));
        }

        let expected = format!("{}#{}", self.target.version, self.target.build);
        match crate::catalog::read_version_marker(&self.install_dir) {
            Some(marker) if marker == expected => {}
            Some(marker) => {
                return Err(UpdateError::Verify(format!(
                    "version marker reads {marker}, expected {expected}"
                )));
            }
            None => {
                return Err(UpdateError::Verify(
                    "version marker missing after apply".to_string(),
                ));
            }
        }

        self.emit(UpdateStatus::Verifying, 1.0, "");
        Ok(())
    }
}
