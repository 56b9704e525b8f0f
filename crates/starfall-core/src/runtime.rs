use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use starfall_platform::OsFamily;

use crate::archive::{ArchiveError, extract_zip};
use crate::download::{CancelFlag, DownloadError, DownloadSession};

const RUNTIME_BASE_URL: &str = "https://files.starfall-game.net/runtimes";

/// Module export/open flags the modern runtime needs for the game's
/// reflection-based subsystems (networking, serialization, hot reload).
pub const MODERN_RUNTIME_FLAGS: &[&str] = &[
    "--add-exports=java.base/jdk.internal.ref=ALL-UNNAMED",
    "--add-exports=java.base/sun.nio.ch=ALL-UNNAMED",
    "--add-exports=jdk.unsupported/sun.misc=ALL-UNNAMED",
    "--add-exports=jdk.compiler/com.sun.tools.javac.file=ALL-UNNAMED",
    "--add-opens=jdk.compiler/com.sun.tools.javac=ALL-UNNAMED",
    "--add-opens=java.base/sun.nio.ch=ALL-UNNAMED",
    "--add-opens=java.base/java.lang=ALL-UNNAMED",
    "--add-opens=java.base/java.lang.reflect=ALL-UNNAMED",
    "--add-opens=java.base/java.io=ALL-UNNAMED",
    "--add-opens=java.base/java.util=ALL-UNNAMED",
];

/// Compatibility flag old game builds need on the legacy runtime.
pub const LEGACY_RUNTIME_FLAGS: &[&str] = &["--illegal-access=permit"];

/// Which bundled runtime a game version requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Legacy,
    Modern,
}

impl RuntimeKind {
    /// Versions from the `0.1`/`0.2` era predate the module system and must
    /// run on the legacy runtime.
    #[must_use]
    pub fn for_version(version: &str) -> Self {
        if version.starts_with("0.1") || version.starts_with("0.2") {
            Self::Legacy
        } else {
            Self::Modern
        }
    }

    #[must_use]
    pub fn major(self) -> u32 {
        match self {
            Self::Legacy => 8,
            Self::Modern => 18,
        }
    }

    #[must_use]
    pub fn process_flags(self) -> &'static [&'static str] {
        match self {
            Self::Legacy => LEGACY_RUNTIME_FLAGS,
            Self::Modern => MODERN_RUNTIME_FLAGS,
        }
    }
}

/// A concrete runtime variant to provision: where to get it, where it lands
/// inside the install directory, and which process flags it requires.
#[derive(Debug, Clone)]
pub struct RuntimeSpec {
    pub kind: RuntimeKind,
    pub download_url: String,
    /// Runtime executable, relative to the install directory.
    pub executable: PathBuf,
    pub flags: &'static [&'static str],
}

impl RuntimeSpec {
    #[must_use]
    pub fn select(version: &str, os: OsFamily) -> Self {
        let kind = RuntimeKind::for_version(version);
        Self::for_kind(kind, os)
    }

    #[must_use]
    pub fn for_kind(kind: RuntimeKind, os: OsFamily) -> Self {
        let major = kind.major();
        Self {
            kind,
            download_url: format!(
                "{RUNTIME_BASE_URL}/jre{major}-{}.zip",
                os.archive_token()
            ),
            executable: os.runtime_executable(major),
            flags: kind.process_flags(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to download runtime archive: {0}")]
    Download(#[from] DownloadError),
    #[error("failed to unpack runtime archive: {0}")]
    Unpack(#[from] ArchiveError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Downloads and unpacks bundled runtimes under the install directory.
pub struct RuntimeProvisioner {
    client: reqwest::Client,
}

impl RuntimeProvisioner {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Resolved path of the runtime executable for an install directory.
    #[must_use]
    pub fn runtime_path(install_dir: &Path, spec: &RuntimeSpec) -> PathBuf {
        install_dir.join(&spec.executable)
    }

    /// Ensure the runtime described by `spec` is present, downloading and
    /// unpacking it when absent. Idempotent: an existing runtime path makes
    /// this a no-op.
    ///
    /// # Errors
    /// Returns an error when the download or unpack fails.
    pub async fn ensure(&self, spec: &RuntimeSpec, install_dir: &Path) -> Result<(), RuntimeError> {
        let executable = Self::runtime_path(install_dir, spec);
        if executable.exists() {
            debug!("Runtime already present at {}", executable.display());
            return Ok(());
        }

        info!(
            "Provisioning {:?} runtime from {}",
            spec.kind, spec.download_url
        );

        let staging = tempfile::tempdir_in(install_dir)
            .map_err(|e| RuntimeError::Io {
                context: "failed to create runtime staging directory",
                source: e,
            })?;
        let archive_path = staging.path().join("runtime.zip");

        let session = DownloadSession::new(self.client.clone(), CancelFlag::new());
        session
            .fetch(&spec.download_url, &archive_path, |_| {})
            .await?;

        let install_dir = install_dir.to_path_buf();
        let dest = install_dir.clone();
        tokio::task::spawn_blocking(move || extract_zip(&archive_path, &dest, |_| {}))
            .await
            .map_err(|e| RuntimeError::Io {
                context: "runtime unpack task failed",
                source: std::io::Error::other(e),
            })??;

        info!("Runtime unpacked under {}", install_dir.display());
        Ok(())
    }
}
