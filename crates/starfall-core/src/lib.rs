//! Core update-and-launch engine for the Starfall launcher.
//!
//! This crate provides the launcher logic that is independent of any user
//! interface:
//! - Remote version index fetching and recency ordering per branch.
//! - Pre-update backups of persistent game state.
//! - Streaming build downloads with progress, cancellation, and staged apply.
//! - Bundled Java runtime provisioning.
//! - Launch command assembly for client and dedicated-server modes.

mod archive;
mod backup;
mod branch;
mod catalog;
mod download;
mod launch;
mod runtime;
mod settings;
mod update;
mod version;

/// Zip extraction and file digest helpers shared by updates and runtimes.
pub use archive::{ArchiveError, extract_zip, sha256_file};
/// Pre-update archival of game state.
pub use backup::{BACKUPS_DIR, BackupError, BackupMode, DATABASE_SUBSET, backup};
/// Release channels and their remote index locations.
pub use branch::{Branch, DEV_BUILD_CUTOFF_YEAR};
/// Remote version index client and installed-version resolution.
pub use catalog::{
    CatalogError, VERSION_MARKER_FILE, VersionCatalog, parse_index, read_version_marker,
    updater_user_agent,
};
/// Streaming file transfer with progress and cooperative cancellation.
pub use download::{CancelFlag, DownloadError, DownloadSession, TransferProgress};
/// Game process command assembly and spawning.
pub use launch::{
    GAME_JAR, LaunchCommand, LaunchCommandBuilder, LaunchError, game_jar_exists, validate_port,
};
/// Bundled Java runtime selection and provisioning.
pub use runtime::{
    LEGACY_RUNTIME_FLAGS, MODERN_RUNTIME_FLAGS, RuntimeError, RuntimeKind, RuntimeProvisioner,
    RuntimeSpec,
};
/// Persisted launcher settings.
pub use settings::{LaunchSettings, NO_VERSION};
/// Update pipeline orchestration with single-flight per install directory.
pub use update::{
    UpdateError, UpdateEvent, UpdateHandle, UpdateOrchestrator, UpdateProgress, UpdateStatus,
};
/// Version entries and recency comparison.
pub use version::{VersionEntry, cmp_numeric_versions};
