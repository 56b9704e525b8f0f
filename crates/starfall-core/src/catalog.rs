use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::branch::{Branch, DEV_BUILD_CUTOFF_YEAR};
use crate::settings::NO_VERSION;
use crate::version::VersionEntry;

const DEFAULT_INDEX_BASE: &str = "https://files.starfall-game.net";
const INDEX_TIMEOUT: Duration = Duration::from_secs(10);

/// Name of the plain-text marker file in the install directory holding the
/// installed `version#build`.
pub const VERSION_MARKER_FILE: &str = "version.txt";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to build catalog HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("failed to fetch {branch} index from {url}: {source}")]
    Request {
        branch: Branch,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{branch} index fetch failed with HTTP {status}")]
    HttpStatus {
        branch: Branch,
        status: reqwest::StatusCode,
    },
}

/// In-memory snapshot of all known versions per branch, newest first.
///
/// Each branch list is rebuilt wholesale by [`VersionCatalog::refresh`];
/// a failed refresh leaves the previous (possibly empty) list untouched, so
/// an offline launcher keeps working against stale data.
pub struct VersionCatalog {
    client: reqwest::Client,
    index_base: String,
    branches: HashMap<Branch, Vec<VersionEntry>>,
}

impl VersionCatalog {
    /// Create a catalog with the standard file-server base URL.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(INDEX_TIMEOUT)
            .connect_timeout(INDEX_TIMEOUT)
            .user_agent(updater_user_agent())
            .build()
            .map_err(CatalogError::ClientBuild)?;
        Ok(Self::with_client(client))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            index_base: DEFAULT_INDEX_BASE.to_string(),
            branches: HashMap::new(),
        }
    }

    /// Point the catalog at a mirror of the version index server.
    #[must_use]
    pub fn with_index_base(mut self, base: impl Into<String>) -> Self {
        self.index_base = base.into();
        self
    }

    /// Re-fetch one branch's version index and rebuild its list.
    ///
    /// Malformed index lines are skipped; only a whole-fetch failure is
    /// reported, and in that case the branch keeps its previous contents.
    ///
    /// # Errors
    /// Returns an error when the index request fails or the server responds
    /// with a non-success status. The caller should treat this as an offline
    /// condition, not a fatal one.
    pub async fn refresh(&mut self, branch: Branch) -> Result<(), CatalogError> {
        let url = format!("{}/{}", self.index_base, branch.index_path());

        let response = self.client.get(&url).send().await.map_err(|source| {
            CatalogError::Request {
                branch,
                url: url.clone(),
                source,
            }
        })?;

        if !response.status().is_success() {
            return Err(CatalogError::HttpStatus {
                branch,
                status: response.status(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| CatalogError::Request {
                branch,
                url,
                source,
            })?;

        let entries = parse_index(&body, branch);
        info!("Loaded {} {branch} versions", entries.len());
        self.branches.insert(branch, entries);
        Ok(())
    }

    /// Refresh every automatically-refreshed branch, returning the branches
    /// that could not be reached. An empty result means fully online.
    pub async fn refresh_all(&mut self) -> Vec<(Branch, CatalogError)> {
        let mut offline = Vec::new();
        for branch in Branch::ALL {
            if !branch.refreshed_automatically() {
                continue;
            }
            if let Err(error) = self.refresh(branch).await {
                warn!("Could not refresh {branch} index, keeping previous list: {error}");
                offline.push((branch, error));
            }
        }
        offline
    }

    /// All loaded entries for a branch, newest first.
    #[must_use]
    pub fn entries(&self, branch: Branch) -> &[VersionEntry] {
        self.branches.get(&branch).map_or(&[], Vec::as_slice)
    }

    /// Newest entry of a branch, if that branch has been loaded.
    #[must_use]
    pub fn latest(&self, branch: Branch) -> Option<&VersionEntry> {
        self.entries(branch).first()
    }

    /// Find an entry by exact version string within one branch.
    #[must_use]
    pub fn find(&self, branch: Branch, version: &str) -> Option<&VersionEntry> {
        self.entries(branch).iter().find(|e| e.version == version)
    }

    /// Resolve the installed version from the local marker file, falling
    /// back to the settings value, and finally to the latest release.
    ///
    /// Returns `None` only when no branch contains a match and the release
    /// branch is unloaded or empty.
    #[must_use]
    pub fn resolve_installed(
        &self,
        install_dir: &Path,
        settings_fallback: &str,
    ) -> Option<&VersionEntry> {
        let marker = read_version_marker(install_dir).or_else(|| {
            (settings_fallback != NO_VERSION && !settings_fallback.is_empty())
                .then(|| settings_fallback.to_string())
        });

        if let Some(marker) = marker {
            let version = marker.split('#').next().unwrap_or(&marker);
            for branch in Branch::ALL {
                if let Some(entry) = self.find(branch, version) {
                    return Some(entry);
                }
            }
            debug!("Installed version {version} not present in any loaded branch");
        }

        self.latest(Branch::Release)
    }

    #[cfg(test)]
    fn insert_for_test(&mut self, branch: Branch, entries: Vec<VersionEntry>) {
        self.branches.insert(branch, entries);
    }
}

/// User agent sent with every updater request.
#[must_use]
pub fn updater_user_agent() -> String {
    format!("Starfall-Updater_{}", env!("CARGO_PKG_VERSION"))
}

/// Read the `version#build` marker from the install directory.
#[must_use]
pub fn read_version_marker(install_dir: &Path) -> Option<String> {
    let text = std::fs::read_to_string(install_dir.join(VERSION_MARKER_FILE)).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Parse a whole index body into a newest-first entry list, skipping lines
/// that do not parse and applying the dev-branch build-year cutoff.
#[must_use]
pub fn parse_index(body: &str, branch: Branch) -> Vec<VersionEntry> {
    let mut entries: Vec<VersionEntry> = body
        .lines()
        .filter_map(|line| {
            let parsed = VersionEntry::parse_line(line, branch);
            if parsed.is_none() && !line.trim().is_empty() {
                debug!("Skipping malformed {branch} index line: {line:?}");
            }
            parsed
        })
        .collect();

    entries.sort_by(|a, b| b.cmp_recency(a));

    if branch == Branch::Dev {
        entries.retain(|entry| entry.build_year().is_some_and(|y| y >= DEV_BUILD_CUTOFF_YEAR));
    }

    entries
}
