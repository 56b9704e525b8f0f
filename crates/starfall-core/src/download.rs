use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, info};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Minimum interval between progress callbacks; chunk arrival is far more
/// frequent than any consumer can usefully render.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Smoothing factor for the transfer-speed estimate.
const SPEED_ALPHA: f64 = 0.3;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} failed with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("download was cancelled")]
    Cancelled,
}

impl DownloadError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Cooperative cancellation flag shared between the worker and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Snapshot handed to progress callbacks.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub current_file: String,
    pub bytes_downloaded: u64,
    pub bytes_total: u64,
    pub speed_bps: u64,
}

/// Smoothed delta-bytes/delta-time speed estimate; raw per-chunk rates are
/// far too jittery to display.
pub(crate) struct SpeedEstimator {
    last_sample: Instant,
    last_bytes: u64,
    smoothed_bps: f64,
}

impl SpeedEstimator {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            last_sample: now,
            last_bytes: 0,
            smoothed_bps: 0.0,
        }
    }

    pub(crate) fn update(&mut self, total_bytes: u64, now: Instant) -> u64 {
        let elapsed = now.duration_since(self.last_sample).as_secs_f64();
        if elapsed > 0.0 {
            let delta = total_bytes.saturating_sub(self.last_bytes) as f64;
            let instant_bps = delta / elapsed;
            self.smoothed_bps = if self.smoothed_bps == 0.0 {
                instant_bps
            } else {
                SPEED_ALPHA * instant_bps + (1.0 - SPEED_ALPHA) * self.smoothed_bps
            };
            self.last_sample = now;
            self.last_bytes = total_bytes;
        }
        self.smoothed_bps as u64
    }
}

/// Rate limiter for progress callbacks.
pub(crate) struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    pub(crate) fn ready(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

/// Streams one remote file to disk with throttled progress reporting and
/// cooperative cancellation.
///
/// A cancelled or failed fetch may leave a partially written destination
/// file; cleanup is the caller's responsibility since downloads are staged
/// into a scratch directory anyway.
pub struct DownloadSession {
    client: reqwest::Client,
    cancel: CancelFlag,
}

impl DownloadSession {
    #[must_use]
    pub fn new(client: reqwest::Client, cancel: CancelFlag) -> Self {
        Self { client, cancel }
    }

    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Stream `url` into `dest`, invoking `on_progress` at a bounded rate.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    /// Returns an error when the request fails, the server responds with a
    /// non-success status, a disk write fails, or the session is cancelled.
    pub async fn fetch<F>(
        &self,
        url: &str,
        dest: &Path,
        mut on_progress: F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(TransferProgress),
    {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let file_name = file_name_from_url(url);
        debug!("Fetching {url} -> {}", dest.display());

        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|source| DownloadError::Request {
                    url: url.to_string(),
                    source,
                })?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let bytes_total = response.content_length().unwrap_or(0);
        let mut bytes_downloaded: u64 = 0;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| DownloadError::io("failed to create download file", e))?;

        let mut speed = SpeedEstimator::new(Instant::now());
        let mut throttle = ProgressThrottle::new(PROGRESS_INTERVAL);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let chunk = chunk.map_err(|source| DownloadError::Request {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io("failed to write download data", e))?;
            bytes_downloaded += chunk.len() as u64;

            let now = Instant::now();
            if throttle.ready(now) {
                on_progress(TransferProgress {
                    current_file: file_name.clone(),
                    bytes_downloaded,
                    bytes_total,
                    speed_bps: speed.update(bytes_downloaded, now),
                });
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::io("failed to flush download file", e))?;

        // Final callback so consumers always see the completed byte count.
        on_progress(TransferProgress {
            current_file: file_name,
            bytes_downloaded,
            bytes_total,
            speed_bps: speed.update(bytes_downloaded, Instant::now()),
        });

        info!("Download complete: {bytes_downloaded} bytes from {url}");
        Ok(bytes_downloaded)
    }
}

pub(crate) fn file_name_from_url(url: &str) -> String {
    let raw = url.rsplit('/').next().unwrap_or(url);
    let name = Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && !n.contains(".."))
        .unwrap_or("download");
    name.to_string()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{
        CancelFlag, DownloadError, DownloadSession, ProgressThrottle, SpeedEstimator,
        file_name_from_url,
    };

    #[test]
    fn speed_estimate_smooths_between_samples() {
        let start = Instant::now();
        let mut estimator = SpeedEstimator::new(start);

        // 1 MiB over one second, then a 4 MiB/s burst.
        let first = estimator.update(1_048_576, start + Duration::from_secs(1));
        let second = estimator.update(5_242_880, start + Duration::from_secs(2));

        assert_eq!(first, 1_048_576);
        assert!(second > first, "speed should rise after a faster sample");
        assert!(
            second < 4 * 1_048_576,
            "smoothed speed must lag the instantaneous burst"
        );
    }

    #[test]
    fn throttle_suppresses_rapid_callbacks() {
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(Duration::from_millis(250));

        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_millis(10)));
        assert!(!throttle.ready(start + Duration::from_millis(249)));
        assert!(throttle.ready(start + Duration::from_millis(251)));
    }

    #[test]
    fn file_name_from_url_strips_path_and_rejects_traversal() {
        assert_eq!(
            file_name_from_url("https://files.example.net/build/starfall-build_2023.zip"),
            "starfall-build_2023.zip"
        );
        assert_eq!(file_name_from_url("https://files.example.net/"), "download");
        assert_eq!(file_name_from_url("https://x/.."), "download");
    }

    #[tokio::test]
    async fn fetch_honors_pre_set_cancel_flag() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let session = DownloadSession::new(reqwest::Client::new(), cancel);
        let temp = tempfile::tempdir().expect("tempdir should be created");

        let result = session
            .fetch(
                "http://127.0.0.1:1/never-reached.zip",
                &temp.path().join("out.zip"),
                |_| {},
            )
            .await;

        assert!(matches!(result, Err(DownloadError::Cancelled)));
    }

    #[tokio::test]
    async fn fetch_reports_unreachable_host_as_request_error() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .expect("client should build");
        let session = DownloadSession::new(client, CancelFlag::new());
        let temp = tempfile::tempdir().expect("tempdir should be created");

        let result = session
            .fetch(
                "http://127.0.0.1:1/refused.zip",
                &temp.path().join("out.zip"),
                |_| {},
            )
            .await;

        assert!(matches!(result, Err(DownloadError::Request { .. })));
    }
}
