//! Streaming artifact downloads.
//!
//! Bodies are written chunk by chunk, so memory use is bounded regardless of
//! artifact size. A download observes a total timeout (set on the client)
//! and a [`CancellationToken`].

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Emit a progress line every this many bytes.
const PROGRESS_STEP: u64 = 8 * 1024 * 1024;

/// Progress information during a download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes expected (if known from Content-Length header).
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_downloaded,
            total_bytes,
        }
    }

    /// Completed fraction in `[0.0, 1.0]`, or `None` if the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                1.0
            } else {
                (self.bytes_downloaded as f64 / total as f64).min(1.0)
            }
        })
    }
}

/// HTTP(S) client for tool artifacts.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Build a client with a total per-request timeout and a connect timeout.
    pub fn new(timeout: Duration, connect_timeout: Duration) -> tc_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(concat!("trendclip/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| tc_core::Error::tool("http", format!("failed to build client: {e}")))?;
        Ok(Self { client })
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// `tool` only labels errors and log lines. `progress_cb` is called once
    /// before the first chunk and after every chunk written.
    ///
    /// # Errors
    ///
    /// - [`tc_core::Error::DownloadFailed`] on network failure, a non-2xx
    ///   status, or a body shorter than the advertised `Content-Length`.
    /// - [`tc_core::Error::Cancelled`] if `cancel` fires first.
    /// - [`tc_core::Error::Io`] if `dest` cannot be written.
    pub async fn fetch<F>(
        &self,
        tool: &str,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        progress_cb: F,
    ) -> tc_core::Result<u64>
    where
        F: Fn(DownloadProgress) + Send + Sync,
    {
        tokio::select! {
            r = self.fetch_inner(tool, url, dest, &progress_cb) => r,
            _ = cancel.cancelled() => Err(tc_core::Error::Cancelled(format!(
                "download of {tool} was cancelled"
            ))),
        }
    }

    async fn fetch_inner<F>(
        &self,
        tool: &str,
        url: &str,
        dest: &Path,
        progress_cb: &F,
    ) -> tc_core::Result<u64>
    where
        F: Fn(DownloadProgress) + Send + Sync,
    {
        tracing::info!("Downloading {tool} from {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| tc_core::Error::download(tool, format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(tc_core::Error::download(
                tool,
                format!("HTTP {status} from {url}"),
            ));
        }

        let total = response.content_length();
        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut next_report = PROGRESS_STEP;
        progress_cb(DownloadProgress::new(0, total));

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| tc_core::Error::download(tool, format!("error reading body: {e}")))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            let progress = DownloadProgress::new(downloaded, total);
            progress_cb(progress);
            if downloaded >= next_report {
                match progress.fraction() {
                    Some(f) => tracing::debug!("{tool}: {:.0}% ({downloaded} bytes)", f * 100.0),
                    None => tracing::debug!("{tool}: {downloaded} bytes"),
                }
                next_report += PROGRESS_STEP;
            }
        }

        file.flush().await?;

        if let Some(expected) = total {
            if downloaded != expected {
                return Err(tc_core::Error::download(
                    tool,
                    format!("truncated body: expected {expected} bytes, got {downloaded}"),
                ));
            }
        }

        tracing::info!("Downloaded {tool}: {downloaded} bytes");
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader() -> Downloader {
        Downloader::new(Duration::from_secs(10), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn progress_fraction() {
        assert_eq!(DownloadProgress::new(50, Some(200)).fraction(), Some(0.25));
        assert_eq!(DownloadProgress::new(300, Some(200)).fraction(), Some(1.0));
        assert_eq!(DownloadProgress::new(50, None).fraction(), None);
        assert_eq!(DownloadProgress::new(0, Some(0)).fraction(), Some(1.0));
    }

    #[tokio::test]
    async fn fetch_writes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tool.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool.bin");
        let n = downloader()
            .fetch(
                "fake",
                &format!("{}/tool.bin", server.uri()),
                &dest,
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(n, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn fetch_non_success_is_download_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = downloader()
            .fetch(
                "fake",
                &format!("{}/missing", server.uri()),
                &dir.path().join("x"),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, tc_core::Error::DownloadFailed { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn fetch_honours_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        token.cancel();
        let dir = tempfile::tempdir().unwrap();
        let err = downloader()
            .fetch("fake", &server.uri(), &dir.path().join("x"), &token, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, tc_core::Error::Cancelled(_)));
    }

    #[tokio::test]
    async fn fetch_unreachable_host() {
        let dir = tempfile::tempdir().unwrap();
        let err = downloader()
            .fetch(
                "fake",
                "http://127.0.0.1:9/nothing-listens-here",
                &dir.path().join("x"),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, tc_core::Error::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn fetch_reports_progress_fractions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 256 * 1024]))
            .mount(&server)
            .await;

        let seen = std::sync::Mutex::new(Vec::new());
        let dir = tempfile::tempdir().unwrap();
        downloader()
            .fetch(
                "fake",
                &format!("{}/big.bin", server.uri()),
                &dir.path().join("big.bin"),
                &CancellationToken::new(),
                |p| seen.lock().unwrap().push(p),
            )
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.len() >= 2, "{seen:?}");
        assert_eq!(seen.first().unwrap().fraction(), Some(0.0));
        assert_eq!(seen.last().unwrap().fraction(), Some(1.0));
        assert_eq!(seen.last().unwrap().bytes_downloaded, 256 * 1024);
        assert!(seen
            .windows(2)
            .all(|w| w[0].bytes_downloaded <= w[1].bytes_downloaded));
    }
}
