// Audio fetcher for Diarization API
//
// Downloads the remote audio of a job into a uniquely named scratch file. The returned
// `ScratchFile` removes the file when dropped, so partial downloads are cleaned up on
// every error path as well.

use futures::StreamExt;
use log::{debug, info};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::file_utils::{unique_scratch_path, ScratchFile};

/// Audio download errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network failure, timeout, or an interrupted body
    #[error("Download request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Remote answered with a non-success status
    #[error("Download failed with HTTP status {0}")]
    Status(u16),
    /// Scratch file could not be written
    #[error("Failed to write scratch file: {0}")]
    Io(#[from] std::io::Error),
}

/// Streams remote audio into the scratch directory
#[derive(Clone)]
pub struct AudioFetcher {
    client: reqwest::Client,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl AudioFetcher {
    pub fn new(client: reqwest::Client, scratch_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            client,
            scratch_dir,
            timeout,
        }
    }

    /// Download `audio_url` into a fresh scratch file
    pub async fn fetch(&self, audio_url: &str) -> Result<ScratchFile, FetchError> {
        fs::create_dir_all(&self.scratch_dir).await?;
        let scratch = ScratchFile::new(unique_scratch_path(&self.scratch_dir, audio_url));

        debug!("Downloading {} to {}", audio_url, scratch.path().display());
        let response = self
            .client
            .get(audio_url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut file = File::create(scratch.path()).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            file.write_all(&bytes).await?;
            downloaded += bytes.len() as u64;
        }
        file.flush().await?;

        info!(
            "Downloaded {} bytes from {} to {}",
            downloaded,
            audio_url,
            scratch.path().display()
        );
        Ok(scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(dir: &TempDir) -> AudioFetcher {
        AudioFetcher::new(
            reqwest::Client::new(),
            dir.path().join("scratch"),
            Duration::from_secs(5),
        )
    }

    fn scratch_entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join("scratch"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_fetch_writes_body_to_scratch_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/session.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3 fake audio".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().expect("tempdir");
        let fetcher = fetcher(&dir);

        let scratch = fetcher
            .fetch(&format!("{}/session.mp3", server.uri()))
            .await
            .expect("fetch should succeed");

        assert_eq!(
            std::fs::read(scratch.path()).expect("read scratch"),
            b"ID3 fake audio"
        );
        assert_eq!(
            scratch.path().extension().and_then(|e| e.to_str()),
            Some("mp3")
        );
        assert_eq!(scratch_entries(&dir), 1);

        drop(scratch);
        assert_eq!(scratch_entries(&dir), 0);
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().expect("tempdir");
        let result = fetcher(&dir)
            .fetch(&format!("{}/missing.wav", server.uri()))
            .await;

        assert!(matches!(result, Err(FetchError::Status(404))));
        assert_eq!(scratch_entries(&dir), 0);
    }

    #[tokio::test]
    async fn test_fetch_reports_unreachable_host() {
        let dir = TempDir::new().expect("tempdir");
        // Nothing listens on port 9 of localhost
        let result = fetcher(&dir).fetch("http://127.0.0.1:9/audio.wav").await;

        assert!(matches!(result, Err(FetchError::Request(_))));
        assert_eq!(scratch_entries(&dir), 0);
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let dir = TempDir::new().expect("tempdir");
        let fetcher = AudioFetcher::new(
            reqwest::Client::new(),
            dir.path().join("scratch"),
            Duration::from_millis(100),
        );

        let result = fetcher.fetch(&format!("{}/slow.wav", server.uri())).await;
        match result {
            Err(FetchError::Request(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {:?}", other.map(|s| s.path().to_owned())),
        }
    }
}
