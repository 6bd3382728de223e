//! HTTP client for the Mirage API.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use mirage_models::{content_type_for, ErrorResponse, UploadResponse, VideoData, VideoKind};

use crate::error::{ClientError, ClientResult};

/// Default server address.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5328";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, without a trailing slash
    pub base_url: String,
    /// Whole-request timeout; uploads include server-side processing
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            timeout: Duration::from_secs(3600),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("MIRAGE_SERVER_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("MIRAGE_CLIENT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            connect_timeout: defaults.connect_timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Mirage API client.
#[derive(Clone)]
pub struct MirageClient {
    http: Client,
    base_url: String,
}

impl MirageClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("mirage-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client for `base_url` with default timeouts.
    pub fn with_base_url(base_url: impl Into<String>) -> ClientResult<Self> {
        Self::new(ClientConfig::default().with_base_url(base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Playback URL of a stored file.
    pub fn video_url(&self, kind: VideoKind, filename: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.base_url,
            kind.route_segment(),
            urlencoding::encode(filename)
        )
    }

    /// Playback URL of a processed output.
    pub fn processed_url(&self, filename: &str) -> String {
        self.video_url(VideoKind::Processed, filename)
    }

    /// Upload a video as the `file` part and wait for processing.
    pub async fn upload(&self, path: &Path) -> ClientResult<UploadResponse> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::InvalidPath(path.display().to_string()))?
            .to_string();

        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        // Streamed from disk; the length keeps the part's size known up front
        let part = Part::stream_with_length(Body::from(file), size)
            .file_name(filename.clone())
            .mime_str(content_type_for(&filename))?;
        let form = Form::new().part("file", part);

        info!(file = %filename, bytes = size, "Uploading video");

        let response = self
            .http
            .post(format!("{}/api/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let upload: UploadResponse = check(response).await?.json().await?;
        debug!(processed = %upload.processed_filename, "Upload processed");
        Ok(upload)
    }

    /// Statistics of a stored file.
    pub async fn video_stats(&self, kind: VideoKind, filename: &str) -> ClientResult<VideoData> {
        let url = format!("{}/stats", self.video_url(kind, filename));
        let response = self.http.get(url).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Download a stored file to `dest`, returning the bytes written.
    pub async fn download(&self, kind: VideoKind, filename: &str, dest: &Path) -> ClientResult<u64> {
        let mut response = check(self.http.get(self.video_url(kind, filename)).send().await?).await?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// Turn a non-success response into `ClientError::Status`.
async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());

    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = MirageClient::with_base_url("http://localhost:5328/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5328");
        assert_eq!(
            client.processed_url("processed_cam.mp4"),
            "http://localhost:5328/api/processed/processed_cam.mp4"
        );
        assert_eq!(
            client.video_url(VideoKind::Original, "lobby cam.mp4"),
            "http://localhost:5328/api/video/lobby%20cam.mp4"
        );
    }
}
