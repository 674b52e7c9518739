//! Drawing upload and analysis status polling.
//!
//! The upload returns as soon as the backend has queued the drawing; the
//! classification runs server-side and is observed through the status
//! endpoint. Both the upload and the whole polling loop are bounded by the
//! configured analysis timeout.

#[cfg(test)]
#[path = "analysis_test.rs"]
mod tests;

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};

use super::api::{ANALYZE_IMAGE_PATH, ApiClient, analysis_status_path};
use super::error::ApiError;
use super::types::{AnalysisStarted, AnalysisStatus};

/// Delay between status requests.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AnalysisService {
    api: ApiClient,
    poll_interval: Duration,
}

impl AnalysisService {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api, poll_interval: POLL_INTERVAL }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Upload the drawing at `path` and start its analysis.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read; otherwise any transport or status
    /// error. The upload is bounded by the analysis timeout.
    pub async fn analyze_image(&self, path: &Path, description: Option<&str>) -> Result<AnalysisStarted, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "drawing".to_owned(), |name| name.to_string_lossy().into_owned());
        tracing::info!(file = %file_name, size = bytes.len(), "uploading drawing for analysis");

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(image_mime(path))
            .map_err(|e| ApiError::Request(e.to_string()))?;
        let mut form = Form::new().part("file", part);
        if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
            form = form.text("description", description.to_owned());
        }

        let started: AnalysisStarted = self
            .api
            .post_multipart(ANALYZE_IMAGE_PATH, form, self.api.timeouts().analysis())
            .await?;
        tracing::info!(test_id = started.test_id, status = ?started.status, "analysis started");
        Ok(started)
    }

    /// # Errors
    ///
    /// Any transport or status error; 404 when the test is unknown.
    pub async fn status(&self, test_id: i64) -> Result<AnalysisStatus, ApiError> {
        self.api.get_json(&analysis_status_path(test_id), &[]).await
    }

    /// Poll until the analysis completes or fails, reporting every status.
    ///
    /// # Errors
    ///
    /// `Timeout` once the analysis timeout elapses; any request error ends
    /// polling immediately.
    pub async fn poll_status<F>(&self, test_id: i64, mut on_progress: F) -> Result<AnalysisStatus, ApiError>
    where
        F: FnMut(&AnalysisStatus),
    {
        let limit = self.api.timeouts().analysis();
        let polling = async {
            loop {
                let status = self.status(test_id).await?;
                on_progress(&status);
                if status.status.is_terminal() {
                    return Ok(status);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        match tokio::time::timeout(limit, polling).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(test_id, secs = limit.as_secs(), "analysis polling timed out");
                Err(ApiError::Timeout { secs: limit.as_secs() })
            }
        }
    }

    /// Absolute URL for an image reference from a test result.
    #[must_use]
    pub fn image_url(&self, raw: &str) -> String {
        resolve_image_url(self.api.base_url(), raw)
    }
}

/// Absolute references pass through; server paths like
/// `result/images/a.jpg` are served from `{base}/images/a.jpg`.
#[must_use]
pub fn resolve_image_url(base_url: &str, raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_owned();
    }
    let relative = raw.replacen("result/", "", 1);
    format!("{}/{}", base_url.trim_end_matches('/'), relative.trim_start_matches('/'))
}

fn image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
