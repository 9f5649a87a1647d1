//! Snapshot offload to remote object storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

/// Environment variable holding the Dropbox access token.
pub const ACCESS_KEY_ENV: &str = "DROPBOX_ACCESS_KEY";

const UPLOAD_URL: &str = "https://content.dropboxapi.com/2/files/upload";

/// Destination for completed snapshot artifacts.
///
/// The scheduler treats `upload` as a single atomic step: it either completes
/// or reports an error for that cycle. No partial or resumable uploads.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Transmit the artifact at `artifact` to remote storage.
    async fn upload(&self, artifact: &Path) -> Result<(), UploadError>;
}

/// Uploads snapshot artifacts to Dropbox.
///
/// Each artifact lands at `{remote_folder}/{file_name}` via the content API's
/// single-request upload; snapshots of a personal location history stay far
/// below the API's one-shot size limit.
pub struct DropboxSink {
    client: reqwest::Client,
    access_token: String,
    remote_folder: String,
}

impl DropboxSink {
    /// Create a new sink uploading into `remote_folder` ("" for the root).
    pub fn new(access_token: String, remote_folder: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            remote_folder,
        }
    }
}

#[async_trait]
impl SnapshotSink for DropboxSink {
    async fn upload(&self, artifact: &Path) -> Result<(), UploadError> {
        let file_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::BadArtifactPath(artifact.to_path_buf()))?;

        let data = tokio::fs::read(artifact)
            .await
            .map_err(|e| UploadError::ReadArtifact {
                path: artifact.to_path_buf(),
                source: e,
            })?;

        let destination = remote_path(&self.remote_folder, file_name);
        info!(
            "Uploading {} ({} bytes) to {}",
            file_name,
            data.len(),
            destination
        );

        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(&self.access_token)
            .header("Dropbox-API-Arg", upload_arg(&destination))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected { status, body });
        }

        info!("Upload of {} complete", file_name);
        Ok(())
    }
}

/// Build the remote destination path for an artifact.
fn remote_path(folder: &str, file_name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), file_name)
}

/// Build the `Dropbox-API-Arg` header value for an upload.
fn upload_arg(destination: &str) -> String {
    serde_json::json!({
        "path": destination,
        "mode": "add",
        "autorename": false,
        "mute": true,
    })
    .to_string()
}

/// Errors that can occur while offloading a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Artifact path has no usable file name.
    #[error("Artifact path has no usable file name: {0}")]
    BadArtifactPath(PathBuf),

    /// Failed to read the artifact from disk.
    #[error("Failed to read artifact {path}: {source}")]
    ReadArtifact {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Transport-level request failure.
    #[error("Upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote storage rejected the upload.
    #[error("Remote storage rejected upload ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path_root() {
        assert_eq!(
            remote_path("", "backup-2026-08-06-12-00-00.sqlite"),
            "/backup-2026-08-06-12-00-00.sqlite"
        );
    }

    #[test]
    fn test_remote_path_folder() {
        assert_eq!(
            remote_path("/tracklog", "backup.sqlite"),
            "/tracklog/backup.sqlite"
        );
        assert_eq!(
            remote_path("/tracklog/", "backup.sqlite"),
            "/tracklog/backup.sqlite"
        );
    }

    #[test]
    fn test_upload_arg() {
        let arg = upload_arg("/backup.sqlite");
        let parsed: serde_json::Value = serde_json::from_str(&arg).unwrap();
        assert_eq!(parsed["path"], "/backup.sqlite");
        assert_eq!(parsed["mode"], "add");
        assert_eq!(parsed["autorename"], false);
    }

    #[tokio::test]
    async fn test_upload_missing_artifact() {
        let sink = DropboxSink::new("token".to_string(), String::new());
        let result = sink.upload(Path::new("/nonexistent/backup.sqlite")).await;
        assert!(matches!(result, Err(UploadError::ReadArtifact { .. })));
    }
}
