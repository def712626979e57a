//! Multipart intake.
//!
//! The `image` part is spooled to a uniquely named file in the upload
//! directory. That file lives exactly as long as its [`TempUpload`] guard, so
//! every way out of a request (success, validation error, failed model call,
//! client disconnect) removes it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, Multipart};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::ApiError;

pub const IMAGE_FIELD: &str = "image";
const UPLOAD_PREFIX: &str = "upload-";

/// An uploaded file on disk, deleted when dropped.
#[derive(Debug)]
pub struct TempUpload {
    file: Option<NamedTempFile>,
    path: PathBuf,
    content_type: Option<String>,
    file_name: Option<String>,
    len: u64,
}

impl TempUpload {
    pub(crate) fn create_in(dir: &Path) -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(UPLOAD_PREFIX)
            .tempfile_in(dir)?;
        let path = file.path().to_path_buf();
        tracing::debug!(path = %path.display(), "created upload file");
        Ok(Self {
            file: Some(file),
            path,
            content_type: None,
            file_name: None,
            len: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        match file.close() {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed upload file"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove upload file"
            ),
        }
    }
}

/// Everything a client sent in one `multipart/form-data` request.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub image: Option<TempUpload>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart, upload_dir: &Path) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(ApiError::from_multipart)?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == IMAGE_FIELD {
                let Some(upload) = spool(field, upload_dir).await? else {
                    continue;
                };
                if form.image.is_some() {
                    return Err(ApiError::TooManyFiles);
                }
                form.image = Some(upload);
            } else if field.file_name().is_some() {
                tracing::debug!(field = %name, "ignoring unexpected file part");
            } else {
                let value = field.text().await.map_err(ApiError::from_multipart)?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// A text field, if present and not blank. The value is returned as sent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    #[cfg(test)]
    pub fn with_fields(pairs: &[(&str, &str)]) -> Self {
        Self {
            image: None,
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Creates the upload directory and removes uploads left behind by a
/// process that did not shut down cleanly. Returns how many were removed.
pub async fn prepare_upload_dir(dir: &Path) -> std::io::Result<usize> {
    tokio::fs::create_dir_all(dir).await?;

    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let stale = entry.file_name().to_string_lossy().starts_with(UPLOAD_PREFIX);
        if stale && entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Streams one file part to disk. Empty parts (a form submitted without
/// choosing a file) yield `None` and leave nothing behind.
async fn spool(mut field: Field<'_>, dir: &Path) -> Result<Option<TempUpload>, ApiError> {
    let mut upload = TempUpload::create_in(dir).map_err(ApiError::Upload)?;
    upload.content_type = field.content_type().map(str::to_string);
    upload.file_name = field.file_name().map(str::to_string);

    let mut out = tokio::fs::OpenOptions::new()
        .write(true)
        .open(upload.path())
        .await
        .map_err(ApiError::Upload)?;

    while let Some(chunk) = field.chunk().await.map_err(ApiError::from_multipart)? {
        out.write_all(&chunk).await.map_err(ApiError::Upload)?;
        upload.len += chunk.len() as u64;
    }
    out.flush().await.map_err(ApiError::Upload)?;

    if upload.is_empty() {
        return Ok(None);
    }

    tracing::debug!(
        path = %upload.path.display(),
        bytes = upload.len,
        file_name = upload.file_name().unwrap_or_default(),
        content_type = upload.content_type().unwrap_or("unknown"),
        "stored upload"
    );
    Ok(Some(upload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let upload = TempUpload::create_in(dir.path()).unwrap();
        let path = upload.path().to_path_buf();

        assert!(path.exists());
        assert!(path.starts_with(dir.path()));
        drop(upload);
        assert!(!path.exists());
    }

    #[test]
    fn guard_tolerates_file_already_gone() {
        let dir = tempfile::tempdir().unwrap();
        let upload = TempUpload::create_in(dir.path()).unwrap();
        std::fs::remove_file(upload.path()).unwrap();
        drop(upload);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn uploads_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempUpload::create_in(dir.path()).unwrap();
        let b = TempUpload::create_in(dir.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn prepare_removes_only_stale_uploads() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("uploads");

        assert_eq!(prepare_upload_dir(&dir).await.unwrap(), 0);
        std::fs::write(dir.join("upload-abc123"), b"left over").unwrap();
        std::fs::write(dir.join("keep.txt"), b"not ours").unwrap();

        assert_eq!(prepare_upload_dir(&dir).await.unwrap(), 1);
        assert!(!dir.join("upload-abc123").exists());
        assert!(dir.join("keep.txt").exists());
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let form = UploadForm::with_fields(&[("pictureDate", "  "), ("language", " french ")]);
        assert_eq!(form.field("pictureDate"), None);
        assert_eq!(form.field("language"), Some(" french "));
        assert_eq!(form.field("person"), None);
    }
}
