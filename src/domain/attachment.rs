//! Chat attachments: base64 decoding, type validation and media storage.
//!
//! Clients upload a file inline with a message as
//! `{"content": "<base64 or data URL>", "name": "photo.jpg"}`. Only images
//! and videos are accepted.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::error::ChatError;

/// Extensions accepted for chat attachments.
pub const ALLOWED_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "mp4", "mov", "avi"];

/// Sub-directory of the media root attachments are written to.
pub const UPLOAD_DIR: &str = "technical_support_files";

const DEFAULT_NAME: &str = "uploaded_file.png";

/// Attachment as sent by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileUpload {
    /// Base64 payload, optionally prefixed with `data:<mime>;base64,`.
    #[serde(default)]
    pub content: String,
    /// Client-side file name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A validated, decoded attachment ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFile {
    /// Sanitized file name including extension.
    pub name: String,
    /// MIME type from the data URL, or `application/octet-stream`.
    pub mime_type: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

/// Why an upload was refused. Rendered as the `file` field error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    /// The payload is not valid base64.
    #[error("Upload a valid file.")]
    Undecodable,
    /// The payload decoded to nothing.
    #[error("The submitted file is empty.")]
    Empty,
    /// The decoded payload exceeds the configured limit.
    #[error("File is larger than {max_bytes} bytes.")]
    TooLarge {
        /// Configured limit.
        max_bytes: usize,
    },
    /// The extension is not an image or video type.
    #[error("Allowed types are: {}", ALLOWED_EXTENSIONS.join(", "))]
    DisallowedType,
}

impl FileUpload {
    /// Decodes and validates the upload.
    ///
    /// # Errors
    ///
    /// Returns an [`AttachmentError`] if the payload is not base64, is
    /// empty, exceeds `max_bytes`, or has a disallowed extension.
    pub fn decode(&self, max_bytes: usize) -> Result<DecodedFile, AttachmentError> {
        let (mime_type, payload) = split_data_url(&self.content);
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|_| AttachmentError::Undecodable)?;
        if bytes.is_empty() {
            return Err(AttachmentError::Empty);
        }
        if bytes.len() > max_bytes {
            return Err(AttachmentError::TooLarge { max_bytes });
        }

        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => sanitize_file_name(name),
            Some(_) => format!("uploaded_file{}", extension_for_mime(&mime_type)),
            None => DEFAULT_NAME.to_string(),
        };
        validate_extension(&name)?;

        tracing::debug!(name = %name, mime_type = %mime_type, size = bytes.len(), "decoded attachment");
        Ok(DecodedFile {
            name,
            mime_type,
            bytes,
        })
    }
}

/// Checks the extension of `name` against [`ALLOWED_EXTENSIONS`].
///
/// # Errors
///
/// Returns [`AttachmentError::DisallowedType`] for any other extension.
pub fn validate_extension(name: &str) -> Result<(), AttachmentError> {
    let extension = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    if name.contains('.') && ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(AttachmentError::DisallowedType)
    }
}

fn split_data_url(content: &str) -> (String, &str) {
    match content.split_once(',') {
        Some((metadata, payload)) => {
            let mime = metadata
                .split(';')
                .next()
                .and_then(|m| m.split_once(':'))
                .map(|(_, mime)| mime.to_string())
                .filter(|mime| !mime.is_empty())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            (mime, payload)
        }
        None => ("application/octet-stream".to_string(), content),
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "video/mp4" => ".mp4",
        "video/quicktime" => ".mov",
        "video/x-msvideo" => ".avi",
        _ => "",
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Writes attachments below the media root and maps them to public URLs.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStorage {
    /// Creates a storage rooted at `root`, served under `url_prefix`.
    #[must_use]
    pub fn new(root: PathBuf, url_prefix: impl Into<String>) -> Self {
        Self {
            root,
            url_prefix: url_prefix.into(),
        }
    }

    /// Stores `file` under a unique name and returns its public URL.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Storage`] if the upload directory cannot be
    /// created or the file cannot be written.
    pub async fn save(&self, file: &DecodedFile) -> Result<String, ChatError> {
        let dir = self.upload_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ChatError::Storage(format!("{}: {e}", dir.display())))?;

        let stored_name = format!("{}_{}", uuid::Uuid::new_v4().simple(), file.name);
        let path = dir.join(&stored_name);
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|e| ChatError::Storage(format!("{}: {e}", path.display())))?;

        tracing::info!(path = %path.display(), size = file.bytes.len(), "attachment stored");
        Ok(format!("{}/{stored_name}", self.public_dir()))
    }

    /// URL path the upload directory is served under.
    #[must_use]
    pub fn public_dir(&self) -> String {
        format!("{}/{UPLOAD_DIR}", self.url_prefix)
    }

    /// Directory the uploads are written to.
    #[must_use]
    pub fn upload_dir(&self) -> PathBuf {
        self.root.join(UPLOAD_DIR)
    }
}
