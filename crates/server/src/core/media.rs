//! Media Service Layer
//!
//! The message store only keeps URLs. Raw image/video content sent as a
//! `data:` URL is handed to a `MediaStore` first and replaced by the URL it
//! returns. `LocalMediaStore` keeps content-addressed files on disk and is
//! served back by `get_media`.

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
};
use base64::Engine;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::error::{Error, Result};
use crate::core::models::Payload;
use crate::core::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn dir(self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        }
    }

    fn from_dir(dir: &str) -> Option<Self> {
        match dir {
            "images" => Some(MediaKind::Image),
            "videos" => Some(MediaKind::Video),
            _ => None,
        }
    }

    fn mime_prefix(self) -> &'static str {
        match self {
            MediaKind::Image => "image/",
            MediaKind::Video => "video/",
        }
    }
}

const EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
];

fn extension_for(content_type: &str) -> Option<&'static str> {
    EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

fn content_type_for(ext: &str) -> Option<&'static str> {
    EXTENSIONS
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
}

/// External object storage for message media.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store `content` and return a retrievable URL for it.
    async fn upload(&self, kind: MediaKind, content_type: &str, content: Bytes) -> Result<String>;

    /// Read stored content back by the path segments of its URL.
    /// `None` for unknown or malformed names.
    async fn get(&self, kind_dir: &str, file: &str) -> Result<Option<(Bytes, &'static str)>>;
}

pub struct LocalMediaStore {
    dir: PathBuf,
    public_url: String,
    max_bytes: usize,
}

impl LocalMediaStore {
    pub fn new(dir: PathBuf, public_url: &str, max_bytes: usize) -> Self {
        Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, kind: MediaKind, content_type: &str, content: Bytes) -> Result<String> {
        if content.len() > self.max_bytes {
            return Err(Error::validation(format!(
                "{} exceeds the {} byte limit",
                kind.dir(),
                self.max_bytes
            )));
        }
        let ext = extension_for(content_type).ok_or_else(|| {
            Error::validation(format!("unsupported media type {}", content_type))
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&content);
        let hash = format!("{:x}", hasher.finalize());
        let file = format!("{}.{}", hash, ext);

        let dir = self.dir.join(kind.dir());
        fs::create_dir_all(&dir).await?;
        let path = dir.join(&file);

        if fs::try_exists(&path).await? {
            debug!("Media {} already stored", file);
        } else {
            // Write to a temp file private to this upload, then atomic rename
            let temp_path = dir.join(format!("{}.{}.tmp", hash, Uuid::new_v4()));
            fs::write(&temp_path, &content).await?;
            if let Err(e) = fs::rename(&temp_path, &path).await {
                let _ = fs::remove_file(&temp_path).await;
                // A concurrent upload of the same content got there first
                if !fs::try_exists(&path).await? {
                    return Err(e.into());
                }
            }
            info!("Stored {} {} ({} bytes)", kind.dir(), file, content.len());
        }

        Ok(format!("{}/media/{}/{}", self.public_url, kind.dir(), file))
    }

    async fn get(&self, kind_dir: &str, file: &str) -> Result<Option<(Bytes, &'static str)>> {
        let Some(kind) = MediaKind::from_dir(kind_dir) else {
            return Ok(None);
        };
        let Some((hash, ext)) = file.split_once('.') else {
            return Ok(None);
        };
        let is_hash = hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit());
        let Some(content_type) = content_type_for(ext).filter(|_| is_hash) else {
            return Ok(None);
        };

        let path = self.dir.join(kind.dir()).join(file);
        match fs::read(&path).await {
            Ok(data) => Ok(Some((Bytes::from(data), content_type))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Split a `data:<mime>;base64,<content>` URL.
pub fn decode_data_url(raw: &str) -> Result<(String, Bytes)> {
    let rest = raw
        .strip_prefix("data:")
        .ok_or_else(|| Error::validation("not a data URL"))?;
    let (header, encoded) = rest
        .split_once(',')
        .ok_or_else(|| Error::validation("data URL has no content"))?;
    let content_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::validation("data URL must be base64 encoded"))?;

    let content = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::validation(format!("data URL is not valid base64: {}", e)))?;

    Ok((content_type.to_ascii_lowercase(), Bytes::from(content)))
}

/// Replace inline `data:` media in `payload` with an uploaded URL.
pub async fn materialize(media: &dyn MediaStore, payload: Payload) -> Result<Payload> {
    let (kind, raw) = match &payload {
        Payload::Image(raw) if raw.starts_with("data:") => (MediaKind::Image, raw),
        Payload::Video(raw) if raw.starts_with("data:") => (MediaKind::Video, raw),
        _ => return Ok(payload),
    };

    let (content_type, content) = decode_data_url(raw)?;
    if !content_type.starts_with(kind.mime_prefix()) {
        return Err(Error::validation(format!(
            "{} field carries {} content",
            payload.kind(),
            content_type
        )));
    }

    let url = media.upload(kind, &content_type, content).await?;
    Ok(match kind {
        MediaKind::Image => Payload::Image(url),
        MediaKind::Video => Payload::Video(url),
    })
}

/// GET /media/{kind}/{file}
pub async fn get_media(
    Path((kind, file)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<(HeaderMap, Bytes)> {
    let (data, content_type) = state
        .media
        .get(&kind, &file)
        .await?
        .ok_or_else(|| Error::not_found("media"))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    Ok((headers, data))
}
