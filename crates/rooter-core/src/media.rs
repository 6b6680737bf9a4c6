//! Content-based media type detection.
//!
//! The worker decides which hashers run from the payload bytes alone. File
//! names and client-declared types are never consulted, so a JPEG uploaded
//! as `clip.mp4` is still routed to image hashers only.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Media type emitted for content that no magic-byte matcher recognizes.
pub const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// A canonical, lowercase MIME type without parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MediaType(String);

impl MediaType {
    /// Canonicalize a MIME string: drop parameters, lowercase, resolve aliases.
    pub fn new(raw: &str) -> Self {
        let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if essence.is_empty() {
            return Self::unknown();
        }
        Self(canonical_alias(&essence).unwrap_or(essence.as_str()).to_string())
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_MEDIA_TYPE.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_MEDIA_TYPE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Top-level type, e.g. `image` for `image/png`.
    pub fn top_level(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MediaType {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for MediaType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<MediaType> for String {
    fn from(value: MediaType) -> Self {
        value.0
    }
}

/// Non-standard spellings seen in hand-written configuration.
fn canonical_alias(essence: &str) -> Option<&'static str> {
    match essence {
        "image/jpg" | "image/pjpeg" => Some("image/jpeg"),
        "image/x-png" => Some("image/png"),
        "video/x-mpeg" => Some("video/mpeg"),
        _ => None,
    }
}

/// Detect the media type of `data` from its magic bytes.
pub fn sniff(data: &[u8]) -> MediaType {
    match infer::get(data) {
        Some(kind) => MediaType::new(kind.mime_type()),
        None => MediaType::unknown(),
    }
}

/// Detect the media type of the file at `path` from its leading bytes.
pub fn sniff_file(path: &Path) -> Result<MediaType> {
    let kind = infer::get_from_path(path)?;
    Ok(kind
        .map(|k| MediaType::new(k.mime_type()))
        .unwrap_or_else(MediaType::unknown))
}
