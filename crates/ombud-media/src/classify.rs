//! # Mime Classification
//!
//! Buckets an attachment's mime type into the four classes the
//! compression strategies are keyed on. Anything unrecognized is treated
//! as a document and passed through untouched.

use serde::{Deserialize, Serialize};

/// The coarse media class of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MimeClass {
    /// Raster images (`image/*`).
    Image,
    /// Video clips (`video/*`).
    Video,
    /// Audio recordings (`audio/*`).
    Audio,
    /// Everything else — PDFs, archives, unknown types.
    Document,
}

impl MimeClass {
    /// Classify a mime type string (`"image/png"`, `"video/mp4"`, ...).
    pub fn from_mime(mime: &str) -> Self {
        let top_level = mime.split('/').next().unwrap_or("");
        match top_level.to_ascii_lowercase().as_str() {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Document,
        }
    }

    /// The wire name of this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for MimeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
