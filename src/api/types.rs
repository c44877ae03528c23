//! Data model for the generation client: request enums, job snapshots and
//! chat transcript types.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Veo model tiers exposed in the video form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoModel {
    VeoFast,
    Veo,
}

impl VideoModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoModel::VeoFast => "veo-3.1-fast-generate-preview",
            VideoModel::Veo => "veo-3.1-generate-preview",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VideoModel::VeoFast => "Veo Fast",
            VideoModel::Veo => "Veo",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AspectRatio {
    Square,
    Portrait3x4,
    Landscape4x3,
    Portrait9x16,
    Landscape16x9,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
        }
    }

    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
    ];
}

/// Still-image resolution tiers for the Dojo tab.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSize {
    K1,
    K2,
    K4,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::K1 => "1K",
            ImageSize::K2 => "2K",
            ImageSize::K4 => "4K",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    P720,
    P1080,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
        }
    }
}

/// An image selected by the user. The bytes are read and base64-encoded once
/// at selection time and treated as immutable afterwards; picking a new file
/// builds a fresh asset.
#[derive(Clone, Debug)]
pub struct ImageAsset {
    pub path: PathBuf,
    pub mime_type: String,
    pub base64: String,
}

impl ImageAsset {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            anyhow::bail!("{} is empty", path.display());
        }
        let mime_type = sniff_mime(&bytes).to_string();
        Ok(Self {
            path: path.to_path_buf(),
            mime_type,
            base64: crate::pcm::encode_base64(&bytes),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Sniff the image format from magic bytes. Unknown data is sent as PNG and
/// left for the service to reject.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        "image/jpeg"
    } else if bytes.starts_with(&[0x89, 0x50, 0x4e, 0x47]) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

/// Opaque `video` object of a completed job, exactly as the service returned
/// it. Sent back verbatim when the user extends a clip.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoHandle(pub serde_json::Value);

impl VideoHandle {
    pub fn uri(&self) -> Option<&str> {
        self.0.get("uri").and_then(|u| u.as_str())
    }
}

/// The four ways a clip can be produced. Mode-specific inputs live on the
/// variant so a request cannot be assembled with the wrong fields attached.
#[derive(Clone, Debug)]
pub enum GenerationMode {
    TextToVideo,
    FramesToVideo {
        start: ImageAsset,
        end: Option<ImageAsset>,
        /// Substitute the start frame as the end frame for a seamless loop.
        looping: bool,
    },
    ReferencesToVideo {
        references: Vec<ImageAsset>,
    },
    ExtendVideo {
        /// The `video` object of the previous job. Absent means the user
        /// never completed a generation, which is a precondition violation.
        source: Option<VideoHandle>,
    },
}

impl GenerationMode {
    pub fn is_extend(&self) -> bool {
        matches!(self, GenerationMode::ExtendVideo { .. })
    }
}

#[derive(Clone, Debug)]
pub struct VideoRequest {
    pub prompt: String,
    pub model: VideoModel,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub mode: GenerationMode,
}

/// Snapshot of a long-running video operation. Each poll replaces the whole
/// snapshot; the orchestrator never merges fields across polls.
#[derive(Clone, Debug, Deserialize)]
pub struct VideoJob {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<JobError>,
    #[serde(default)]
    pub response: Option<JobResponse>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct JobResponse {
    #[serde(rename = "generateVideoResponse", default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenerateVideoResponse {
    #[serde(rename = "generatedSamples", alias = "generatedVideos", default)]
    pub generated_samples: Vec<GeneratedSample>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GeneratedSample {
    #[serde(default)]
    pub video: Option<VideoHandle>,
}

impl VideoJob {
    /// The first produced video, if the job finished with any.
    pub fn first_video(&self) -> Option<&VideoHandle> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()
    }
}

/// Client-owned result of a completed generation: a playable temp file plus
/// everything needed to extend the clip later.
#[derive(Clone, Debug)]
pub struct LocalVideoResult {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub uri: String,
    pub video: VideoHandle,
}

impl LocalVideoResult {
    /// Delete the backing temp file. Called when the result is superseded or
    /// the user starts over; latest wins, nothing else holds the file.
    pub fn release(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// A grounding source attached to a model answer, in the order the service
/// returned them (relevance order).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub citations: Vec<Citation>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            citations: Vec::new(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            citations: Vec::new(),
        }
    }

    pub fn model_with_citations(text: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            citations,
        }
    }
}
