pub mod chat;
pub mod client;
pub mod error;
pub mod image;
pub mod live;
pub mod tts;
pub mod types;
pub mod video;

pub use error::ApiError;
pub use types::{
    AspectRatio, ChatMessage, Citation, GenerationMode, ImageAsset, ImageSize, LocalVideoResult,
    Resolution, Role, VideoHandle, VideoModel, VideoRequest,
};
pub use video::VideoOrchestrator;
