//! Video Job Orchestrator: payload assembly, submit, bounded poll loop and
//! artifact fetch for the Veo long-running endpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::client::{GEMINI_BASE_URL, UREQ_AGENT};
use super::error::ApiError;
use super::types::{GenerationMode, LocalVideoResult, VideoJob, VideoRequest};

/// Fixed stylistic preamble prepended to every video prompt so all clips
/// share the same visual identity.
pub const STYLE_PREAMBLE: &str = "Style: A vibrant, high-end 3D animated cartoon (Pixar/Disney quality) titled \"The Pyramid Keepers: A Guide to FIELD Architecture\".\n\
Setting: A futuristic digital sanctuary where a crystal pyramid glows with Solfège frequencies, filled with cinematic lighting, holographic blueprints, Egyptian-tech motifs, and fractal geometry.\n\
The Keepers: Obi, a wise grandmotherly purple sphere with glowing spectacles; Tata, a strict orange triangle with clock-hand eyebrows; Atlas, a high-energy gold triangle with a spinning compass nose; Arkadaş, a friendly rainbow octopus translator; and the Gyroscope, a golden crystal spinning top humming in Solfège harmony at the pyramid's center.\n\
Visuals: Rich saturated colors, volumetric light, and expressive character animation.\n\
Action: ";

/// Used when the user submits an empty prompt.
const DEFAULT_ACTION: &str =
    "The Pyramid Keepers working together to protect the crystal pyramid.";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

/// How often the poll sleep wakes up to check the cancel flag.
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(100);

pub struct VideoOrchestrator {
    pub base_url: String,
    pub api_key: String,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl VideoOrchestrator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Run a request end to end: assemble, submit, poll until terminal,
    /// fetch the artifact and materialize it as a local temp file.
    ///
    /// Nothing is retried internally; retry is a user action. The cancel
    /// flag is checked between polls so an abandoned job stops polling when
    /// the UI tears down.
    pub fn generate(
        &self,
        request: &VideoRequest,
        cancel: &AtomicBool,
    ) -> Result<LocalVideoResult, ApiError> {
        let payload = build_payload(request)?;
        println!("[Video] submitting {} job", request.model.as_str());
        let job = self.submit(request.model.as_str(), payload)?;
        let job = self.poll_until_done(job, cancel)?;

        if let Some(err) = &job.error {
            let message = err
                .message
                .clone()
                .unwrap_or_else(|| format!("remote error code {:?}", err.code));
            return Err(ApiError::Remote(message));
        }

        let video = job
            .first_video()
            .cloned()
            .ok_or_else(|| ApiError::EmptyResult("no videos were generated".to_string()))?;
        let raw_uri = video
            .uri()
            .ok_or_else(|| ApiError::EmptyResult("generated video carries no URI".to_string()))?;
        let uri = urlencoding::decode(raw_uri)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| raw_uri.to_string());

        let bytes = self.fetch_artifact(&uri)?;
        let path = std::env::temp_dir().join(format!(
            "pyramid-keepers-{}.mp4",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default()
        ));
        std::fs::write(&path, &bytes)
            .map_err(|e| ApiError::Transport(format!("failed to write {}: {}", path.display(), e)))?;
        println!("[Video] artifact saved to {}", path.display());

        Ok(LocalVideoResult {
            path,
            bytes,
            uri,
            video,
        })
    }

    fn submit(&self, model: &str, payload: serde_json::Value) -> Result<VideoJob, ApiError> {
        let url = format!(
            "{}/v1beta/models/{}:predictLongRunning",
            self.base_url, model
        );
        let resp = UREQ_AGENT
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .send_json(payload)?;
        resp.into_body().read_json::<VideoJob>().map_err(ApiError::from)
    }

    fn poll(&self, name: &str) -> Result<VideoJob, ApiError> {
        let url = format!("{}/v1beta/{}", self.base_url, name);
        let resp = UREQ_AGENT
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .call()?;
        resp.into_body().read_json::<VideoJob>().map_err(ApiError::from)
    }

    /// Re-fetch the job snapshot at a fixed interval until its done flag is
    /// set. Bounded by `max_wait` and by the UI-owned cancel flag; each poll
    /// fully resolves before the next is issued.
    fn poll_until_done(
        &self,
        mut job: VideoJob,
        cancel: &AtomicBool,
    ) -> Result<VideoJob, ApiError> {
        let started = Instant::now();
        while !job.done {
            if started.elapsed() > self.max_wait {
                return Err(ApiError::Stalled(self.max_wait));
            }
            self.wait_or_cancel(cancel)?;
            println!("[Video] polling {}", job.name);
            job = self.poll(&job.name)?;
        }
        Ok(job)
    }

    fn wait_or_cancel(&self, cancel: &AtomicBool) -> Result<(), ApiError> {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(ApiError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(CANCEL_CHECK_SLICE.min(deadline - now));
        }
    }

    /// Authenticated GET of the artifact URI. Any non-success status is an
    /// explicit error carrying the code.
    fn fetch_artifact(&self, uri: &str) -> Result<Vec<u8>, ApiError> {
        let resp = UREQ_AGENT
            .get(uri)
            .header("x-goog-api-key", &self.api_key)
            .call()
            .map_err(|e| match e {
                ureq::Error::StatusCode(code) => ApiError::HttpStatus(code),
                other => ApiError::from(other),
            })?;
        resp.into_body()
            .read_to_vec()
            .map_err(|e| ApiError::Transport(e.to_string()))
    }
}

/// Assemble the provider payload for a request. Pure, so every mode's
/// precondition is enforced before any network traffic.
pub fn build_payload(request: &VideoRequest) -> Result<serde_json::Value, ApiError> {
    let mut parameters = serde_json::json!({
        "numberOfVideos": 1,
        "resolution": request.resolution.as_str(),
    });
    // The source clip dictates framing when extending.
    if !request.mode.is_extend() {
        parameters["aspectRatio"] = request.aspect_ratio.as_str().into();
    }

    let action = if request.prompt.trim().is_empty() {
        DEFAULT_ACTION
    } else {
        request.prompt.as_str()
    };
    let mut instance = serde_json::json!({
        "prompt": format!("{}{}", STYLE_PREAMBLE, action),
    });

    match &request.mode {
        GenerationMode::TextToVideo => {}
        GenerationMode::FramesToVideo {
            start,
            end,
            looping,
        } => {
            instance["image"] = serde_json::json!({
                "bytesBase64Encoded": start.base64,
                "mimeType": start.mime_type,
            });
            let last_frame = if *looping { Some(start) } else { end.as_ref() };
            if let Some(last) = last_frame {
                parameters["lastFrame"] = serde_json::json!({
                    "bytesBase64Encoded": last.base64,
                    "mimeType": last.mime_type,
                });
            }
        }
        GenerationMode::ReferencesToVideo { references } => {
            if references.len() > 3 {
                return Err(ApiError::Precondition(
                    "at most three reference images may be attached".to_string(),
                ));
            }
            if !references.is_empty() {
                let refs: Vec<serde_json::Value> = references
                    .iter()
                    .map(|img| {
                        serde_json::json!({
                            "image": {
                                "bytesBase64Encoded": img.base64,
                                "mimeType": img.mime_type,
                            },
                            "referenceType": "asset",
                        })
                    })
                    .collect();
                parameters["referenceImages"] = refs.into();
            }
        }
        GenerationMode::ExtendVideo { source } => {
            let video = source.as_ref().ok_or_else(|| {
                ApiError::Precondition(
                    "an input video is required to extend a video".to_string(),
                )
            })?;
            instance["video"] = video.0.clone();
        }
    }

    Ok(serde_json::json!({
        "instances": [instance],
        "parameters": parameters,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{AspectRatio, ImageAsset, Resolution, VideoHandle, VideoModel};
    use std::path::PathBuf;

    fn asset(bytes: &[u8]) -> ImageAsset {
        ImageAsset {
            path: PathBuf::from("frame.png"),
            mime_type: "image/png".to_string(),
            base64: crate::pcm::encode_base64(bytes),
        }
    }

    fn request(mode: GenerationMode) -> VideoRequest {
        VideoRequest {
            prompt: "a glowing pyramid".to_string(),
            model: VideoModel::VeoFast,
            aspect_ratio: AspectRatio::Landscape16x9,
            resolution: Resolution::P720,
            mode,
        }
    }

    #[test]
    fn extend_without_source_is_a_precondition_error() {
        let err = build_payload(&request(GenerationMode::ExtendVideo { source: None }))
            .unwrap_err();
        assert!(matches!(err, ApiError::Precondition(_)));
    }

    #[test]
    fn extend_embeds_the_prior_video_and_drops_aspect_ratio() {
        let handle = VideoHandle(serde_json::json!({ "uri": "https://x/clip.mp4" }));
        let payload = build_payload(&request(GenerationMode::ExtendVideo {
            source: Some(handle),
        }))
        .unwrap();
        assert_eq!(
            payload["instances"][0]["video"]["uri"],
            "https://x/clip.mp4"
        );
        assert!(payload["parameters"].get("aspectRatio").is_none());
        assert_eq!(payload["parameters"]["resolution"], "720p");
    }

    #[test]
    fn too_many_references_is_a_precondition_error() {
        let refs = vec![asset(b"a"), asset(b"b"), asset(b"c"), asset(b"d")];
        let err = build_payload(&request(GenerationMode::ReferencesToVideo {
            references: refs,
        }))
        .unwrap_err();
        assert!(matches!(err, ApiError::Precondition(_)));
    }

    #[test]
    fn references_are_tagged_as_assets() {
        let payload = build_payload(&request(GenerationMode::ReferencesToVideo {
            references: vec![asset(b"a"), asset(b"b")],
        }))
        .unwrap();
        let refs = payload["parameters"]["referenceImages"].as_array().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0]["referenceType"], "asset");
    }

    #[test]
    fn loop_flag_duplicates_the_start_frame_exactly() {
        let start = asset(b"start-frame-bytes");
        let end = asset(b"different-end-frame");
        let payload = build_payload(&request(GenerationMode::FramesToVideo {
            start: start.clone(),
            end: Some(end),
            looping: true,
        }))
        .unwrap();
        assert_eq!(
            payload["parameters"]["lastFrame"]["bytesBase64Encoded"],
            payload["instances"][0]["image"]["bytesBase64Encoded"]
        );
        assert_eq!(
            payload["parameters"]["lastFrame"]["bytesBase64Encoded"],
            serde_json::Value::from(start.base64)
        );
    }

    #[test]
    fn explicit_end_frame_is_used_when_not_looping() {
        let start = asset(b"start");
        let end = asset(b"end");
        let payload = build_payload(&request(GenerationMode::FramesToVideo {
            start,
            end: Some(end.clone()),
            looping: false,
        }))
        .unwrap();
        assert_eq!(
            payload["parameters"]["lastFrame"]["bytesBase64Encoded"],
            serde_json::Value::from(end.base64)
        );
    }

    #[test]
    fn empty_prompt_gets_the_default_action_line() {
        let mut req = request(GenerationMode::TextToVideo);
        req.prompt = "   ".to_string();
        let payload = build_payload(&req).unwrap();
        let prompt = payload["instances"][0]["prompt"].as_str().unwrap();
        assert!(prompt.starts_with(STYLE_PREAMBLE));
        assert!(prompt.ends_with(DEFAULT_ACTION));
    }

    #[test]
    fn text_mode_sets_common_parameters() {
        let payload = build_payload(&request(GenerationMode::TextToVideo)).unwrap();
        assert_eq!(payload["parameters"]["numberOfVideos"], 1);
        assert_eq!(payload["parameters"]["aspectRatio"], "16:9");
        let prompt = payload["instances"][0]["prompt"].as_str().unwrap();
        assert!(prompt.ends_with("a glowing pyramid"));
    }
}
