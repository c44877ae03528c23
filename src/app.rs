//! State controller for the five Keeper tabs.
//!
//! All mutable state lives here, owned by the UI thread. Background work
//! runs on plain threads that report back through a channel as `AppEvent`s;
//! the controller applies events between frames. Nothing in this module
//! draws anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use eframe::egui;

use crate::api::chat::{chat, grounded_maps, grounded_search};
use crate::api::client::GEMINI_BASE_URL;
use crate::api::image::{edit_image, generate_image};
use crate::api::live::{LiveConfig, LiveSession, LiveState};
use crate::api::tts::speak_blocking;
use crate::api::{
    ApiError, AspectRatio, ChatMessage, Citation, GenerationMode, ImageAsset, ImageSize,
    LocalVideoResult, Resolution, VideoModel, VideoOrchestrator, VideoRequest,
};
use crate::config::{save_config, Config};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppPhase {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeeperTab {
    Obi,
    Tata,
    Atlas,
    Arkadas,
    Dojo,
}

impl KeeperTab {
    pub const ALL: [KeeperTab; 5] = [
        KeeperTab::Obi,
        KeeperTab::Tata,
        KeeperTab::Atlas,
        KeeperTab::Arkadas,
        KeeperTab::Dojo,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            KeeperTab::Obi => "🔮 Obi",
            KeeperTab::Tata => "🎬 Tata",
            KeeperTab::Atlas => "🧭 Atlas",
            KeeperTab::Arkadas => "🐙 Arkadaş",
            KeeperTab::Dojo => "🎨 Dojo",
        }
    }
}

/// Result of one background operation, delivered over the event channel.
pub enum AppEvent {
    VideoFinished(Result<LocalVideoResult, ApiError>),
    ChatFinished(Result<String, ApiError>),
    SearchFinished(Result<(String, Vec<Citation>), ApiError>),
    MapsFinished(Result<(String, Vec<Citation>), ApiError>),
    ImageFinished(Result<Vec<u8>, ApiError>),
    SpeechFinished(Result<(), ApiError>),
}

/// The most recent dispatch, kept so the error panel's retry button can
/// replay it without rebuilding inputs the user may have cleared since.
#[derive(Clone)]
pub enum LastAction {
    Chat { prompt: String, thinking: bool },
    Search { prompt: String },
    Maps { prompt: String },
    Video(VideoRequest),
    Image { prompt: String, size: ImageSize },
    Edit { prompt: String },
    Speak { text: String },
}

/// Which kind of video generation the Tata form is set to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoModeKind {
    Text,
    Frames,
    References,
    Extend,
}

impl VideoModeKind {
    pub const ALL: [VideoModeKind; 4] = [
        VideoModeKind::Text,
        VideoModeKind::Frames,
        VideoModeKind::References,
        VideoModeKind::Extend,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            VideoModeKind::Text => "Text to Video",
            VideoModeKind::Frames => "Frames to Video",
            VideoModeKind::References => "Reference Images",
            VideoModeKind::Extend => "Extend Last Video",
        }
    }
}

/// Everything the Tata tab edits before a generation is dispatched.
pub struct VideoForm {
    pub model: VideoModel,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub mode: VideoModeKind,
    pub start_frame: Option<ImageAsset>,
    pub end_frame: Option<ImageAsset>,
    pub references: Vec<ImageAsset>,
    pub looping: bool,
    pub start_frame_path: String,
    pub end_frame_path: String,
    pub reference_path: String,
}

impl Default for VideoForm {
    fn default() -> Self {
        Self {
            model: VideoModel::VeoFast,
            aspect_ratio: AspectRatio::Landscape16x9,
            resolution: Resolution::P720,
            mode: VideoModeKind::Text,
            start_frame: None,
            end_frame: None,
            references: Vec::new(),
            looping: false,
            start_frame_path: String::new(),
            end_frame_path: String::new(),
            reference_path: String::new(),
        }
    }
}

impl VideoForm {
    /// Assemble a request from the form, validating mode-specific inputs.
    /// `previous` is the last completed result, needed for extension.
    pub fn build_request(
        &self,
        prompt: &str,
        previous: Option<&LocalVideoResult>,
    ) -> Result<VideoRequest, ApiError> {
        let mode = match self.mode {
            VideoModeKind::Text => GenerationMode::TextToVideo,
            VideoModeKind::Frames => {
                let start = self.start_frame.clone().ok_or_else(|| {
                    ApiError::Precondition("a start frame is required".to_string())
                })?;
                GenerationMode::FramesToVideo {
                    start,
                    end: self.end_frame.clone(),
                    looping: self.looping,
                }
            }
            VideoModeKind::References => GenerationMode::ReferencesToVideo {
                references: self.references.clone(),
            },
            VideoModeKind::Extend => GenerationMode::ExtendVideo {
                source: previous.map(|r| r.video.clone()),
            },
        };
        Ok(VideoRequest {
            prompt: prompt.to_string(),
            model: self.model,
            aspect_ratio: self.aspect_ratio,
            resolution: self.resolution,
            mode,
        })
    }
}

pub struct Keepers {
    pub config: Config,
    pub tab: KeeperTab,
    pub phase: AppPhase,
    pub error_message: String,

    pub show_key_prompt: bool,
    pub key_input: String,

    /// Shared prompt box, reused across tabs.
    pub input: String,

    pub chat_transcript: Vec<ChatMessage>,
    pub thinking: bool,

    /// Atlas keeps its own transcript; Obi's memories are not Atlas's maps.
    pub atlas_transcript: Vec<ChatMessage>,

    pub video_form: VideoForm,
    pub video_result: Option<LocalVideoResult>,
    pub video_cancel: Arc<AtomicBool>,

    pub generated_image: Option<Vec<u8>>,
    pub image_rev: u64,
    pub dojo_input: Option<ImageAsset>,
    pub dojo_input_path: String,

    pub live: Option<LiveSession>,

    pub last_action: Option<LastAction>,

    tx: Sender<AppEvent>,
    ctx: egui::Context,
}

impl Keepers {
    pub fn new(ctx: egui::Context, tx: Sender<AppEvent>, config: Config) -> Self {
        let show_key_prompt = !config.has_api_key();
        Self {
            config,
            tab: KeeperTab::Obi,
            phase: AppPhase::Idle,
            error_message: String::new(),
            show_key_prompt,
            key_input: String::new(),
            input: String::new(),
            chat_transcript: Vec::new(),
            thinking: false,
            atlas_transcript: Vec::new(),
            video_form: VideoForm::default(),
            video_result: None,
            video_cancel: Arc::new(AtomicBool::new(false)),
            generated_image: None,
            image_rev: 0,
            dojo_input: None,
            dojo_input_path: String::new(),
            live: None,
            last_action: None,
            tx,
            ctx,
        }
    }

    pub fn switch_tab(&mut self, tab: KeeperTab) {
        if tab == self.tab {
            return;
        }
        self.tab = tab;
        if self.phase != AppPhase::Loading {
            self.phase = AppPhase::Idle;
            self.error_message.clear();
        }
    }

    pub fn save_api_key(&mut self) {
        let key = self.key_input.trim().to_string();
        if key.is_empty() {
            return;
        }
        self.config.gemini_api_key = key;
        self.key_input.clear();
        self.show_key_prompt = false;
        if let Err(e) = save_config(&self.config) {
            eprintln!("[Config] failed to save: {}", e);
        }
    }

    /// Route a failure: credential problems reopen the key prompt, anything
    /// else lands on the error panel with the retry option.
    fn fail(&mut self, err: ApiError) {
        if err.is_auth() {
            self.show_key_prompt = true;
            self.phase = AppPhase::Idle;
        } else {
            self.error_message = err.to_string();
            self.phase = AppPhase::Error;
        }
    }

    // --- Obi -------------------------------------------------------------

    pub fn send_chat_message(&mut self) {
        let prompt = self.input.trim().to_string();
        if prompt.is_empty() {
            return;
        }
        self.input.clear();
        self.chat_transcript.push(ChatMessage::user(prompt.clone()));
        self.last_action = Some(LastAction::Chat {
            prompt: prompt.clone(),
            thinking: self.thinking,
        });
        self.run_chat(prompt, self.thinking);
    }

    fn run_chat(&mut self, prompt: String, thinking: bool) {
        self.phase = AppPhase::Loading;
        // The transcript already ends with the user turn being answered.
        let split = self.chat_transcript.len().saturating_sub(1);
        let history = self.chat_transcript[..split].to_vec();
        let api_key = self.config.gemini_api_key.clone();
        let model = self.config.chat_model.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let result = chat(GEMINI_BASE_URL, &api_key, &model, &history, &prompt, thinking);
            let _ = tx.send(AppEvent::ChatFinished(result));
            ctx.request_repaint();
        });
    }

    // --- Atlas -----------------------------------------------------------

    pub fn send_search(&mut self) {
        let prompt = self.input.trim().to_string();
        if prompt.is_empty() {
            return;
        }
        self.input.clear();
        self.atlas_transcript.push(ChatMessage::user(prompt.clone()));
        self.last_action = Some(LastAction::Search {
            prompt: prompt.clone(),
        });
        self.run_search(prompt);
    }

    fn run_search(&mut self, prompt: String) {
        self.phase = AppPhase::Loading;
        let api_key = self.config.gemini_api_key.clone();
        let model = self.config.search_model.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let result = grounded_search(GEMINI_BASE_URL, &api_key, &model, &prompt);
            let _ = tx.send(AppEvent::SearchFinished(result));
            ctx.request_repaint();
        });
    }

    pub fn send_maps(&mut self) {
        let prompt = self.input.trim().to_string();
        if prompt.is_empty() {
            return;
        }
        self.input.clear();
        self.atlas_transcript.push(ChatMessage::user(prompt.clone()));
        self.last_action = Some(LastAction::Maps {
            prompt: prompt.clone(),
        });
        self.run_maps(prompt);
    }

    fn run_maps(&mut self, prompt: String) {
        self.phase = AppPhase::Loading;
        let api_key = self.config.gemini_api_key.clone();
        let model = self.config.maps_model.clone();
        let location = self.config.location();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let result = grounded_maps(GEMINI_BASE_URL, &api_key, &model, &prompt, location);
            let _ = tx.send(AppEvent::MapsFinished(result));
            ctx.request_repaint();
        });
    }

    // --- Tata ------------------------------------------------------------

    pub fn start_video(&mut self) {
        match self
            .video_form
            .build_request(&self.input, self.video_result.as_ref())
        {
            Ok(request) => {
                self.last_action = Some(LastAction::Video(request.clone()));
                self.run_video(request);
            }
            Err(e) => self.fail(e),
        }
    }

    /// Extend the last completed clip, regardless of the form's mode.
    pub fn extend_video(&mut self) {
        let Some(result) = self.video_result.as_ref() else {
            return;
        };
        let request = VideoRequest {
            prompt: self.input.clone(),
            model: self.video_form.model,
            aspect_ratio: self.video_form.aspect_ratio,
            resolution: self.video_form.resolution,
            mode: GenerationMode::ExtendVideo {
                source: Some(result.video.clone()),
            },
        };
        self.last_action = Some(LastAction::Video(request.clone()));
        self.run_video(request);
    }

    fn run_video(&mut self, request: VideoRequest) {
        self.phase = AppPhase::Loading;
        // Fresh flag per job so cancelling this one cannot kill the next.
        let cancel = Arc::new(AtomicBool::new(false));
        self.video_cancel = cancel.clone();

        let mut orchestrator = VideoOrchestrator::new(self.config.gemini_api_key.clone());
        orchestrator.poll_interval = Duration::from_secs(self.config.poll_interval_secs);
        orchestrator.max_wait = Duration::from_secs(self.config.max_poll_secs);

        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let result = orchestrator.generate(&request, &cancel);
            let _ = tx.send(AppEvent::VideoFinished(result));
            ctx.request_repaint();
        });
    }

    pub fn cancel_video(&self) {
        self.video_cancel.store(true, Ordering::SeqCst);
    }

    // --- Dojo ------------------------------------------------------------

    pub fn generate_dojo_image(&mut self, size: ImageSize) {
        let prompt = self.input.trim().to_string();
        if prompt.is_empty() {
            return;
        }
        self.last_action = Some(LastAction::Image {
            prompt: prompt.clone(),
            size,
        });
        self.run_image(prompt, size);
    }

    fn run_image(&mut self, prompt: String, size: ImageSize) {
        self.phase = AppPhase::Loading;
        let api_key = self.config.gemini_api_key.clone();
        let model = self.config.image_model.clone();
        let aspect_ratio = self.video_form.aspect_ratio;
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let result =
                generate_image(GEMINI_BASE_URL, &api_key, &model, &prompt, aspect_ratio, size);
            let _ = tx.send(AppEvent::ImageFinished(result));
            ctx.request_repaint();
        });
    }

    pub fn edit_dojo_image(&mut self) {
        let prompt = self.input.trim().to_string();
        if prompt.is_empty() || self.dojo_input.is_none() {
            return;
        }
        self.last_action = Some(LastAction::Edit {
            prompt: prompt.clone(),
        });
        self.run_edit(prompt);
    }

    fn run_edit(&mut self, prompt: String) {
        let Some(input) = self.dojo_input.clone() else {
            return;
        };
        self.phase = AppPhase::Loading;
        let api_key = self.config.gemini_api_key.clone();
        let model = self.config.edit_model.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let result = edit_image(GEMINI_BASE_URL, &api_key, &model, &prompt, &input);
            let _ = tx.send(AppEvent::ImageFinished(result));
            ctx.request_repaint();
        });
    }

    // --- Arkadaş ---------------------------------------------------------

    pub fn speak(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }
        self.last_action = Some(LastAction::Speak { text: text.clone() });
        self.run_speak(text);
    }

    fn run_speak(&mut self, text: String) {
        self.phase = AppPhase::Loading;
        let api_key = self.config.gemini_api_key.clone();
        let model = self.config.tts_model.clone();
        let voice = self.config.tts_voice.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let result = speak_blocking(GEMINI_BASE_URL, &api_key, &model, &voice, &text);
            let _ = tx.send(AppEvent::SpeechFinished(result));
            ctx.request_repaint();
        });
    }

    pub fn toggle_live(&mut self) {
        if let Some(mut session) = self.live.take() {
            session.disconnect();
        } else {
            self.live = Some(LiveSession::connect(LiveConfig {
                api_key: self.config.gemini_api_key.clone(),
                model: self.config.live_model.clone(),
                voice: self.config.live_voice.clone(),
            }));
        }
    }

    pub fn live_state(&mut self) -> LiveState {
        // A session whose worker ended (server hangup, network drop) is
        // reaped here so the button flips back to "connect".
        let state = self
            .live
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(LiveState::Disconnected);
        if state == LiveState::Disconnected {
            if let Some(mut session) = self.live.take() {
                session.disconnect();
            }
        }
        state
    }

    // --- Events and recovery ---------------------------------------------

    pub fn apply(&mut self, event: AppEvent) {
        match event {
            AppEvent::VideoFinished(Ok(result)) => {
                // Latest wins; the superseded file has no other holders.
                if let Some(prev) = self.video_result.take() {
                    prev.release();
                }
                self.video_result = Some(result);
                self.phase = AppPhase::Success;
            }
            AppEvent::VideoFinished(Err(ApiError::Cancelled)) => {
                self.phase = AppPhase::Idle;
            }
            AppEvent::VideoFinished(Err(e)) => self.fail(e),
            AppEvent::ChatFinished(Ok(text)) => {
                self.chat_transcript.push(ChatMessage::model(text));
                self.phase = AppPhase::Idle;
            }
            AppEvent::ChatFinished(Err(e)) => self.fail(e),
            AppEvent::SearchFinished(Ok((text, citations)))
            | AppEvent::MapsFinished(Ok((text, citations))) => {
                self.atlas_transcript
                    .push(ChatMessage::model_with_citations(text, citations));
                self.phase = AppPhase::Idle;
            }
            AppEvent::SearchFinished(Err(e)) | AppEvent::MapsFinished(Err(e)) => self.fail(e),
            AppEvent::ImageFinished(Ok(bytes)) => {
                self.generated_image = Some(bytes);
                self.image_rev += 1;
                self.phase = AppPhase::Success;
            }
            AppEvent::ImageFinished(Err(e)) => self.fail(e),
            AppEvent::SpeechFinished(Ok(())) => {
                self.phase = AppPhase::Idle;
            }
            AppEvent::SpeechFinished(Err(e)) => self.fail(e),
        }
    }

    /// Replay the most recent dispatch after a failure.
    pub fn recalibrate(&mut self) {
        self.error_message.clear();
        let Some(action) = self.last_action.clone() else {
            self.phase = AppPhase::Idle;
            return;
        };
        match action {
            LastAction::Chat { prompt, thinking } => self.run_chat(prompt, thinking),
            LastAction::Search { prompt } => self.run_search(prompt),
            LastAction::Maps { prompt } => self.run_maps(prompt),
            LastAction::Video(request) => self.run_video(request),
            LastAction::Image { prompt, size } => self.run_image(prompt, size),
            LastAction::Edit { prompt } => self.run_edit(prompt),
            LastAction::Speak { text } => self.run_speak(text),
        }
    }

    /// Reset the sanctuary: abandon any running job, drop results and
    /// transcripts, keep config and form preferences.
    pub fn start_over(&mut self) {
        self.cancel_video();
        if let Some(result) = self.video_result.take() {
            result.release();
        }
        self.generated_image = None;
        self.image_rev += 1;
        self.chat_transcript.clear();
        self.atlas_transcript.clear();
        self.input.clear();
        self.error_message.clear();
        self.last_action = None;
        self.phase = AppPhase::Idle;
    }

    pub fn shutdown(&mut self) {
        self.cancel_video();
        if let Some(mut session) = self.live.take() {
            session.disconnect();
        }
        if let Some(result) = self.video_result.take() {
            result.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn keepers() -> Keepers {
        let (tx, _rx) = mpsc::channel();
        let mut config = Config::default();
        config.gemini_api_key = "test-key".to_string();
        Keepers::new(egui::Context::default(), tx, config)
    }

    #[test]
    fn missing_key_opens_the_prompt() {
        let (tx, _rx) = mpsc::channel();
        let state = Keepers::new(egui::Context::default(), tx, Config::default());
        assert!(state.show_key_prompt);
    }

    #[test]
    fn auth_failure_reopens_the_key_prompt_instead_of_the_error_panel() {
        let mut state = keepers();
        assert!(!state.show_key_prompt);
        state.apply(AppEvent::ChatFinished(Err(ApiError::Auth(
            "bad key".to_string(),
        ))));
        assert!(state.show_key_prompt);
        assert_eq!(state.phase, AppPhase::Idle);
    }

    #[test]
    fn cancellation_is_not_an_error() {
        let mut state = keepers();
        state.phase = AppPhase::Loading;
        state.apply(AppEvent::VideoFinished(Err(ApiError::Cancelled)));
        assert_eq!(state.phase, AppPhase::Idle);
        assert!(state.error_message.is_empty());
    }

    #[test]
    fn remote_failure_lands_on_the_error_panel() {
        let mut state = keepers();
        state.apply(AppEvent::VideoFinished(Err(ApiError::Remote(
            "quota exhausted".to_string(),
        ))));
        assert_eq!(state.phase, AppPhase::Error);
        assert!(state.error_message.contains("quota exhausted"));
    }

    #[test]
    fn chat_answer_extends_the_transcript() {
        let mut state = keepers();
        state.chat_transcript.push(ChatMessage::user("hello"));
        state.apply(AppEvent::ChatFinished(Ok("Ooh, I remember!".to_string())));
        assert_eq!(state.chat_transcript.len(), 2);
        assert_eq!(state.chat_transcript[1].role, crate::api::Role::Model);
        assert_eq!(state.phase, AppPhase::Idle);
    }

    #[test]
    fn atlas_and_obi_transcripts_stay_separate() {
        let mut state = keepers();
        state.chat_transcript.push(ChatMessage::user("memories"));
        state.apply(AppEvent::SearchFinished(Ok((
            "Found it.".to_string(),
            vec![Citation {
                uri: "https://a.example".to_string(),
                title: "Giza".to_string(),
            }],
        ))));
        assert_eq!(state.chat_transcript.len(), 1);
        assert_eq!(state.atlas_transcript.len(), 1);
        assert_eq!(state.atlas_transcript[0].citations.len(), 1);
    }

    #[test]
    fn frames_mode_without_a_start_frame_is_rejected() {
        let form = VideoForm {
            mode: VideoModeKind::Frames,
            ..VideoForm::default()
        };
        let err = form.build_request("prompt", None).unwrap_err();
        assert!(matches!(err, ApiError::Precondition(_)));
    }

    #[test]
    fn extend_mode_carries_the_previous_handle_when_present() {
        let form = VideoForm {
            mode: VideoModeKind::Extend,
            ..VideoForm::default()
        };
        let request = form.build_request("more", None).unwrap();
        assert!(matches!(
            request.mode,
            GenerationMode::ExtendVideo { source: None }
        ));
    }

    #[test]
    fn switching_tabs_clears_a_stale_error() {
        let mut state = keepers();
        state.phase = AppPhase::Error;
        state.error_message = "old failure".to_string();
        state.switch_tab(KeeperTab::Dojo);
        assert_eq!(state.phase, AppPhase::Idle);
        assert!(state.error_message.is_empty());
    }

    #[test]
    fn start_over_clears_transcripts_and_results() {
        let mut state = keepers();
        state.chat_transcript.push(ChatMessage::user("hi"));
        state.atlas_transcript.push(ChatMessage::user("where"));
        state.generated_image = Some(vec![1, 2, 3]);
        state.input = "draft".to_string();
        state.start_over();
        assert!(state.chat_transcript.is_empty());
        assert!(state.atlas_transcript.is_empty());
        assert!(state.generated_image.is_none());
        assert!(state.input.is_empty());
        assert_eq!(state.phase, AppPhase::Idle);
    }
}
