//! The sanctuary window: one tab strip, five Keeper views.

use std::sync::mpsc::{self, Receiver};

use eframe::egui;

use crate::api::live::LiveState;
use crate::api::{AspectRatio, ImageAsset, ImageSize, Resolution, Role, VideoModel};
use crate::app::{AppEvent, AppPhase, KeeperTab, Keepers, VideoModeKind};
use crate::config::load_config;

pub struct KeepersApp {
    state: Keepers,
    rx: Receiver<AppEvent>,
    dojo_texture: Option<egui::TextureHandle>,
    dojo_texture_rev: u64,
}

impl KeepersApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let (tx, rx) = mpsc::channel();
        let state = Keepers::new(cc.egui_ctx.clone(), tx, load_config());
        Self {
            state,
            rx,
            dojo_texture: None,
            dojo_texture_rev: 0,
        }
    }

    fn key_prompt(&mut self, ctx: &egui::Context) {
        egui::Window::new("Pyramid Access")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("The Keepers need a Gemini API key to open the sanctuary.");
                ui.add(
                    egui::TextEdit::singleline(&mut self.state.key_input)
                        .password(true)
                        .hint_text("API key"),
                );
                if ui.button("Unlock").clicked() {
                    self.state.save_api_key();
                }
            });
    }

    fn tab_strip(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("The Pyramid Keepers");
            ui.separator();
            for tab in KeeperTab::ALL {
                if ui
                    .selectable_label(self.state.tab == tab, tab.label())
                    .clicked()
                {
                    self.state.switch_tab(tab);
                }
            }
        });
    }

    fn error_panel(&mut self, ui: &mut egui::Ui) {
        ui.colored_label(egui::Color32::LIGHT_RED, "⚠ The Gyroscope wobbled!");
        ui.label(&self.state.error_message);
        ui.horizontal(|ui| {
            if ui.button("Recalibrate").clicked() {
                self.state.recalibrate();
            }
            if ui.button("Start over").clicked() {
                self.state.start_over();
            }
        });
    }

    fn loading_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label("The Gyroscope is humming...");
            if self.state.tab == KeeperTab::Tata && ui.button("Cancel").clicked() {
                self.state.cancel_video();
            }
        });
    }

    fn transcript(ui: &mut egui::Ui, messages: &[crate::api::ChatMessage]) {
        egui::ScrollArea::vertical()
            .auto_shrink([false, true])
            .max_height(ui.available_height() - 80.0)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for msg in messages {
                    let who = match msg.role {
                        Role::User => "You",
                        Role::Model => "Keeper",
                    };
                    ui.label(egui::RichText::new(who).strong());
                    ui.label(&msg.text);
                    for citation in &msg.citations {
                        ui.hyperlink_to(&citation.title, &citation.uri);
                    }
                    ui.add_space(8.0);
                }
            });
    }

    fn obi_tab(&mut self, ui: &mut egui::Ui) {
        Self::transcript(ui, &self.state.chat_transcript);
        ui.separator();
        ui.checkbox(&mut self.state.thinking, "Deep thinking patterns");
        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.state.input)
                    .hint_text("Ask Obi about the pyramid...")
                    .desired_width(ui.available_width() - 80.0),
            );
            let submitted =
                response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if (ui.button("Send").clicked() || submitted)
                && self.state.phase != AppPhase::Loading
            {
                self.state.send_chat_message();
            }
        });
    }

    fn tata_tab(&mut self, ui: &mut egui::Ui) {
        if self.state.phase == AppPhase::Success {
            if let Some(path) = self.state.video_result.as_ref().map(|r| r.path.clone()) {
                ui.label(format!("Clip ready: {}", path.display()));
                ui.horizontal(|ui| {
                    if ui.button("▶ Open").clicked() {
                        if let Err(e) = open::that(&path) {
                            eprintln!("[Video] failed to open player: {}", e);
                        }
                    }
                    if ui.button("Extend this clip").clicked() {
                        self.state.extend_video();
                    }
                    if ui.button("New journey").clicked() {
                        self.state.phase = AppPhase::Idle;
                    }
                });
                return;
            }
        }

        egui::ComboBox::from_label("Mode")
            .selected_text(self.state.video_form.mode.label())
            .show_ui(ui, |ui| {
                for mode in VideoModeKind::ALL {
                    ui.selectable_value(&mut self.state.video_form.mode, mode, mode.label());
                }
            });
        egui::ComboBox::from_label("Model")
            .selected_text(self.state.video_form.model.label())
            .show_ui(ui, |ui| {
                for model in [VideoModel::VeoFast, VideoModel::Veo] {
                    ui.selectable_value(&mut self.state.video_form.model, model, model.label());
                }
            });
        // The source clip dictates framing when extending.
        let extend = self.state.video_form.mode == VideoModeKind::Extend;
        ui.add_enabled_ui(!extend, |ui| {
            egui::ComboBox::from_label("Aspect ratio")
                .selected_text(self.state.video_form.aspect_ratio.as_str())
                .show_ui(ui, |ui| {
                    for ratio in AspectRatio::ALL {
                        ui.selectable_value(
                            &mut self.state.video_form.aspect_ratio,
                            ratio,
                            ratio.as_str(),
                        );
                    }
                });
        });
        egui::ComboBox::from_label("Resolution")
            .selected_text(self.state.video_form.resolution.as_str())
            .show_ui(ui, |ui| {
                for res in [Resolution::P720, Resolution::P1080] {
                    ui.selectable_value(&mut self.state.video_form.resolution, res, res.as_str());
                }
            });

        match self.state.video_form.mode {
            VideoModeKind::Frames => {
                ui.horizontal(|ui| {
                    ui.label("Start frame:");
                    ui.text_edit_singleline(&mut self.state.video_form.start_frame_path);
                    if ui.button("Attach").clicked() {
                        attach_asset(
                            &self.state.video_form.start_frame_path.clone(),
                            &mut self.state.video_form.start_frame,
                        );
                    }
                    if let Some(asset) = &self.state.video_form.start_frame {
                        ui.label(asset.file_name());
                    }
                });
                ui.checkbox(&mut self.state.video_form.looping, "Loop (end = start)");
                if !self.state.video_form.looping {
                    ui.horizontal(|ui| {
                        ui.label("End frame:");
                        ui.text_edit_singleline(&mut self.state.video_form.end_frame_path);
                        if ui.button("Attach").clicked() {
                            attach_asset(
                                &self.state.video_form.end_frame_path.clone(),
                                &mut self.state.video_form.end_frame,
                            );
                        }
                        if let Some(asset) = &self.state.video_form.end_frame {
                            ui.label(asset.file_name());
                        }
                    });
                }
            }
            VideoModeKind::References => {
                ui.horizontal(|ui| {
                    ui.label("Reference image:");
                    ui.text_edit_singleline(&mut self.state.video_form.reference_path);
                    let full = self.state.video_form.references.len() >= 3;
                    if ui.add_enabled(!full, egui::Button::new("Add")).clicked() {
                        let path = self.state.video_form.reference_path.clone();
                        match ImageAsset::from_path(std::path::Path::new(path.trim())) {
                            Ok(asset) => {
                                self.state.video_form.references.push(asset);
                                self.state.video_form.reference_path.clear();
                            }
                            Err(e) => eprintln!("[Video] could not attach reference: {}", e),
                        }
                    }
                });
                let mut remove = None;
                for (i, reference) in self.state.video_form.references.iter().enumerate() {
                    ui.horizontal(|ui| {
                        ui.label(reference.file_name());
                        if ui.small_button("✖").clicked() {
                            remove = Some(i);
                        }
                    });
                }
                if let Some(i) = remove {
                    self.state.video_form.references.remove(i);
                }
            }
            VideoModeKind::Extend => {
                match &self.state.video_result {
                    Some(result) => {
                        ui.label(format!("Extending: {}", result.path.display()));
                    }
                    None => {
                        ui.label("Complete a generation first, then extend it.");
                    }
                };
            }
            VideoModeKind::Text => {}
        }

        ui.separator();
        ui.add(
            egui::TextEdit::multiline(&mut self.state.input)
                .hint_text("Describe the Keepers' next adventure...")
                .desired_rows(3),
        );
        if ui.button("🎬 Generate").clicked() && self.state.phase != AppPhase::Loading {
            self.state.start_video();
        }
    }

    fn atlas_tab(&mut self, ui: &mut egui::Ui) {
        Self::transcript(ui, &self.state.atlas_transcript);
        ui.separator();
        ui.add(
            egui::TextEdit::singleline(&mut self.state.input)
                .hint_text("Where does Atlas's compass point?")
                .desired_width(f32::INFINITY),
        );
        ui.horizontal(|ui| {
            let busy = self.state.phase == AppPhase::Loading;
            if ui.add_enabled(!busy, egui::Button::new("🌐 Global Search")).clicked() {
                self.state.send_search();
            }
            if ui.add_enabled(!busy, egui::Button::new("📍 Nearby Maps")).clicked() {
                self.state.send_maps();
            }
        });
    }

    fn arkadas_tab(&mut self, ui: &mut egui::Ui) {
        ui.label("Arkadaş translates everything into friendly sound.");
        ui.add_space(8.0);

        let live_state = self.state.live_state();
        let live_label = match live_state {
            LiveState::Disconnected => "🎤 Start voice session",
            LiveState::Connecting => "⏳ Connecting...",
            LiveState::Active => "⏹ End voice session",
        };
        if ui.button(live_label).clicked() && live_state != LiveState::Connecting {
            self.state.toggle_live();
        }
        if live_state == LiveState::Active {
            ui.label("Speak freely; interrupting Arkadaş is allowed.");
        }
        if live_state != LiveState::Disconnected {
            // Keep polling session state while a call is up.
            ui.ctx().request_repaint_after(std::time::Duration::from_millis(250));
        }

        ui.separator();
        ui.add(
            egui::TextEdit::singleline(&mut self.state.input)
                .hint_text("Text for Arkadaş to speak aloud")
                .desired_width(f32::INFINITY),
        );
        if ui.button("🔊 Speak").clicked() && self.state.phase != AppPhase::Loading {
            self.state.speak();
        }
    }

    fn dojo_tab(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        if self.dojo_texture_rev != self.state.image_rev {
            self.dojo_texture_rev = self.state.image_rev;
            self.dojo_texture = self
                .state
                .generated_image
                .as_deref()
                .and_then(|bytes| decode_texture(ctx, bytes));
        }

        if let Some(texture) = &self.dojo_texture {
            let available = ui.available_width().min(512.0);
            let size = texture.size_vec2();
            let scale = (available / size.x).min(1.0);
            ui.image((texture.id(), size * scale));
            if ui.button("Clear").clicked() {
                self.state.generated_image = None;
                self.state.image_rev += 1;
            }
            ui.separator();
        }

        ui.horizontal(|ui| {
            ui.label("Input image:");
            ui.text_edit_singleline(&mut self.state.dojo_input_path);
            if ui.button("Attach").clicked() {
                attach_asset(
                    &self.state.dojo_input_path.clone(),
                    &mut self.state.dojo_input,
                );
            }
            if let Some(asset) = &self.state.dojo_input {
                ui.label(asset.file_name());
            }
        });

        ui.add(
            egui::TextEdit::multiline(&mut self.state.input)
                .hint_text("What should take shape in the Dojo?")
                .desired_rows(2),
        );
        ui.horizontal(|ui| {
            let busy = self.state.phase == AppPhase::Loading;
            for (size, label) in [
                (ImageSize::K1, "Generate 1K"),
                (ImageSize::K2, "Generate 2K"),
                (ImageSize::K4, "Generate 4K"),
            ] {
                if ui.add_enabled(!busy, egui::Button::new(label)).clicked() {
                    self.state.generate_dojo_image(size);
                }
            }
            let can_edit = !busy && self.state.dojo_input.is_some();
            if ui
                .add_enabled(can_edit, egui::Button::new("✨ Magic Edit"))
                .clicked()
            {
                self.state.edit_dojo_image();
            }
        });
    }
}

impl eframe::App for KeepersApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(event) = self.rx.try_recv() {
            self.state.apply(event);
        }

        if self.state.show_key_prompt {
            self.key_prompt(ctx);
        }

        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            self.tab_strip(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            match self.state.phase {
                AppPhase::Error => {
                    self.error_panel(ui);
                    return;
                }
                AppPhase::Loading => {
                    self.loading_panel(ui);
                    ui.separator();
                }
                _ => {}
            }
            match self.state.tab {
                KeeperTab::Obi => self.obi_tab(ui),
                KeeperTab::Tata => self.tata_tab(ui),
                KeeperTab::Atlas => self.atlas_tab(ui),
                KeeperTab::Arkadas => self.arkadas_tab(ui),
                KeeperTab::Dojo => self.dojo_tab(ui, ctx),
            }
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.state.shutdown();
    }
}

/// Read an image path into an asset slot, logging instead of failing the
/// frame when the file is unusable.
fn attach_asset(path: &str, slot: &mut Option<ImageAsset>) {
    match ImageAsset::from_path(std::path::Path::new(path.trim())) {
        Ok(asset) => *slot = Some(asset),
        Err(e) => eprintln!("[Dojo] could not attach image: {}", e),
    }
}

fn decode_texture(ctx: &egui::Context, bytes: &[u8]) -> Option<egui::TextureHandle> {
    let decoded = match image::load_from_memory(bytes) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            eprintln!("[Dojo] failed to decode image: {}", e);
            return None;
        }
    };
    let size = [decoded.width() as usize, decoded.height() as usize];
    let color = egui::ColorImage::from_rgba_unmultiplied(size, decoded.as_raw());
    Some(ctx.load_texture("dojo-image", color, egui::TextureOptions::LINEAR))
}
