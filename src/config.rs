//! Persistent settings, stored as JSON in the platform config directory.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini_api_key: String,

    pub chat_model: String,
    pub search_model: String,
    pub maps_model: String,
    pub image_model: String,
    pub edit_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub live_model: String,
    pub live_voice: String,

    pub poll_interval_secs: u64,
    pub max_poll_secs: u64,

    /// Optional location bias for the maps tab. Absent falls back to the
    /// built-in default coordinate.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            chat_model: "gemini-3-pro-preview".to_string(),
            search_model: "gemini-3-flash-preview".to_string(),
            maps_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-3-pro-image-preview".to_string(),
            edit_model: "gemini-2.5-flash-image".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            tts_voice: "Kore".to_string(),
            live_model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            live_voice: "Zephyr".to_string(),
            poll_interval_secs: 10,
            max_poll_secs: 600,
            latitude: None,
            longitude: None,
        }
    }
}

impl Config {
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty()
    }
}

fn config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("pyramid-keepers");
    Ok(dir.join("config.json"))
}

/// Load the saved config, falling back to defaults when none exists or the
/// file is unreadable.
pub fn load_config() -> Config {
    let Ok(path) = config_path() else {
        return Config::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            eprintln!("[Config] failed to parse {}: {}", path.display(), e);
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

pub fn save_config(config: &Config) -> Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    Ok(())
}
