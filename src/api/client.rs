//! Shared HTTP plumbing for the Gemini REST endpoints.

use lazy_static::lazy_static;
use std::time::Duration;

use super::error::ApiError;

/// Base URL for the generative language service. Overridable per call so
/// tests can point the orchestrator at a local mock server.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

lazy_static! {
    pub static ref UREQ_AGENT: ureq::Agent = {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(120)))
            .build();
        config.into()
    };
}

/// POST a `generateContent` payload to the given model and return the raw
/// response JSON. All one-shot endpoints (chat, search, maps, image, TTS)
/// share this call shape.
pub fn generate_content(
    base_url: &str,
    api_key: &str,
    model: &str,
    payload: serde_json::Value,
) -> Result<serde_json::Value, ApiError> {
    let url = format!("{}/v1beta/models/{}:generateContent", base_url, model);
    let resp = UREQ_AGENT
        .post(&url)
        .header("x-goog-api-key", api_key)
        .send_json(payload)?;
    resp.into_body()
        .read_json::<serde_json::Value>()
        .map_err(ApiError::from)
}

/// Concatenate the text parts of the first candidate, skipping thought
/// parts. Returns None when the response carries no text at all.
pub fn extract_text(response: &serde_json::Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let mut text = String::new();
    for part in parts {
        if part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false) {
            continue;
        }
        if let Some(chunk) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(chunk);
        }
    }
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_text_joins_parts_and_skips_thoughts() {
        let resp = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "thought": true, "text": "pondering..." },
                        { "text": "The pyramid " },
                        { "text": "glows." }
                    ]
                }
            }]
        });
        assert_eq!(extract_text(&resp).as_deref(), Some("The pyramid glows."));
    }

    #[test]
    fn extract_text_handles_empty_response() {
        assert_eq!(extract_text(&json!({})), None);
        assert_eq!(extract_text(&json!({"candidates": []})), None);
    }
}
