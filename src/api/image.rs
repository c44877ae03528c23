//! Still-image generation and prompt-based image editing for the Dojo tab.

use super::client::generate_content;
use super::error::ApiError;
use super::types::{AspectRatio, ImageAsset, ImageSize};

/// Generate a still image at the requested aspect ratio and resolution tier.
/// Returns the raw encoded image bytes (PNG unless the service says otherwise).
pub fn generate_image(
    base_url: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
    aspect_ratio: AspectRatio,
    size: ImageSize,
) -> Result<Vec<u8>, ApiError> {
    let payload = serde_json::json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "imageConfig": {
                "aspectRatio": aspect_ratio.as_str(),
                "imageSize": size.as_str(),
            },
        },
    });
    let response = generate_content(base_url, api_key, model, payload)?;
    first_inline_image(&response)
        .ok_or_else(|| ApiError::EmptyResult("no image data returned from Dojo".to_string()))
}

/// Edit an existing image with a prompt. The input image travels inline with
/// the request.
pub fn edit_image(
    base_url: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
    input: &ImageAsset,
) -> Result<Vec<u8>, ApiError> {
    let payload = serde_json::json!({
        "contents": [{
            "parts": [
                { "inlineData": { "data": input.base64, "mimeType": input.mime_type } },
                { "text": prompt },
            ],
        }],
    });
    let response = generate_content(base_url, api_key, model, payload)?;
    first_inline_image(&response)
        .ok_or_else(|| ApiError::EmptyResult("no edited image data returned from Dojo".to_string()))
}

/// The first inline-data part of the first candidate, base64-decoded.
fn first_inline_image(response: &serde_json::Value) -> Option<Vec<u8>> {
    let parts = response
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    for part in parts {
        if let Some(data) = part
            .get("inlineData")
            .and_then(|d| d.get("data"))
            .and_then(|d| d.as_str())
        {
            if let Ok(bytes) = crate::pcm::decode_base64(data) {
                return Some(bytes);
            }
        }
    }
    None
}
