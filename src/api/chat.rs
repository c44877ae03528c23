//! Chat, web-grounded search and location-grounded search.

use super::client::{extract_text, generate_content};
use super::error::ApiError;
use super::types::{ChatMessage, Citation};

const OBI_PERSONA: &str = "You are Obi, the Observer Keeper of the Sacred Crystal Pyramid. \
You see all patterns and memories. Speak with wisdom and warmth. If asked complex questions, \
use your deep thinking patterns. Your catchphrase is 'Ooh, I remember! I've seen this before!'";

const ATLAS_SEARCH_PERSONA: &str = "You are Atlas, the Map Keeper. Use your compass nose and \
golden map walls to find real-time information. Your catchphrase is 'Oh! That connects to THIS!'";

const ATLAS_MAPS_PERSONA: &str = "You are Atlas, using your golden maps to find exact locations \
and reviews nearby. Your compass nose spins wildly when you find a shortcut!";

/// Shown when the model returns a turn with no text.
const OBI_SILENT: &str = "Obi is momentarily silent, observing the memory bubbles...";

/// Extended-thinking token budget for the Obi toggle.
const THINKING_BUDGET: u32 = 32768;

/// Fallback coordinate when no device location source is configured
/// (downtown San Francisco, matching the service examples).
pub const FALLBACK_LATITUDE: f64 = 37.78193;
pub const FALLBACK_LONGITUDE: f64 = -122.40476;

/// One conversational turn with the full transcript as context.
pub fn chat(
    base_url: &str,
    api_key: &str,
    model: &str,
    history: &[ChatMessage],
    prompt: &str,
    thinking: bool,
) -> Result<String, ApiError> {
    let mut contents: Vec<serde_json::Value> = history
        .iter()
        .map(|msg| {
            serde_json::json!({
                "role": msg.role.as_str(),
                "parts": [{ "text": msg.text }],
            })
        })
        .collect();
    contents.push(serde_json::json!({
        "role": "user",
        "parts": [{ "text": prompt }],
    }));

    let mut payload = serde_json::json!({
        "contents": contents,
        "systemInstruction": { "parts": [{ "text": OBI_PERSONA }] },
    });
    if thinking {
        payload["generationConfig"] = serde_json::json!({
            "thinkingConfig": { "thinkingBudget": THINKING_BUDGET },
        });
    }

    let response = generate_content(base_url, api_key, model, payload)?;
    Ok(extract_text(&response).unwrap_or_else(|| OBI_SILENT.to_string()))
}

/// Web-grounded answer with citations in service order.
pub fn grounded_search(
    base_url: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
) -> Result<(String, Vec<Citation>), ApiError> {
    let payload = serde_json::json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "tools": [{ "google_search": {} }],
        "systemInstruction": { "parts": [{ "text": ATLAS_SEARCH_PERSONA }] },
    });
    let response = generate_content(base_url, api_key, model, payload)?;
    let text = extract_text(&response)
        .ok_or_else(|| ApiError::EmptyResult("the search returned no answer".to_string()))?;
    let citations = extract_citations(&response, "web", "Source");
    Ok((text, citations))
}

/// Build the maps payload. The latitude/longitude bias falls back to the
/// fixed default coordinate when no location source is available.
pub fn maps_payload(prompt: &str, location: Option<(f64, f64)>) -> serde_json::Value {
    let (lat, lng) = location.unwrap_or((FALLBACK_LATITUDE, FALLBACK_LONGITUDE));
    serde_json::json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "tools": [{ "google_maps": {} }],
        "toolConfig": {
            "retrievalConfig": {
                "latLng": { "latitude": lat, "longitude": lng },
            },
        },
        "systemInstruction": { "parts": [{ "text": ATLAS_MAPS_PERSONA }] },
    })
}

/// Location-grounded answer with map citations.
pub fn grounded_maps(
    base_url: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
    location: Option<(f64, f64)>,
) -> Result<(String, Vec<Citation>), ApiError> {
    let response = generate_content(base_url, api_key, model, maps_payload(prompt, location))?;
    let text = extract_text(&response)
        .ok_or_else(|| ApiError::EmptyResult("the maps search returned no answer".to_string()))?;
    let citations = extract_citations(&response, "maps", "Map Location");
    Ok((text, citations))
}

/// Pull `{uri, title}` pairs from the first candidate's grounding chunks,
/// keeping insertion order. `kind` selects the chunk flavor ("web"/"maps").
fn extract_citations(
    response: &serde_json::Value,
    kind: &str,
    default_title: &str,
) -> Vec<Citation> {
    let chunks = response
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("groundingMetadata"))
        .and_then(|m| m.get("groundingChunks"))
        .and_then(|c| c.as_array());

    let Some(chunks) = chunks else {
        return Vec::new();
    };

    chunks
        .iter()
        .filter_map(|chunk| {
            let entry = chunk.get(kind)?;
            let uri = entry.get("uri").and_then(|u| u.as_str()).unwrap_or("");
            if uri.is_empty() {
                return None;
            }
            let title = entry
                .get("title")
                .and_then(|t| t.as_str())
                .filter(|t| !t.is_empty())
                .unwrap_or(default_title);
            Some(Citation {
                uri: uri.to_string(),
                title: title.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grounded_response() -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Pyramids nearby." }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://a.example", "title": "Giza" } },
                        { "web": { "uri": "https://b.example" } },
                        { "web": { "uri": "" } },
                        { "maps": { "uri": "https://maps.example/p1" } }
                    ]
                }
            }]
        })
    }

    #[test]
    fn citations_keep_service_order_and_skip_empty_uris() {
        let citations = extract_citations(&grounded_response(), "web", "Source");
        assert_eq!(
            citations,
            vec![
                Citation {
                    uri: "https://a.example".to_string(),
                    title: "Giza".to_string(),
                },
                Citation {
                    uri: "https://b.example".to_string(),
                    title: "Source".to_string(),
                },
            ]
        );
    }

    #[test]
    fn maps_chunks_use_the_map_default_title() {
        let citations = extract_citations(&grounded_response(), "maps", "Map Location");
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].title, "Map Location");
    }

    #[test]
    fn maps_payload_uses_fallback_coordinate_without_location() {
        let payload = maps_payload("nearby pyramids", None);
        let lat_lng = &payload["toolConfig"]["retrievalConfig"]["latLng"];
        assert_eq!(lat_lng["latitude"], FALLBACK_LATITUDE);
        assert_eq!(lat_lng["longitude"], FALLBACK_LONGITUDE);
    }

    #[test]
    fn maps_payload_honors_an_explicit_location() {
        let payload = maps_payload("nearby pyramids", Some((29.9792, 31.1342)));
        let lat_lng = &payload["toolConfig"]["retrievalConfig"]["latLng"];
        assert_eq!(lat_lng["latitude"], 29.9792);
        assert_eq!(lat_lng["longitude"], 31.1342);
    }
}
