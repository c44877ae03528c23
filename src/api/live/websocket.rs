//! WebSocket framing for the bidirectional voice session: TLS connect,
//! setup message, realtime audio input and server event parsing.

use anyhow::Result;
use native_tls::TlsStream;
use std::net::TcpStream;
use std::time::Duration;
use tungstenite::WebSocket;

use crate::pcm;

pub type LiveSocket = WebSocket<TlsStream<TcpStream>>;

/// Mime tag for outgoing microphone chunks.
pub const INPUT_MIME: &str = "audio/pcm;rate=16000";

/// Create a TLS WebSocket connection to the bidirectional voice endpoint.
pub fn connect_live_websocket(api_key: &str) -> Result<LiveSocket> {
    let ws_url = format!(
        "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key={}",
        api_key
    );

    let url = url::Url::parse(&ws_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("No host in URL"))?;
    let port = 443;

    use std::net::ToSocketAddrs;
    let addr = format!("{}:{}", host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve hostname: {}", host))?;

    let tcp_stream = TcpStream::connect_timeout(&addr, Duration::from_secs(10))?;
    tcp_stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_write_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_nodelay(true)?;

    let connector = native_tls::TlsConnector::new()?;
    let tls_stream = connector.connect(host, tcp_stream)?;

    let (socket, _response) = tungstenite::client::client(&ws_url, tls_stream)?;

    Ok(socket)
}

/// Configure the session for audio output with the chosen voice.
pub fn send_live_setup(socket: &mut LiveSocket, model: &str, voice: &str) -> Result<()> {
    let setup = serde_json::json!({
        "setup": {
            "model": format!("models/{}", model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice },
                    },
                },
            },
        }
    });

    socket.write(tungstenite::Message::Text(setup.to_string().into()))?;
    socket.flush()?;
    Ok(())
}

/// Fire-and-forget one block of 16 kHz mono PCM toward the model. No
/// backpressure is awaited; blocks go out as fast as capture produces them.
pub fn send_realtime_audio(socket: &mut LiveSocket, samples: &[i16]) -> Result<()> {
    let data = pcm::encode_base64(&pcm::samples_to_bytes(samples));
    let msg = serde_json::json!({
        "realtimeInput": {
            "mediaChunks": [{
                "mimeType": INPUT_MIME,
                "data": data,
            }],
        }
    });
    socket.write(tungstenite::Message::Text(msg.to_string().into()))?;
    socket.flush()?;
    Ok(())
}

/// Everything the worker needs to know about one inbound server message.
#[derive(Debug, PartialEq)]
pub enum ServerEvent {
    /// Raw 24 kHz mono PCM decoded from inline data.
    Audio(Vec<u8>),
    /// Barge-in: discard everything scheduled and start fresh.
    Interrupted,
    /// The model finished its turn. The session stays open.
    TurnComplete,
    Error(String),
}

/// Parse a server message into zero or more events. A single message can
/// carry audio parts and an interruption flag at the same time; audio is
/// emitted first so the interrupt clears it along with anything older.
pub fn parse_server_events(msg: &str) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    let Ok(json) = serde_json::from_str::<serde_json::Value>(msg) else {
        return events;
    };

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| error.to_string());
        events.push(ServerEvent::Error(message));
        return events;
    }

    let Some(server_content) = json.get("serverContent") else {
        return events;
    };

    if let Some(parts) = server_content
        .get("modelTurn")
        .and_then(|t| t.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(data) = part
                .get("inlineData")
                .and_then(|d| d.get("data"))
                .and_then(|d| d.as_str())
            {
                if let Ok(bytes) = pcm::decode_base64(data) {
                    if !bytes.is_empty() {
                        events.push(ServerEvent::Audio(bytes));
                    }
                }
            }
        }
    }

    if server_content
        .get("interrupted")
        .and_then(|i| i.as_bool())
        .unwrap_or(false)
    {
        events.push(ServerEvent::Interrupted);
    }

    let turn_complete = server_content
        .get("turnComplete")
        .and_then(|t| t.as_bool())
        .unwrap_or(false)
        || server_content
            .get("generationComplete")
            .and_then(|g| g.as_bool())
            .unwrap_or(false);
    if turn_complete {
        events.push(ServerEvent::TurnComplete);
    }

    events
}

/// Check if the message acknowledges session setup.
pub fn is_setup_complete(msg: &str) -> bool {
    msg.contains("setupComplete")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunks_are_decoded() {
        let pcm_bytes = pcm::samples_to_bytes(&[1, 2, 3]);
        let msg = serde_json::json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [{
                        "inlineData": {
                            "mimeType": "audio/pcm;rate=24000",
                            "data": pcm::encode_base64(&pcm_bytes)
                        }
                    }]
                }
            }
        });
        let events = parse_server_events(&msg.to_string());
        assert_eq!(events, vec![ServerEvent::Audio(pcm_bytes)]);
    }

    #[test]
    fn interruption_follows_audio_in_the_same_message() {
        let msg = serde_json::json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [{
                        "inlineData": { "data": pcm::encode_base64(&[0u8, 1]) }
                    }]
                },
                "interrupted": true
            }
        });
        let events = parse_server_events(&msg.to_string());
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ServerEvent::Audio(_)));
        assert_eq!(events[1], ServerEvent::Interrupted);
    }

    #[test]
    fn turn_complete_and_errors_are_reported() {
        let events =
            parse_server_events(r#"{"serverContent":{"turnComplete":true}}"#);
        assert_eq!(events, vec![ServerEvent::TurnComplete]);

        let events = parse_server_events(r#"{"error":{"message":"quota"}}"#);
        assert_eq!(events, vec![ServerEvent::Error("quota".to_string())]);
    }

    #[test]
    fn unrelated_messages_produce_no_events() {
        assert!(parse_server_events(r#"{"setupComplete":{}}"#).is_empty());
        assert!(parse_server_events("not json").is_empty());
        assert!(is_setup_complete(r#"{"setupComplete":{}}"#));
    }
}
