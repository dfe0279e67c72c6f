//! # Event Decoding
//!
//! Maps assembled frames and WebSocket envelopes onto a closed, typed event
//! set. Decoding is a pure function: unknown event types become
//! [`DomainEvent::Unrecognized`] rather than failing, and the caller decides
//! whether to ignore or log them.
//!
//! ## Envelope Shapes:
//! - SSE frames: event type + JSON payload recovered by the assembler
//! - WebSocket messages: JSON with an `event` (or `type`) discriminator and
//!   the payload under `data`, under `content`, or flattened into the object

use crate::error::{EngineError, EngineResult};
use crate::stream::assembler::Frame;
use serde_json::Value;

/// One decoded event from the inbound stream.
///
/// The variant set is closed: every recognized wire event maps to exactly one
/// variant, and everything else lands in `Unrecognized` with its payload
/// preserved for the collaborator's debug surface.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// Beginning of an assistant message
    MessageStart {
        message_id: Option<String>,
        thread_id: Option<String>,
    },
    /// A content block opened
    ContentStart { index: Option<u64> },
    /// Streaming text appended to the current content block
    ContentDelta { text: String },
    /// A content block closed
    ContentComplete { index: Option<u64> },
    /// Assistant message finished
    MessageStop { stop_reason: Option<String> },
    /// Message metadata update mid-stream
    MessageDelta { stop_reason: Option<String> },
    /// Token usage statistics
    Usage {
        input_tokens: u64,
        output_tokens: u64,
        model: Option<String>,
    },
    /// Connection acknowledgment carrying the server-assigned thread
    ConnectionInfo {
        thread_id: Option<String>,
        agent_name: Option<String>,
    },

    /// Server acknowledged a voice session and assigned its id
    SessionCreated {
        session_id: String,
        agent_id: Option<String>,
        thread_id: Option<String>,
    },
    /// Server-side session state change notification
    SessionStateChanged { state: String },
    /// Voice session ended
    SessionEnded { reason: Option<String> },

    /// A user/agent turn opened
    TurnStart {
        turn_id: Option<String>,
        speaker: Option<String>,
    },
    /// A turn closed with its final transcription
    TurnEnd {
        turn_id: Option<String>,
        text: Option<String>,
    },
    /// In-flight turn truncated; playback must be interrupted
    TurnInterrupt {
        turn_id: Option<String>,
        reason: Option<String>,
    },

    /// Agent began producing a response
    AgentResponseStart { response_id: Option<String> },
    /// Accumulated agent response text so far
    AgentResponseStream { text: String },
    /// Agent response finished
    AgentResponseEnd {
        response_id: Option<String>,
        text: Option<String>,
    },
    /// Agent response failed
    AgentResponseError {
        message: String,
        code: Option<String>,
    },

    /// Synthesized speech output began
    AudioOutputStart {
        response_id: Option<String>,
        voice: Option<String>,
    },
    /// One base64 audio chunk for the voice playback channel
    AudioOutputChunk {
        audio_data: String,
        chunk_index: Option<u64>,
        is_final: bool,
    },
    /// Synthesized speech output finished
    AudioOutputEnd {
        response_id: Option<String>,
        total_chunks: Option<u64>,
    },
    /// Synthesized speech output failed
    AudioOutputError { message: String },

    /// Transcription of captured input (final or partial)
    InputTranscription {
        text: String,
        partial: bool,
        turn_id: Option<String>,
        confidence: Option<f64>,
    },
    /// A message was persisted on the server side
    MessageCreated {
        message_id: Option<String>,
        role: Option<String>,
        content: Option<String>,
    },

    /// Server created a translation session
    TranslationSessionStart {
        session_id: String,
        language_a: Option<String>,
        language_b: Option<String>,
        enable_tts: Option<bool>,
    },
    /// One translation result, optionally with synthesized audio
    TranslationResult {
        original_text: String,
        translated_text: String,
        original_language: Option<String>,
        target_language: Option<String>,
        confidence: Option<f64>,
        tts_audio: Option<String>,
    },
    /// Translation session finished
    TranslationComplete { total_translations: u64 },
    /// Translation session reported an error
    TranslationError { message: String },
    /// Translation session ended
    TranslationSessionEnd,

    /// Agent requests human approval for tool use
    HumanApprovalRequest { tools: Vec<ApprovalTool> },
    /// Server acknowledged a cancel request
    CancelAcknowledged { message: Option<String> },

    /// Heartbeat request
    Ping { timestamp: Option<u64> },
    /// Heartbeat response
    Pong,

    /// Explicit server-sent error event
    ErrorEvent {
        kind: Option<String>,
        message: String,
    },

    /// Fallback for event types outside the recognized set
    Unrecognized { event_type: String, payload: Value },
}

/// One tool awaiting approval in a human-approval request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalTool {
    pub name: String,
    pub args: Value,
}

/// Decode an assembled SSE frame.
pub fn decode_frame(frame: &Frame) -> DomainEvent {
    decode_parts(&frame.event_type, &frame.data)
}

/// Decode a WebSocket text message.
///
/// Accepts both discriminator spellings (`event` and `type`); the payload is
/// taken from `data`, then `content`, then the envelope itself.
pub fn decode_envelope(text: &str) -> EngineResult<DomainEvent> {
    let envelope: Value = serde_json::from_str(text)?;

    let event_type = envelope
        .get("event")
        .or_else(|| envelope.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            EngineError::MalformedFrame("envelope missing event discriminator".to_string())
        })?
        .to_string();

    let payload = envelope
        .get("data")
        .or_else(|| envelope.get("content"))
        .filter(|v| !v.is_null())
        .unwrap_or(&envelope);

    Ok(decode_parts(&event_type, payload))
}

/// Map one (event type, payload) pair onto the variant set.
fn decode_parts(event_type: &str, payload: &Value) -> DomainEvent {
    match event_type {
        "message_start" => DomainEvent::MessageStart {
            message_id: get_str(&payload["message"], &["id", "message_id"]),
            thread_id: get_str(payload, &["thread_id"]),
        },
        "content_block" => decode_content_block(event_type, payload),
        "message_stop" => DomainEvent::MessageStop {
            stop_reason: get_str(payload, &["stop_reason"]),
        },
        "message_delta" => DomainEvent::MessageDelta {
            stop_reason: get_str(&payload["delta"], &["stop_reason"]),
        },
        "usage_metadata" => DomainEvent::Usage {
            input_tokens: get_u64(&payload["usage"], &["input_tokens"]).unwrap_or(0),
            output_tokens: get_u64(&payload["usage"], &["output_tokens"]).unwrap_or(0),
            model: get_str(payload, &["model"]),
        },
        "connection" => DomainEvent::ConnectionInfo {
            thread_id: get_str(payload, &["thread_id"]),
            agent_name: get_str(payload, &["agent_name", "agent_id"]),
        },
        "human_approval" => decode_human_approval(payload),
        "cancel_acknowledged" => DomainEvent::CancelAcknowledged {
            message: get_str(payload, &["message"]),
        },
        "error" => DomainEvent::ErrorEvent {
            kind: get_str(payload, &["type", "error_type", "error_code"]),
            message: get_str(payload, &["message", "error"])
                .unwrap_or_else(|| payload.to_string()),
        },

        "VOICE_SESSION_CREATED" => match get_str(payload, &["session_id"]) {
            Some(session_id) => DomainEvent::SessionCreated {
                session_id,
                agent_id: get_str(payload, &["agent_id"]),
                thread_id: get_str(payload, &["thread_id"]),
            },
            None => unrecognized(event_type, payload),
        },
        "VOICE_SESSION_STATE_CHANGED" => match get_str(payload, &["state"]) {
            Some(state) => DomainEvent::SessionStateChanged { state },
            None => unrecognized(event_type, payload),
        },
        "VOICE_SESSION_ENDED" => DomainEvent::SessionEnded {
            reason: get_str(payload, &["reason"]),
        },
        "VOICE_TURN_START" => DomainEvent::TurnStart {
            turn_id: get_str(payload, &["turn_id"]),
            speaker: get_str(payload, &["speaker"]),
        },
        "VOICE_TURN_END" => DomainEvent::TurnEnd {
            turn_id: get_str(payload, &["turn_id"]),
            text: get_str(payload, &["text"]),
        },
        "VOICE_TURN_INTERRUPT" => DomainEvent::TurnInterrupt {
            turn_id: get_str(payload, &["turn_id"]),
            reason: get_str(payload, &["reason"]),
        },
        "VOICE_AGENT_RESPONSE_START" => DomainEvent::AgentResponseStart {
            response_id: get_str(payload, &["response_id"]),
        },
        "VOICE_AGENT_RESPONSE_STREAM" => DomainEvent::AgentResponseStream {
            text: get_str(payload, &["accumulated_text", "text", "text_chunk"])
                .unwrap_or_default(),
        },
        "VOICE_AGENT_RESPONSE_END" => DomainEvent::AgentResponseEnd {
            response_id: get_str(payload, &["response_id"]),
            text: get_str(payload, &["total_text", "text"]),
        },
        "VOICE_AGENT_RESPONSE_ERROR" => DomainEvent::AgentResponseError {
            message: get_str(payload, &["error", "message"]).unwrap_or_default(),
            code: get_str(payload, &["error_code"]),
        },
        "VOICE_OUTPUT_START" => DomainEvent::AudioOutputStart {
            response_id: get_str(payload, &["response_id"]),
            voice: get_str(payload, &["voice"]),
        },
        "VOICE_OUTPUT_AUDIO" => match get_str(payload, &["audio_data"]) {
            Some(audio_data) => DomainEvent::AudioOutputChunk {
                audio_data,
                chunk_index: get_u64(payload, &["chunk_index"]),
                is_final: get_bool(payload, &["is_final"]).unwrap_or(false),
            },
            None => unrecognized(event_type, payload),
        },
        "VOICE_OUTPUT_END" => DomainEvent::AudioOutputEnd {
            response_id: get_str(payload, &["response_id"]),
            total_chunks: get_u64(payload, &["total_chunks"]),
        },
        "VOICE_OUTPUT_ERROR" => DomainEvent::AudioOutputError {
            message: get_str(payload, &["error", "message"]).unwrap_or_default(),
        },
        "VOICE_INPUT_TRANSCRIPTION" => decode_transcription(payload, false),
        "VOICE_TRANSCRIPTION_PARTIAL" => decode_transcription(payload, true),
        "VOICE_MESSAGE_CREATED" => DomainEvent::MessageCreated {
            message_id: get_str(payload, &["message_id"]),
            role: get_str(payload, &["role"]),
            content: get_str(payload, &["content"]),
        },
        "VOICE_ERROR" => DomainEvent::ErrorEvent {
            kind: get_str(payload, &["error_type", "error_code"]),
            message: get_str(payload, &["error", "message"]).unwrap_or_default(),
        },

        "TRANSLATION_SESSION_START" => match get_str(payload, &["session_id"]) {
            Some(session_id) => DomainEvent::TranslationSessionStart {
                session_id,
                language_a: get_str(payload, &["language_a"]),
                language_b: get_str(payload, &["language_b"]),
                enable_tts: get_bool(payload, &["enable_tts"]),
            },
            None => unrecognized(event_type, payload),
        },
        "TRANSLATION_RESULT" => DomainEvent::TranslationResult {
            original_text: get_str(payload, &["original_text"]).unwrap_or_default(),
            translated_text: get_str(payload, &["translated_text"]).unwrap_or_default(),
            original_language: get_str(payload, &["original_language"]),
            target_language: get_str(payload, &["target_language"]),
            confidence: get_f64(payload, &["confidence"]),
            tts_audio: get_str(payload, &["tts_audio"]),
        },
        "TRANSLATION_COMPLETE" => DomainEvent::TranslationComplete {
            total_translations: get_u64(payload, &["total_translations"]).unwrap_or(0),
        },
        "TRANSLATION_SESSION_ERROR" => DomainEvent::TranslationError {
            message: get_str(payload, &["error", "message"]).unwrap_or_default(),
        },
        "TRANSLATION_SESSION_END" => DomainEvent::TranslationSessionEnd,

        "ping" | "PING" => DomainEvent::Ping {
            timestamp: get_u64(payload, &["timestamp"]),
        },
        "pong" | "PONG" => DomainEvent::Pong,

        _ => unrecognized(event_type, payload),
    }
}

/// Content blocks carry a `state` marker; only text blocks are typed here.
fn decode_content_block(event_type: &str, payload: &Value) -> DomainEvent {
    let content_type = payload
        .get("content_type")
        .and_then(Value::as_str)
        .unwrap_or("text");
    if content_type != "text" {
        return unrecognized(event_type, payload);
    }

    match payload.get("state").and_then(Value::as_str) {
        Some("start") => DomainEvent::ContentStart {
            index: get_u64(payload, &["index"]),
        },
        Some("delta") => DomainEvent::ContentDelta {
            text: get_str(&payload["data"], &["text"]).unwrap_or_default(),
        },
        Some("complete") => DomainEvent::ContentComplete {
            index: get_u64(payload, &["index"]),
        },
        _ => unrecognized(event_type, payload),
    }
}

fn decode_human_approval(payload: &Value) -> DomainEvent {
    let tools = payload["data"]["tools"]
        .as_array()
        .or_else(|| payload["tools"].as_array())
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| {
                    Some(ApprovalTool {
                        name: tool.get("name")?.as_str()?.to_string(),
                        args: tool.get("args").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    DomainEvent::HumanApprovalRequest { tools }
}

fn decode_transcription(payload: &Value, partial: bool) -> DomainEvent {
    DomainEvent::InputTranscription {
        text: get_str(payload, &["text"]).unwrap_or_default(),
        partial,
        turn_id: get_str(payload, &["turn_id"]),
        confidence: get_f64(payload, &["confidence"]),
    }
}

fn unrecognized(event_type: &str, payload: &Value) -> DomainEvent {
    DomainEvent::Unrecognized {
        event_type: event_type.to_string(),
        payload: payload.clone(),
    }
}

fn get_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

fn get_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| value.get(key).and_then(Value::as_u64))
}

fn get_bool(value: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| value.get(key).and_then(Value::as_bool))
}

fn get_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| value.get(key).and_then(Value::as_f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::assembler::FrameAssembler;
    use serde_json::json;

    #[test]
    fn test_sse_scenario_two_events() {
        // The two-call mid-frame split must decode exactly 2 events,
        // the second carrying the delta text
        let stream = "event: message_start\ndata: {\"message\":{\"id\":\"m1\"}}\n\nevent: content_block\ndata: {\"state\":\"delta\",\"data\":{\"text\":\"Hi\"}}\n\n";
        let bytes = stream.as_bytes();
        let split = 40;

        let mut assembler = FrameAssembler::new();
        let mut events: Vec<DomainEvent> = assembler
            .feed(&bytes[..split])
            .iter()
            .map(decode_frame)
            .collect();
        events.extend(assembler.feed(&bytes[split..]).iter().map(decode_frame));

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            DomainEvent::MessageStart {
                message_id: Some("m1".to_string()),
                thread_id: None,
            }
        );
        assert_eq!(
            events[1],
            DomainEvent::ContentDelta {
                text: "Hi".to_string()
            }
        );
    }

    #[test]
    fn test_envelope_with_event_discriminator() {
        let text = r#"{"event":"VOICE_SESSION_CREATED","content":{"session_id":"s-1","agent_id":"a-1"}}"#;
        let event = decode_envelope(text).unwrap();
        assert_eq!(
            event,
            DomainEvent::SessionCreated {
                session_id: "s-1".to_string(),
                agent_id: Some("a-1".to_string()),
                thread_id: None,
            }
        );
    }

    #[test]
    fn test_envelope_with_type_discriminator() {
        let event = decode_envelope(r#"{"type":"ping","timestamp":42}"#).unwrap();
        assert_eq!(event, DomainEvent::Ping { timestamp: Some(42) });
    }

    #[test]
    fn test_envelope_with_data_payload() {
        let text = r#"{"event":"error","data":{"type":"authentication_error","message":"bad key"}}"#;
        let event = decode_envelope(text).unwrap();
        assert_eq!(
            event,
            DomainEvent::ErrorEvent {
                kind: Some("authentication_error".to_string()),
                message: "bad key".to_string(),
            }
        );
    }

    #[test]
    fn test_envelope_missing_discriminator() {
        assert!(decode_envelope(r#"{"content":{}}"#).is_err());
        assert!(decode_envelope("not json").is_err());
    }

    #[test]
    fn test_unknown_event_falls_back() {
        let event = decode_envelope(r#"{"event":"SOMETHING_NEW","content":{"x":1}}"#).unwrap();
        match event {
            DomainEvent::Unrecognized { event_type, payload } => {
                assert_eq!(event_type, "SOMETHING_NEW");
                assert_eq!(payload["x"], json!(1));
            }
            other => panic!("expected Unrecognized, got {:?}", other),
        }
    }

    #[test]
    fn test_audio_chunk_requires_data() {
        let with_data = decode_envelope(
            r#"{"event":"VOICE_OUTPUT_AUDIO","content":{"audio_data":"QUJD","chunk_index":3,"is_final":true}}"#,
        )
        .unwrap();
        assert_eq!(
            with_data,
            DomainEvent::AudioOutputChunk {
                audio_data: "QUJD".to_string(),
                chunk_index: Some(3),
                is_final: true,
            }
        );

        let without_data =
            decode_envelope(r#"{"event":"VOICE_OUTPUT_AUDIO","content":{"chunk_index":3}}"#)
                .unwrap();
        assert!(matches!(without_data, DomainEvent::Unrecognized { .. }));
    }

    #[test]
    fn test_agent_response_stream_field_fallbacks() {
        for key in ["accumulated_text", "text", "text_chunk"] {
            let text = format!(
                r#"{{"event":"VOICE_AGENT_RESPONSE_STREAM","content":{{"{}":"hello"}}}}"#,
                key
            );
            let event = decode_envelope(&text).unwrap();
            assert_eq!(
                event,
                DomainEvent::AgentResponseStream {
                    text: "hello".to_string()
                },
                "field {}",
                key
            );
        }
    }

    #[test]
    fn test_translation_result_with_tts() {
        let text = r#"{"event":"TRANSLATION_RESULT","content":{"original_text":"hola","translated_text":"hello","original_language":"es","target_language":"en","confidence":0.93,"tts_audio":"UENN"}}"#;
        let event = decode_envelope(text).unwrap();
        match event {
            DomainEvent::TranslationResult {
                original_text,
                translated_text,
                tts_audio,
                ..
            } => {
                assert_eq!(original_text, "hola");
                assert_eq!(translated_text, "hello");
                assert_eq!(tts_audio, Some("UENN".to_string()));
            }
            other => panic!("expected TranslationResult, got {:?}", other),
        }
    }

    #[test]
    fn test_human_approval_tools() {
        let text = r#"{"event":"human_approval","data":{"data":{"tools":[{"name":"search","args":{"q":"rust"}},{"name":"delete"}]}}}"#;
        let event = decode_envelope(text).unwrap();
        match event {
            DomainEvent::HumanApprovalRequest { tools } => {
                assert_eq!(tools.len(), 2);
                assert_eq!(tools[0].name, "search");
                assert_eq!(tools[0].args["q"], json!("rust"));
                assert_eq!(tools[1].args, Value::Null);
            }
            other => panic!("expected HumanApprovalRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_content_block_states() {
        let start = Frame {
            event_type: "content_block".to_string(),
            data: json!({"state": "start", "index": 0}),
        };
        assert_eq!(
            decode_frame(&start),
            DomainEvent::ContentStart { index: Some(0) }
        );

        let complete = Frame {
            event_type: "content_block".to_string(),
            data: json!({"state": "complete", "index": 0}),
        };
        assert_eq!(
            decode_frame(&complete),
            DomainEvent::ContentComplete { index: Some(0) }
        );

        // Non-text blocks stay out of the typed variants
        let thinking = Frame {
            event_type: "content_block".to_string(),
            data: json!({"state": "delta", "content_type": "thinking", "data": {"thinking": "..."}}),
        };
        assert!(matches!(
            decode_frame(&thinking),
            DomainEvent::Unrecognized { .. }
        ));
    }

    #[test]
    fn test_transcription_partial_flag() {
        let partial = decode_envelope(
            r#"{"event":"VOICE_TRANSCRIPTION_PARTIAL","content":{"text":"hel","turn_id":"t1"}}"#,
        )
        .unwrap();
        assert_eq!(
            partial,
            DomainEvent::InputTranscription {
                text: "hel".to_string(),
                partial: true,
                turn_id: Some("t1".to_string()),
                confidence: None,
            }
        );
    }

    #[test]
    fn test_usage_metadata() {
        let frame = Frame {
            event_type: "usage_metadata".to_string(),
            data: json!({"usage": {"input_tokens": 10, "output_tokens": 25}, "model": "m"}),
        };
        assert_eq!(
            decode_frame(&frame),
            DomainEvent::Usage {
                input_tokens: 10,
                output_tokens: 25,
                model: Some("m".to_string()),
            }
        );
    }
}
