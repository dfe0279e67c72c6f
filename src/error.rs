//! # Error Handling
//!
//! Custom error types for the streaming session engine and how they map onto
//! the recovery policy of each pipeline stage.
//!
//! ## Error Categories:
//! - **MalformedFrame**: unparseable stream data; dropped silently, non-fatal
//! - **AudioDecode**: bad inbound audio payload; skip the item, keep the queue running
//! - **Transport**: socket closed or stream failed; terminal for the session
//! - **Protocol**: explicit error event from the server; session continues
//!   unless the error is of an authentication kind
//! - **CaptureDevice**: capture path failure; surfaced once, capture disabled
//! - **Config / Validation / Session**: local misconfiguration or misuse

use std::fmt;

/// Error type covering every failure mode of the session engine.
///
/// Parse and decode failures are recovered locally (skip-and-continue);
/// transport and authentication failures are terminal for the session.
#[derive(Debug)]
pub enum EngineError {
    /// A stream segment could not be parsed into a frame or envelope
    MalformedFrame(String),

    /// An inbound audio payload failed decoding (too short, bad container)
    AudioDecode(String),

    /// The underlying connection failed or was closed unexpectedly
    Transport(String),

    /// The server sent an explicit error event
    Protocol {
        /// Machine-readable error kind (e.g. "authentication_error")
        kind: String,
        /// Human-readable error message
        message: String,
    },

    /// The capture device failed (e.g. permission denied)
    CaptureDevice(String),

    /// Configuration file or environment variable problems
    Config(String),

    /// Configuration or input failed validation rules
    Validation(String),

    /// A session operation was attempted in a state that does not allow it
    Session(String),
}

impl EngineError {
    /// Whether this error must terminate the session.
    ///
    /// Transport failures always end the session. Protocol errors end it only
    /// when the server reports an authentication problem; everything else is
    /// recovered locally.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Transport(_) => true,
            EngineError::Protocol { kind, .. } => kind.contains("authentication"),
            _ => false,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MalformedFrame(msg) => write!(f, "Malformed frame: {}", msg),
            EngineError::AudioDecode(msg) => write!(f, "Audio decode error: {}", msg),
            EngineError::Transport(msg) => write!(f, "Transport error: {}", msg),
            EngineError::Protocol { kind, message } => {
                write!(f, "Protocol error ({}): {}", kind, message)
            }
            EngineError::CaptureDevice(msg) => write!(f, "Capture device error: {}", msg),
            EngineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            EngineError::Validation(msg) => write!(f, "Validation error: {}", msg),
            EngineError::Session(msg) => write!(f, "Session error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// JSON parsing failures come from stream payloads, so they are frame errors.
impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::MalformedFrame(format!("JSON parsing error: {}", err))
    }
}

/// Configuration loading can fail for various reasons (missing files,
/// invalid syntax, type mismatches).
impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

/// WebSocket failures are transport errors; the session ends with them.
impl From<tokio_tungstenite::tungstenite::Error> for EngineError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        EngineError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Transport(err.to_string())
    }
}

/// Type alias for Results that use the engine's error type.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(EngineError::Transport("socket closed".to_string()).is_fatal());
        assert!(EngineError::Protocol {
            kind: "authentication_error".to_string(),
            message: "bad key".to_string(),
        }
        .is_fatal());

        assert!(!EngineError::Protocol {
            kind: "rate_limited".to_string(),
            message: "slow down".to_string(),
        }
        .is_fatal());
        assert!(!EngineError::MalformedFrame("junk".to_string()).is_fatal());
        assert!(!EngineError::AudioDecode("too short".to_string()).is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let err = EngineError::Protocol {
            kind: "rate_limited".to_string(),
            message: "slow down".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("rate_limited"));
        assert!(rendered.contains("slow down"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: EngineError = parse_err.into();
        assert!(matches!(err, EngineError::MalformedFrame(_)));
    }
}
