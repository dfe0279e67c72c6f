//! # Voice Session Engine
//!
//! Real-time streaming session engine for voice/chat agent clients. The
//! crate parses event-framed streams (SSE and WebSocket envelopes) into
//! typed events, chunks and resamples captured audio for outbound
//! transmission, and plays inbound audio back sequentially with mid-stream
//! interruption support.
//!
//! ## Architecture:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **error**: error taxonomy and recovery policy
//! - **stream**: frame assembly and event decoding
//! - **audio**: capture chunking, resampling, playback queues
//! - **session**: state machine, the `Session` object, session registry
//! - **protocol**: outbound control messages
//! - **transport**: WebSocket and SSE pumps over pre-established connections
//! - **metrics**: engine counters for the collaborator

pub mod audio;
pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod stream;
pub mod transport;

pub use audio::{AudioChunker, AudioSink, NullSink, PlaybackChannel, PlaybackQueue};
pub use config::AppConfig;
pub use error::{EngineError, EngineResult};
pub use metrics::EngineMetrics;
pub use protocol::OutboundMessage;
pub use session::{CaptureTarget, Session, SessionManager, SessionState};
pub use stream::{decode_envelope, decode_frame, DomainEvent, Frame, FrameAssembler};
