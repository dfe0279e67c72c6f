//! # Audio Pipeline
//!
//! Capture-side chunking and resampling for outbound transmission, and the
//! inbound playback queues with interruption support.

pub mod chunker;
pub mod playback;
pub mod resampler;

pub use chunker::{AudioChunker, CaptureProfile, ChunkerConfig, OutboundChunk};
pub use playback::{
    AudioSink, InboundAudioItem, NullSink, PlaybackBuffer, PlaybackChannel, PlaybackQueue,
    SinkOutcome, SourceId,
};
