//! # Capture Chunking
//!
//! Accumulates raw capture samples and decides, by buffered duration and
//! elapsed wall time, when to emit an outbound chunk.
//!
//! ## Emit Policy:
//! A chunk is emitted when **either** of these holds:
//! - buffered duration ≥ min-chunk AND time since last emit ≥ min-chunk
//! - time since last emit ≥ max-chunk (hard latency cap, when configured)
//!
//! Emission fully drains the buffer and resets the timer. Two profiles exist:
//! the translation profile (min 500 ms, no cap) and the voice profile
//! (min 1000 ms, 2000 ms cap).

use crate::config::CaptureConfig;
use std::time::{Duration, Instant};

/// Which capture pipeline a chunker (and its emitted chunks) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProfile {
    /// Conversational voice input
    Voice,
    /// Live translation input
    Translation,
}

impl CaptureProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureProfile::Voice => "voice",
            CaptureProfile::Translation => "translation",
        }
    }
}

/// Immutable snapshot of one encoded outbound chunk, ready for the wire.
#[derive(Debug, Clone)]
pub struct OutboundChunk {
    pub session_id: String,
    pub profile: CaptureProfile,
    /// Number of source samples drained into this chunk
    pub sample_count: usize,
    pub source_sample_rate: u32,
    pub transmit_sample_rate: u32,
    /// Resampled 16-bit PCM payload, base64-encoded
    pub payload_base64: String,
}

/// Timing configuration for one chunker instance.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Minimum buffered duration before a chunk may be emitted
    pub min_chunk: Duration,

    /// Hard cap on the time between emissions; `None` disables forcing
    pub max_chunk: Option<Duration>,

    /// Sample rate the capture device delivers samples at
    pub device_sample_rate: u32,
}

impl ChunkerConfig {
    /// Voice profile: min 1000 ms with a 2000 ms hard cap (from config).
    pub fn voice(config: &CaptureConfig) -> Self {
        Self {
            min_chunk: Duration::from_millis(config.voice_min_chunk_ms),
            max_chunk: Some(Duration::from_millis(config.voice_max_chunk_ms)),
            device_sample_rate: config.device_sample_rate,
        }
    }

    /// Translation profile: min 500 ms, no cap (from config).
    pub fn translation(config: &CaptureConfig) -> Self {
        Self {
            min_chunk: Duration::from_millis(config.translation_min_chunk_ms),
            max_chunk: None,
            device_sample_rate: config.device_sample_rate,
        }
    }
}

/// Sample accumulator with the duration/elapsed-time emit policy.
///
/// The buffer is owned exclusively by the capture pipeline: it grows by
/// append and is fully drained (replaced with empty) on each emitted chunk.
pub struct AudioChunker {
    config: ChunkerConfig,
    buffer: Vec<f32>,
    last_emit: Instant,
}

impl AudioChunker {
    pub fn new(config: ChunkerConfig, now: Instant) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            last_emit: now,
        }
    }

    /// Append captured samples to the buffer.
    pub fn push(&mut self, samples: &[f32]) {
        self.buffer.extend_from_slice(samples);
    }

    /// Drain and return the buffer if the emit policy is satisfied.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<f32>> {
        if self.buffer.is_empty() {
            return None;
        }

        let since_last_emit = now.duration_since(self.last_emit);
        let buffered = self.buffered_duration();

        let min_met = buffered >= self.config.min_chunk && since_last_emit >= self.config.min_chunk;
        let cap_hit = self
            .config
            .max_chunk
            .map_or(false, |max| since_last_emit >= max);

        if min_met || cap_hit {
            self.last_emit = now;
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Drain the buffer unconditionally (used when capture stops, so the
    /// tail of the recording is not lost).
    pub fn flush(&mut self, now: Instant) -> Option<Vec<f32>> {
        if self.buffer.is_empty() {
            return None;
        }
        self.last_emit = now;
        Some(std::mem::take(&mut self.buffer))
    }

    /// Discard buffered samples and restart the emit timer.
    pub fn reset(&mut self, now: Instant) {
        self.buffer.clear();
        self.last_emit = now;
    }

    /// Duration of audio currently buffered.
    pub fn buffered_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer.len() as f64 / self.config.device_sample_rate as f64)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn device_sample_rate(&self) -> u32 {
        self.config.device_sample_rate
    }
}
