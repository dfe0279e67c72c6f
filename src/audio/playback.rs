//! # Playback Queues
//!
//! Serializes decoded inbound audio chunks into one gapless playback stream
//! per logical channel, with interruption support. The output device sits
//! behind the [`AudioSink`] trait; hardware completion comes back through
//! [`PlaybackQueue::complete`].
//!
//! ## Queue Discipline:
//! - Strictly FIFO per channel; exactly one source in flight at a time,
//!   enforced by a boolean flag (the queue runs on a single task)
//! - Items that fail the decode guards are skipped, never fail the queue
//! - The source id joins the active set *before* the sink starts, so a
//!   zero-length buffer that completes synchronously still finds its handle
//! - `interrupt()` stops every active source, clears the set, the pending
//!   queue and the in-flight flag; it is idempotent, and a completion that
//!   arrives for an already-stopped source is ignored

use crate::audio::resampler;
use crate::error::{EngineError, EngineResult};
use std::collections::VecDeque;
use std::io::Cursor;
use tracing::{debug, info, warn};

/// Identifier for one started playback source.
pub type SourceId = u64;

/// Independent FIFO output streams. Each channel has its own queue,
/// active-source set and default raw-PCM sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackChannel {
    /// Synthesized agent speech (raw PCM assumed 24 kHz)
    Voice,
    /// Translation speech output (raw PCM assumed 16 kHz)
    Translation,
}

impl PlaybackChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackChannel::Voice => "voice",
            PlaybackChannel::Translation => "translation",
        }
    }
}

/// One queued unit of playback, owned by the queue once enqueued.
#[derive(Debug, Clone)]
pub struct InboundAudioItem {
    /// Raw payload bytes (WAV container or bare PCM16)
    pub payload: Vec<u8>,

    /// Declared sample rate, when the wire carried one
    pub sample_rate_hint: Option<u32>,

    /// Index of this chunk within its response, when declared
    pub chunk_index: Option<u64>,

    /// Whether the sender marked this as the final chunk
    pub is_final: bool,
}

/// Decoded audio ready for the output device.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    /// Interleaved float samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// What the sink did with a started source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// Playback is running; a `complete` call will follow
    Playing,
    /// The source finished synchronously (e.g. a zero-length buffer)
    Completed,
}

/// Seam to the platform audio output device.
///
/// `start` hands over a decoded buffer under a fresh source id; the host
/// reports natural completion back to the queue via
/// [`PlaybackQueue::complete`] with that id. `stop` forcibly ends a source
/// and must not trigger a completion for it.
pub trait AudioSink: Send {
    fn start(&mut self, source: SourceId, buffer: &PlaybackBuffer) -> SinkOutcome;
    fn stop(&mut self, source: SourceId);
}

/// Sink that discards audio and completes immediately. Used by headless
/// hosts and as the default when no device is attached.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn start(&mut self, _source: SourceId, _buffer: &PlaybackBuffer) -> SinkOutcome {
        SinkOutcome::Completed
    }

    fn stop(&mut self, _source: SourceId) {}
}

/// Sequential playback queue for one logical channel.
pub struct PlaybackQueue {
    /// Channel label used in logs and metrics ("voice", "translation")
    label: &'static str,

    /// Sample rate assumed for raw PCM payloads on this channel
    default_sample_rate: u32,

    /// Payloads below this size are rejected as corrupt
    min_payload_bytes: usize,

    /// Decoded items below this duration are rejected as inaudible
    min_duration_secs: f64,

    queue: VecDeque<InboundAudioItem>,

    /// Currently-playing (not-yet-finished) source ids
    active: Vec<SourceId>,

    /// One playback task in flight at a time
    playing: bool,

    next_source_id: SourceId,
    sink: Box<dyn AudioSink>,

    items_enqueued: u64,
    items_played: u64,
    items_skipped: u64,
}

impl PlaybackQueue {
    pub fn new(
        label: &'static str,
        default_sample_rate: u32,
        min_payload_bytes: usize,
        min_duration_ms: u64,
        sink: Box<dyn AudioSink>,
    ) -> Self {
        Self {
            label,
            default_sample_rate,
            min_payload_bytes,
            min_duration_secs: min_duration_ms as f64 / 1000.0,
            queue: VecDeque::new(),
            active: Vec::new(),
            playing: false,
            next_source_id: 0,
            sink,
            items_enqueued: 0,
            items_played: 0,
            items_skipped: 0,
        }
    }

    /// Accept an item for playback. Starts the pump immediately when nothing
    /// is in flight; otherwise the item waits its turn.
    pub fn enqueue(&mut self, item: InboundAudioItem) {
        self.items_enqueued += 1;
        self.queue.push_back(item);
        if !self.playing {
            self.pump();
        }
    }

    /// Hardware-completion signal for a started source.
    ///
    /// A completion for a source that was stopped by `interrupt` no longer
    /// matches the active set and is ignored.
    pub fn complete(&mut self, source: SourceId) {
        match self.active.iter().position(|&id| id == source) {
            Some(pos) => {
                self.active.remove(pos);
                self.playing = false;
                self.items_played += 1;
                debug!(channel = self.label, source, "Playback source finished");
                self.pump();
            }
            None => {
                debug!(
                    channel = self.label,
                    source, "Ignoring completion for stopped source"
                );
            }
        }
    }

    /// Stop all active sources and drop everything pending.
    ///
    /// The only operation that truncates in-progress playback. Idempotent:
    /// repeated calls on an empty queue are no-ops.
    pub fn interrupt(&mut self) {
        let stopped = self.active.len();
        let cleared = self.queue.len();

        for source in self.active.drain(..) {
            self.sink.stop(source);
        }
        self.queue.clear();
        self.playing = false;

        if stopped > 0 || cleared > 0 {
            info!(
                channel = self.label,
                stopped, cleared, "Playback interrupted"
            );
        }
    }

    /// Drive the queue: pop and start items until one is actually playing,
    /// the queue drains, or a started source completes synchronously and the
    /// loop continues. An explicit loop, so completion can never recurse.
    fn pump(&mut self) {
        while !self.playing {
            let Some(item) = self.queue.pop_front() else {
                return;
            };

            let buffer = match self.decode_item(&item) {
                Ok(buffer) => buffer,
                Err(err) => {
                    self.items_skipped += 1;
                    warn!(channel = self.label, error = %err, "Skipping playback item");
                    continue;
                }
            };

            let source = self.next_source_id;
            self.next_source_id += 1;

            // Register the handle before starting: a source that completes
            // synchronously must still find itself in the active set
            self.active.push(source);
            self.playing = true;

            debug!(
                channel = self.label,
                source,
                duration_secs = buffer.duration_secs(),
                sample_rate = buffer.sample_rate,
                "Starting playback source"
            );

            if self.sink.start(source, &buffer) == SinkOutcome::Completed {
                if let Some(pos) = self.active.iter().position(|&id| id == source) {
                    self.active.remove(pos);
                }
                self.playing = false;
                self.items_played += 1;
            }
        }
    }

    /// Decode one item, applying the anti-corruption guards.
    ///
    /// A RIFF magic sniff selects WAV container decode; anything else is raw
    /// little-endian PCM16 at the channel's fixed rate.
    fn decode_item(&self, item: &InboundAudioItem) -> EngineResult<PlaybackBuffer> {
        if item.payload.len() < self.min_payload_bytes {
            return Err(EngineError::AudioDecode(format!(
                "payload too small ({} bytes)",
                item.payload.len()
            )));
        }

        let buffer = if item.payload.starts_with(b"RIFF") {
            decode_wav(&item.payload)?
        } else {
            let pcm = resampler::bytes_to_pcm16(&item.payload)?;
            PlaybackBuffer {
                samples: resampler::pcm16_to_float(&pcm),
                channels: 1,
                sample_rate: item.sample_rate_hint.unwrap_or(self.default_sample_rate),
            }
        };

        if buffer.duration_secs() < self.min_duration_secs {
            return Err(EngineError::AudioDecode(format!(
                "decoded duration too short ({:.4}s)",
                buffer.duration_secs()
            )));
        }

        Ok(buffer)
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// (enqueued, played, skipped) counters for the metrics surface.
    pub fn counters(&self) -> (u64, u64, u64) {
        (self.items_enqueued, self.items_played, self.items_skipped)
    }
}

/// Decode a WAV container into float samples.
fn decode_wav(bytes: &[u8]) -> EngineResult<PlaybackBuffer> {
    let mut cursor = Cursor::new(bytes);
    let (header, data) = wav::read(&mut cursor)
        .map_err(|err| EngineError::AudioDecode(format!("WAV decode failed: {}", err)))?;

    let samples = match data {
        wav::BitDepth::Sixteen(samples) => resampler::pcm16_to_float(&samples),
        wav::BitDepth::ThirtyTwoFloat(samples) => samples,
        wav::BitDepth::Eight(samples) => samples
            .into_iter()
            .map(|s| (s as f32 - 128.0) / 128.0)
            .collect(),
        wav::BitDepth::TwentyFour(samples) => samples
            .into_iter()
            .map(|s| s as f32 / 8_388_608.0)
            .collect(),
        wav::BitDepth::Empty => {
            return Err(EngineError::AudioDecode("WAV file has no samples".to_string()))
        }
    };

    Ok(PlaybackBuffer {
        samples,
        channels: header.channel_count,
        sample_rate: header.sampling_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records sink calls and lets tests decide which sources complete
    /// synchronously.
    #[derive(Default)]
    struct RecordingSinkState {
        started: Vec<(SourceId, PlaybackBuffer)>,
        stopped: Vec<SourceId>,
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        state: Arc<Mutex<RecordingSinkState>>,
        complete_synchronously: bool,
    }

    impl AudioSink for RecordingSink {
        fn start(&mut self, source: SourceId, buffer: &PlaybackBuffer) -> SinkOutcome {
            self.state.lock().unwrap().started.push((source, buffer.clone()));
            if self.complete_synchronously {
                SinkOutcome::Completed
            } else {
                SinkOutcome::Playing
            }
        }

        fn stop(&mut self, source: SourceId) {
            self.state.lock().unwrap().stopped.push(source);
        }
    }

    fn queue_with_sink(sink: RecordingSink) -> PlaybackQueue {
        PlaybackQueue::new("voice", 24000, 100, 10, Box::new(sink))
    }

    fn pcm_item(duration_secs: f64, sample_rate: u32) -> InboundAudioItem {
        let samples = vec![1000i16; (duration_secs * sample_rate as f64) as usize];
        InboundAudioItem {
            payload: resampler::pcm16_to_bytes(&samples),
            sample_rate_hint: None,
            chunk_index: None,
            is_final: false,
        }
    }

    #[test]
    fn test_fifo_playback_with_one_completion_each() {
        let sink = RecordingSink::default();
        let state = sink.state.clone();
        let mut queue = queue_with_sink(sink);

        // Three items of 0.5s, 0.3s, 0.4s enqueued while idle
        queue.enqueue(pcm_item(0.5, 24000));
        queue.enqueue(pcm_item(0.3, 24000));
        queue.enqueue(pcm_item(0.4, 24000));

        // Only the first item started; the others wait their turn
        assert_eq!(state.lock().unwrap().started.len(), 1);
        assert!(queue.is_playing());
        assert_eq!(queue.pending_len(), 2);

        queue.complete(0);
        queue.complete(1);
        queue.complete(2);

        let state = state.lock().unwrap();
        assert_eq!(state.started.len(), 3);

        // In enqueue order, with the expected durations
        let durations: Vec<f64> = state
            .started
            .iter()
            .map(|(_, buffer)| buffer.duration_secs())
            .collect();
        assert!((durations[0] - 0.5).abs() < 1e-6);
        assert!((durations[1] - 0.3).abs() < 1e-6);
        assert!((durations[2] - 0.4).abs() < 1e-6);

        assert_eq!(queue.counters(), (3, 3, 0));
        assert!(!queue.is_playing());
    }

    #[test]
    fn test_interrupt_clears_everything() {
        let sink = RecordingSink::default();
        let state = sink.state.clone();
        let mut queue = queue_with_sink(sink);

        queue.enqueue(pcm_item(0.5, 24000));
        queue.enqueue(pcm_item(0.5, 24000));
        assert!(queue.is_playing());

        queue.interrupt();

        assert_eq!(queue.active_len(), 0);
        assert_eq!(queue.pending_len(), 0);
        assert!(!queue.is_playing());
        assert_eq!(state.lock().unwrap().stopped, vec![0]);

        // Idempotent on an already-empty queue
        queue.interrupt();
        assert_eq!(state.lock().unwrap().stopped, vec![0]);
    }

    #[test]
    fn test_no_orphaned_completion_after_interrupt() {
        let sink = RecordingSink::default();
        let state = sink.state.clone();
        let mut queue = queue_with_sink(sink);

        queue.enqueue(pcm_item(0.5, 24000));
        queue.interrupt();

        // The platform may still deliver the completion for the stopped
        // source; it must not disturb the queue
        queue.complete(0);
        assert_eq!(queue.counters().1, 0);
        assert!(!queue.is_playing());

        // A subsequent enqueue starts from a clean state
        queue.enqueue(pcm_item(0.5, 24000));
        assert!(queue.is_playing());
        assert_eq!(state.lock().unwrap().started.len(), 2);
        assert_eq!(queue.active_len(), 1);
    }

    #[test]
    fn test_short_payload_skipped() {
        let sink = RecordingSink::default();
        let state = sink.state.clone();
        let mut queue = queue_with_sink(sink);

        // 50 bytes is below the corruption guard
        queue.enqueue(InboundAudioItem {
            payload: vec![0u8; 50],
            sample_rate_hint: None,
            chunk_index: None,
            is_final: false,
        });
        // The next item plays as if the bad one never existed
        queue.enqueue(pcm_item(0.5, 24000));

        assert_eq!(state.lock().unwrap().started.len(), 1);
        assert_eq!(queue.counters().2, 1);
    }

    #[test]
    fn test_inaudibly_short_decode_skipped() {
        let sink = RecordingSink::default();
        let mut queue = queue_with_sink(sink);

        // 120 bytes = 60 samples = 2.5ms at 24kHz: passes the byte guard,
        // fails the duration guard
        queue.enqueue(pcm_item(0.0025, 24000));
        assert_eq!(queue.counters(), (1, 0, 1));
        assert!(!queue.is_playing());
    }

    #[test]
    fn test_wav_payload_sniffed_and_decoded() {
        let sink = RecordingSink::default();
        let state = sink.state.clone();
        let mut queue = queue_with_sink(sink);

        // Build a real WAV container at 8kHz mono
        let header = wav::Header::new(1, 1, 8000, 16);
        let samples = wav::BitDepth::Sixteen(vec![2000i16; 4000]);
        let mut bytes = Cursor::new(Vec::new());
        wav::write(header, &samples, &mut bytes).unwrap();

        queue.enqueue(InboundAudioItem {
            payload: bytes.into_inner(),
            sample_rate_hint: None,
            chunk_index: None,
            is_final: false,
        });

        let state = state.lock().unwrap();
        assert_eq!(state.started.len(), 1);
        let (_, buffer) = &state.started[0];
        // The container's declared rate wins over the channel default
        assert_eq!(buffer.sample_rate, 8000);
        assert_eq!(buffer.samples.len(), 4000);
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_raw_pcm_uses_channel_default_rate() {
        let sink = RecordingSink::default();
        let state = sink.state.clone();
        let mut queue = queue_with_sink(sink);

        queue.enqueue(pcm_item(0.5, 24000));
        let state = state.lock().unwrap();
        assert_eq!(state.started[0].1.sample_rate, 24000);
    }

    #[test]
    fn test_declared_rate_overrides_default() {
        let sink = RecordingSink::default();
        let state = sink.state.clone();
        let mut queue = queue_with_sink(sink);

        let mut item = pcm_item(0.5, 16000);
        item.sample_rate_hint = Some(16000);
        queue.enqueue(item);
        assert_eq!(state.lock().unwrap().started[0].1.sample_rate, 16000);
    }

    #[test]
    fn test_synchronous_completion_drains_queue() {
        // A sink that completes everything synchronously (e.g. NullSink)
        // must drain the whole queue without external completions
        let sink = RecordingSink {
            complete_synchronously: true,
            ..Default::default()
        };
        let state = sink.state.clone();
        let mut queue = queue_with_sink(sink);

        queue.enqueue(pcm_item(0.5, 24000));
        queue.enqueue(pcm_item(0.5, 24000));
        queue.enqueue(pcm_item(0.5, 24000));

        assert_eq!(state.lock().unwrap().started.len(), 3);
        assert_eq!(queue.counters(), (3, 3, 0));
        assert!(!queue.is_playing());
        assert_eq!(queue.active_len(), 0);
    }

    #[test]
    fn test_enqueue_while_playing_waits() {
        let sink = RecordingSink::default();
        let state = sink.state.clone();
        let mut queue = queue_with_sink(sink);

        queue.enqueue(pcm_item(0.5, 24000));
        queue.enqueue(pcm_item(0.5, 24000));

        // Second item must not start before the first completes
        assert_eq!(state.lock().unwrap().started.len(), 1);
        queue.complete(0);
        assert_eq!(state.lock().unwrap().started.len(), 2);
    }
}
