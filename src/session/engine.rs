//! # Session Engine
//!
//! The `Session` object owns every piece of mutable engine state: the state
//! machine, both capture chunkers, both playback queues and the metrics. All
//! mutation happens through its methods on the single task that owns it, so
//! the buffers and queues need no locking.
//!
//! ## Collaborator Boundary:
//! Decoded events flow out through the channel handed over by
//! [`Session::take_events`]; outbound control messages flow through
//! [`Session::take_outbound`] to the transport pump. Intents (send a message,
//! cancel, approve, start/stop capture, interrupt playback) are plain method
//! calls. The engine never touches presentation state.

use crate::audio::chunker::{AudioChunker, CaptureProfile, ChunkerConfig, OutboundChunk};
use crate::audio::playback::{
    AudioSink, InboundAudioItem, PlaybackChannel, PlaybackQueue, SourceId,
};
use crate::audio::resampler;
use crate::config::{AppConfig, TranslationConfig};
use crate::error::{EngineError, EngineResult};
use crate::metrics::EngineMetrics;
use crate::protocol::{ApprovalDecision, OutboundMessage, Preferences, VoiceConfig};
use crate::session::state::{SessionState, SessionStateMachine, StateEffect};
use crate::stream::decoder::{decode_envelope, DomainEvent};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use crate::audio::chunker::CaptureProfile as CaptureTarget;

/// One live streaming session: state machine, capture pipelines, playback
/// queues and the channels to the transport and the collaborator.
pub struct Session {
    /// Server-assigned voice session id
    voice_session_id: Option<String>,

    /// Server-assigned translation session id
    translation_session_id: Option<String>,

    machine: SessionStateMachine,

    voice_chunker: AudioChunker,
    translation_chunker: AudioChunker,

    /// Which capture pipeline is currently fed by the device, if any
    capture_target: Option<CaptureProfile>,

    /// Cleared once after a capture device error; capture stays off
    capture_enabled: bool,

    transmit_sample_rate: u32,

    voice_playback: PlaybackQueue,
    translation_playback: PlaybackQueue,

    /// Translation settings echoed in the settings-update message
    translation: TranslationConfig,

    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundMessage>>,
    event_tx: mpsc::UnboundedSender<DomainEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<DomainEvent>>,

    metrics: EngineMetrics,

    /// When this session object was created
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with its audio output sinks.
    pub fn new(
        config: &AppConfig,
        voice_sink: Box<dyn AudioSink>,
        translation_sink: Box<dyn AudioSink>,
    ) -> Self {
        let now = Instant::now();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            voice_session_id: None,
            translation_session_id: None,
            machine: SessionStateMachine::new(),
            voice_chunker: AudioChunker::new(ChunkerConfig::voice(&config.capture), now),
            translation_chunker: AudioChunker::new(
                ChunkerConfig::translation(&config.capture),
                now,
            ),
            capture_target: None,
            capture_enabled: true,
            transmit_sample_rate: config.capture.transmit_sample_rate,
            voice_playback: PlaybackQueue::new(
                PlaybackChannel::Voice.as_str(),
                config.playback.voice_sample_rate,
                config.playback.min_payload_bytes,
                config.playback.min_duration_ms,
                voice_sink,
            ),
            translation_playback: PlaybackQueue::new(
                PlaybackChannel::Translation.as_str(),
                config.playback.translation_sample_rate,
                config.playback.min_payload_bytes,
                config.playback.min_duration_ms,
                translation_sink,
            ),
            translation: config.translation.clone(),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            event_tx,
            event_rx: Some(event_rx),
            metrics: EngineMetrics::default(),
            created_at: Utc::now(),
        }
    }

    /// Receiver of decoded events for the collaborator. Yields once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<DomainEvent>> {
        self.event_rx.take()
    }

    /// Receiver of outbound messages for the transport pump. Yields once.
    pub fn take_outbound(&mut self) -> Option<mpsc::UnboundedReceiver<OutboundMessage>> {
        self.outbound_rx.take()
    }

    // ---- intents from the collaborator ----

    /// Request a voice session against the given agent.
    ///
    /// ## State Transition:
    /// Idle → Connecting; the session id arrives with the acknowledgment.
    pub fn start_voice_session(&mut self, agent_id: &str) -> EngineResult<()> {
        self.machine.start_requested()?;
        self.send(OutboundMessage::VoiceSessionStart {
            agent_id: agent_id.to_string(),
            voice_config: VoiceConfig::default(),
            preferences: Preferences::default(),
        });
        info!(agent_id, "Voice session requested");
        Ok(())
    }

    /// Ask the server to create a translation session with the configured
    /// settings. The session id arrives with the acknowledgment.
    pub fn start_translation_session(&mut self) {
        self.send(OutboundMessage::TranslationSessionStart {
            language_a: self.translation.language_a.clone(),
            language_b: self.translation.language_b.clone(),
            context: self.translation.context.clone(),
            enable_tts: self.translation.enable_tts,
        });
        info!("Translation session requested");
    }

    /// Adopt new translation settings at runtime.
    ///
    /// A live translation session receives a settings-update message; with
    /// no session yet, a new one is requested with the new settings.
    pub fn update_translation_settings(&mut self, settings: TranslationConfig) {
        self.translation = settings;
        match self.translation_session_id.clone() {
            Some(session_id) => {
                self.send(OutboundMessage::TranslationSettingsUpdate {
                    session_id,
                    language_a: self.translation.language_a.clone(),
                    language_b: self.translation.language_b.clone(),
                    context: self.translation.context.clone(),
                    enable_tts: self.translation.enable_tts,
                });
            }
            None => self.start_translation_session(),
        }
    }

    /// Send a user chat message.
    pub fn send_chat(&mut self, content: &str) {
        self.send(OutboundMessage::Chat {
            content: content.to_string(),
        });
    }

    /// Cancel the in-flight generation.
    pub fn cancel(&mut self) {
        self.send(OutboundMessage::Cancel);
    }

    /// Answer a human-approval request.
    pub fn resolve_approval(&mut self, decisions: Vec<ApprovalDecision>) {
        self.send(OutboundMessage::InterruptResume { decisions });
    }

    /// Emit a heartbeat request.
    pub fn send_ping(&mut self) {
        self.send(OutboundMessage::Ping);
    }

    /// End the session: notify the server, then tear down locally.
    pub fn end_session(&mut self) {
        if let Some(session_id) = self.voice_session_id.clone() {
            self.send(OutboundMessage::VoiceSessionEnd { session_id });
        }
        if let Some(session_id) = self.translation_session_id.clone() {
            self.send(OutboundMessage::TranslationSessionEnd { session_id });
        }
        self.teardown();
        info!("Session ended by collaborator");
    }

    /// Collaborator-initiated playback interruption on every channel.
    pub fn interrupt_playback(&mut self) {
        self.voice_playback.interrupt();
        self.translation_playback.interrupt();
        self.metrics.interrupts += 1;
        self.sync_playback_metrics();
    }

    // ---- capture path ----

    /// Route the capture device into one of the chunking profiles.
    ///
    /// Voice capture is permitted only while the session is live (active or
    /// inside a turn). Translation capture may start eagerly; its chunks are
    /// dropped until the server assigns a session id.
    pub fn start_capture(&mut self, target: CaptureTarget) -> EngineResult<()> {
        if !self.capture_enabled {
            return Err(EngineError::CaptureDevice(
                "capture disabled after a device error".to_string(),
            ));
        }
        if target == CaptureProfile::Voice && !self.machine.can_capture() {
            return Err(EngineError::Session(format!(
                "Cannot capture voice in state: {:?}",
                self.machine.state()
            )));
        }

        let now = Instant::now();
        self.chunker_mut(target).reset(now);
        self.capture_target = Some(target);
        info!(profile = target.as_str(), "Capture started");
        Ok(())
    }

    /// Stop capture, flushing any buffered tail as a final chunk.
    pub fn stop_capture(&mut self) {
        if let Some(target) = self.capture_target.take() {
            let now = Instant::now();
            if let Some(samples) = self.chunker_mut(target).flush(now) {
                self.emit_chunk(target, &samples);
            }
            info!(profile = target.as_str(), "Capture stopped");
        }
    }

    /// Feed a batch of capture samples at the device sample rate.
    pub fn push_capture_samples(&mut self, samples: &[f32]) {
        self.push_capture_samples_at(samples, Instant::now());
    }

    /// Same as [`push_capture_samples`](Self::push_capture_samples) with an
    /// explicit clock, for deterministic tests.
    pub fn push_capture_samples_at(&mut self, samples: &[f32], now: Instant) {
        if !self.capture_enabled {
            return;
        }
        let Some(target) = self.capture_target else {
            return;
        };

        let chunker = self.chunker_mut(target);
        chunker.push(samples);
        if let Some(raw) = chunker.poll(now) {
            self.emit_chunk(target, &raw);
        }
    }

    /// Capture device failure: surfaced once, capture path disabled, the
    /// rest of the session continues.
    pub fn capture_device_error(&mut self, message: &str) {
        if !self.capture_enabled {
            return;
        }
        self.capture_enabled = false;
        self.capture_target = None;
        let now = Instant::now();
        self.voice_chunker.reset(now);
        self.translation_chunker.reset(now);

        warn!(message, "Capture device failed; capture disabled");
        self.forward(DomainEvent::ErrorEvent {
            kind: Some("capture_device_error".to_string()),
            message: message.to_string(),
        });
    }

    /// Resample, quantize and send one drained chunk.
    ///
    /// Emission is a no-op without a session id for the target: the chunk is
    /// dropped (the buffer is already drained), so orphaned audio can never
    /// queue against a future, unrelated session.
    fn emit_chunk(&mut self, target: CaptureProfile, samples: &[f32]) {
        let session_id = match target {
            CaptureProfile::Voice => self.voice_session_id.clone(),
            CaptureProfile::Translation => self.translation_session_id.clone(),
        };
        let Some(session_id) = session_id else {
            self.metrics.chunks_dropped += 1;
            debug!(
                profile = target.as_str(),
                samples = samples.len(),
                "Dropping chunk emitted without an active session id"
            );
            return;
        };

        let device_rate = self.chunker_mut(target).device_sample_rate();
        let chunk = OutboundChunk {
            session_id,
            profile: target,
            sample_count: samples.len(),
            source_sample_rate: device_rate,
            transmit_sample_rate: self.transmit_sample_rate,
            payload_base64: resampler::encode_chunk_payload(
                samples,
                device_rate,
                self.transmit_sample_rate,
            ),
        };

        let message = match chunk.profile {
            CaptureProfile::Voice => OutboundMessage::VoiceInputAudio {
                session_id: chunk.session_id,
                audio_data: chunk.payload_base64,
                format: "pcm".to_string(),
                sample_rate: chunk.transmit_sample_rate,
            },
            CaptureProfile::Translation => OutboundMessage::TranslationAudioStream {
                session_id: chunk.session_id,
                audio_data: chunk.payload_base64,
            },
        };
        self.send(message);
        self.metrics.chunks_emitted += 1;
        debug!(
            profile = target.as_str(),
            samples = chunk.sample_count,
            "Audio chunk emitted"
        );
    }

    fn chunker_mut(&mut self, target: CaptureProfile) -> &mut AudioChunker {
        match target {
            CaptureProfile::Voice => &mut self.voice_chunker,
            CaptureProfile::Translation => &mut self.translation_chunker,
        }
    }

    // ---- inbound path ----

    /// Decode and apply one WebSocket text message.
    ///
    /// Malformed envelopes are dropped (counted, logged), never fatal.
    pub fn handle_ws_text(&mut self, text: &str) {
        match decode_envelope(text) {
            Ok(event) => self.apply_event(event),
            Err(err) => {
                self.metrics.frames_dropped += 1;
                debug!(error = %err, "Dropping malformed envelope");
            }
        }
    }

    /// Apply one decoded event: update the state machine, run its side
    /// effects, then forward the event to the collaborator.
    ///
    /// An interruption event interrupts every playback channel *before* the
    /// event is forwarded and before any further audio can be enqueued.
    pub fn apply_event(&mut self, event: DomainEvent) {
        match &event {
            DomainEvent::SessionCreated { session_id, .. } => {
                self.voice_session_id = Some(session_id.clone());
                if let Err(err) = self.machine.session_created() {
                    debug!(error = %err, "Session creation in unexpected state");
                }
                // Stale audio queued under a previous session must not play
                self.voice_playback.interrupt();
                info!(session_id = %session_id, "Voice session created");
            }
            DomainEvent::SessionStateChanged { state } => {
                self.machine.sync_remote(state);
            }
            DomainEvent::SessionEnded { reason } => {
                info!(reason = reason.as_deref().unwrap_or("unknown"), "Session ended");
                self.teardown();
            }
            DomainEvent::TurnStart { .. } => {
                if let Err(err) = self.machine.turn_started() {
                    debug!(error = %err, "Ignoring turn start");
                }
            }
            DomainEvent::TurnInterrupt { turn_id, .. } => {
                let effects = self.machine.interrupted();
                for effect in effects {
                    self.apply_effect(effect);
                }
                self.metrics.interrupts += 1;
                info!(
                    turn_id = turn_id.as_deref().unwrap_or("unknown"),
                    "Turn interrupted; playback cleared"
                );
            }
            DomainEvent::AgentResponseStart { .. } => {
                if let Err(err) = self.machine.agent_responding() {
                    debug!(error = %err, "Ignoring agent response start");
                }
            }
            DomainEvent::AudioOutputStart { .. } => {
                if let Err(err) = self.machine.output_started() {
                    debug!(error = %err, "Ignoring audio output start");
                }
            }
            DomainEvent::AudioOutputChunk {
                audio_data,
                chunk_index,
                is_final,
            } => {
                self.enqueue_voice_audio(audio_data, *chunk_index, *is_final);
            }
            DomainEvent::AudioOutputEnd { .. } => {
                if let Err(err) = self.machine.output_ended() {
                    debug!(error = %err, "Ignoring audio output end");
                }
            }
            DomainEvent::TranslationSessionStart { session_id, .. } => {
                self.translation_session_id = Some(session_id.clone());
                info!(session_id = %session_id, "Translation session created");
                // Acknowledge with the client's current settings
                self.send(OutboundMessage::TranslationSettingsUpdate {
                    session_id: session_id.clone(),
                    language_a: self.translation.language_a.clone(),
                    language_b: self.translation.language_b.clone(),
                    context: self.translation.context.clone(),
                    enable_tts: self.translation.enable_tts,
                });
            }
            DomainEvent::TranslationResult { tts_audio, .. } => {
                if self.translation.enable_tts {
                    if let Some(audio) = tts_audio {
                        let audio = audio.clone();
                        self.enqueue_translation_audio(&audio);
                    }
                }
            }
            DomainEvent::TranslationSessionEnd => {
                // Queued translation audio keeps playing to completion
                self.translation_session_id = None;
            }
            DomainEvent::Ping { .. } => {
                self.send(OutboundMessage::Pong);
            }
            DomainEvent::ErrorEvent { kind, message } => {
                let err = EngineError::Protocol {
                    kind: kind.clone().unwrap_or_default(),
                    message: message.clone(),
                };
                if err.is_fatal() {
                    warn!(error = %err, "Fatal protocol error; ending session");
                    self.teardown();
                }
            }
            DomainEvent::Unrecognized { event_type, .. } => {
                self.metrics.events_unrecognized += 1;
                debug!(event_type = %event_type, "Unrecognized event forwarded");
            }
            _ => {}
        }

        self.metrics.events_decoded += 1;
        self.forward(event);
    }

    /// Transport failure or close: terminal, surfaced as a session event.
    pub fn on_transport_closed(&mut self, reason: &str) {
        if self.machine.is_terminal() {
            return;
        }
        warn!(reason, "Transport closed");
        self.teardown();
        self.forward(DomainEvent::SessionEnded {
            reason: Some(format!("transport closed: {}", reason)),
        });
    }

    /// Merge the frame counters of a finished (or aborted) stream.
    pub fn record_frame_counters(&mut self, assembled: u64, dropped: u64) {
        self.metrics.frames_assembled += assembled;
        self.metrics.frames_dropped += dropped;
    }

    /// Hardware-completion signal for a playback source.
    pub fn playback_complete(&mut self, channel: PlaybackChannel, source: SourceId) {
        match channel {
            PlaybackChannel::Voice => self.voice_playback.complete(source),
            PlaybackChannel::Translation => self.translation_playback.complete(source),
        }
        self.sync_playback_metrics();
    }

    // ---- internals ----

    fn enqueue_voice_audio(&mut self, audio_data: &str, chunk_index: Option<u64>, is_final: bool) {
        if !self
            .machine
            .can_enqueue_playback(self.voice_session_id.is_some())
        {
            debug!("Dropping audio chunk: playback not permitted");
            return;
        }

        match resampler::decode_base64_payload(audio_data) {
            Ok(payload) => {
                self.voice_playback.enqueue(InboundAudioItem {
                    payload,
                    sample_rate_hint: None,
                    chunk_index,
                    is_final,
                });
                self.sync_playback_metrics();
            }
            Err(err) => {
                warn!(error = %err, "Skipping undecodable audio chunk");
            }
        }
    }

    fn enqueue_translation_audio(&mut self, audio_data: &str) {
        match resampler::decode_base64_payload(audio_data) {
            Ok(payload) => {
                self.translation_playback.enqueue(InboundAudioItem {
                    payload,
                    sample_rate_hint: None,
                    chunk_index: None,
                    is_final: false,
                });
                self.sync_playback_metrics();
            }
            Err(err) => {
                warn!(error = %err, "Skipping undecodable translation audio");
            }
        }
    }

    fn apply_effect(&mut self, effect: StateEffect) {
        match effect {
            StateEffect::InterruptPlayback => {
                self.voice_playback.interrupt();
                self.translation_playback.interrupt();
                self.sync_playback_metrics();
            }
            StateEffect::StopCapture => {
                self.capture_target = None;
                let now = Instant::now();
                self.voice_chunker.reset(now);
                self.translation_chunker.reset(now);
            }
        }
    }

    /// Deterministic local teardown: terminal state, capture cleared,
    /// playback queues flushed, session ids forgotten.
    fn teardown(&mut self) {
        let effects = self.machine.ended();
        for effect in effects {
            self.apply_effect(effect);
        }
        self.voice_session_id = None;
        self.translation_session_id = None;
    }

    fn send(&mut self, message: OutboundMessage) {
        if self.outbound_tx.send(message).is_err() {
            warn!("Cannot send message: outbound channel closed");
        }
    }

    fn forward(&mut self, event: DomainEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("No collaborator subscribed; event dropped");
        }
    }

    fn sync_playback_metrics(&mut self) {
        let (enqueued, played, skipped) = self.voice_playback.counters();
        self.metrics
            .record_playback(PlaybackChannel::Voice.as_str(), enqueued, played, skipped);
        let (enqueued, played, skipped) = self.translation_playback.counters();
        self.metrics.record_playback(
            PlaybackChannel::Translation.as_str(),
            enqueued,
            played,
            skipped,
        );
    }

    // ---- accessors ----

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn voice_session_id(&self) -> Option<&str> {
        self.voice_session_id.as_deref()
    }

    pub fn translation_session_id(&self) -> Option<&str> {
        self.translation_session_id.as_deref()
    }

    pub fn capture_target(&self) -> Option<CaptureTarget> {
        self.capture_target
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn voice_playback(&self) -> &PlaybackQueue {
        &self.voice_playback
    }

    pub fn translation_playback(&self) -> &PlaybackQueue {
        &self.translation_playback
    }
}
