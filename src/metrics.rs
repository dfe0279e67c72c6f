//! # Engine Metrics
//!
//! Counters the engine maintains across a session so the collaborator can
//! display throughput and drop statistics. All counters live on the single
//! task that owns the [`Session`](crate::session::Session), so no locking is
//! involved; the collaborator receives copies via [`EngineMetrics::snapshot`].

use std::collections::HashMap;

/// Counters collected across the life of a session.
#[derive(Debug, Default, Clone)]
pub struct EngineMetrics {
    /// Complete frames recovered from the inbound stream
    pub frames_assembled: u64,

    /// Partially-formed segments dropped by the assembler
    pub frames_dropped: u64,

    /// Events decoded and forwarded to the collaborator
    pub events_decoded: u64,

    /// Events that fell through to the unrecognized variant
    pub events_unrecognized: u64,

    /// Outbound audio chunks emitted on the wire
    pub chunks_emitted: u64,

    /// Chunks dropped because no session id was active at emission time
    pub chunks_dropped: u64,

    /// Interruptions applied to the playback queues
    pub interrupts: u64,

    /// Per-channel playback statistics, keyed by channel label
    pub playback: HashMap<String, ChannelMetric>,
}

/// Playback statistics for one output channel.
#[derive(Debug, Default, Clone)]
pub struct ChannelMetric {
    /// Items accepted onto the queue
    pub enqueued: u64,

    /// Items that played to natural completion
    pub played: u64,

    /// Items skipped by the decode guards
    pub skipped: u64,
}

impl EngineMetrics {
    /// Record playback counters reported by a channel's queue.
    pub fn record_playback(&mut self, channel: &str, enqueued: u64, played: u64, skipped: u64) {
        let entry = self.playback.entry(channel.to_string()).or_default();
        entry.enqueued = enqueued;
        entry.played = played;
        entry.skipped = skipped;
    }

    /// Copy of the current counters for the collaborator.
    pub fn snapshot(&self) -> EngineMetrics {
        self.clone()
    }
}
