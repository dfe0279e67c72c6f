//! # Session State Machine
//!
//! Tracks the session/turn lifecycle and decides which pipelines may run.
//!
//! ## Lifecycle:
//! 1. **Idle**: no session requested yet
//! 2. **Connecting**: start requested, waiting for the server acknowledgment
//! 3. **Active**: session id assigned, no turn open
//! 4. **TurnListening / TurnThinking / TurnSpeaking**: the turn cycle
//! 5. **Interrupted**: transient; settles in TurnListening within the same
//!    transition, carrying the playback-interrupt effect
//! 6. **Ended**: terminal (session end, close, or fatal error)

use crate::error::{EngineError, EngineResult};
use std::str::FromStr;

/// Current position in the session/turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session requested yet
    Idle,
    /// Start requested, waiting for the server to create the session
    Connecting,
    /// Session live, no turn open
    Active,
    /// Waiting for user speech
    TurnListening,
    /// Agent is producing a response
    TurnThinking,
    /// Agent audio output is playing
    TurnSpeaking,
    /// In-flight turn truncated; transient on the way back to listening
    Interrupted,
    /// Terminal: session over
    Ended,
}

impl SessionState {
    /// Convert state to string for events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::TurnListening => "listening",
            SessionState::TurnThinking => "thinking",
            SessionState::TurnSpeaking => "speaking",
            SessionState::Interrupted => "interrupted",
            SessionState::Ended => "ended",
        }
    }
}

impl FromStr for SessionState {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SessionState::Idle),
            "connecting" => Ok(SessionState::Connecting),
            "active" => Ok(SessionState::Active),
            "listening" => Ok(SessionState::TurnListening),
            "thinking" => Ok(SessionState::TurnThinking),
            "speaking" => Ok(SessionState::TurnSpeaking),
            "interrupted" => Ok(SessionState::Interrupted),
            "ended" => Ok(SessionState::Ended),
            other => Err(EngineError::Session(format!(
                "Unknown session state: {}",
                other
            ))),
        }
    }
}

/// Side effects a transition requires the owner to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEffect {
    /// Interrupt every playback channel before any further audio is enqueued
    InterruptPlayback,
    /// Stop the capture pipeline and clear its buffer
    StopCapture,
}

/// Guarded state machine for one session.
///
/// Transitions that are not allowed from the current state return an error
/// and leave the state unchanged.
#[derive(Debug)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// ## State Transition:
    /// Idle → Connecting
    pub fn start_requested(&mut self) -> EngineResult<()> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Connecting;
                Ok(())
            }
            current => Err(EngineError::Session(format!(
                "Cannot request session start from state: {:?}",
                current
            ))),
        }
    }

    /// ## State Transition:
    /// Connecting → Active (also accepted from Idle, for servers that create
    /// sessions unprompted)
    pub fn session_created(&mut self) -> EngineResult<()> {
        match self.state {
            SessionState::Connecting | SessionState::Idle => {
                self.state = SessionState::Active;
                Ok(())
            }
            current => Err(EngineError::Session(format!(
                "Cannot accept session creation from state: {:?}",
                current
            ))),
        }
    }

    /// ## State Transition:
    /// Active or any turn state → TurnListening
    pub fn turn_started(&mut self) -> EngineResult<()> {
        match self.state {
            SessionState::Active
            | SessionState::TurnListening
            | SessionState::TurnThinking
            | SessionState::TurnSpeaking => {
                self.state = SessionState::TurnListening;
                Ok(())
            }
            current => Err(EngineError::Session(format!(
                "Cannot start a turn from state: {:?}",
                current
            ))),
        }
    }

    /// ## State Transition:
    /// Active/TurnListening → TurnThinking
    pub fn agent_responding(&mut self) -> EngineResult<()> {
        match self.state {
            SessionState::Active | SessionState::TurnListening => {
                self.state = SessionState::TurnThinking;
                Ok(())
            }
            current => Err(EngineError::Session(format!(
                "Cannot enter thinking from state: {:?}",
                current
            ))),
        }
    }

    /// ## State Transition:
    /// TurnThinking → TurnSpeaking (also from TurnListening, when the
    /// response events were lost)
    pub fn output_started(&mut self) -> EngineResult<()> {
        match self.state {
            SessionState::TurnThinking | SessionState::TurnListening => {
                self.state = SessionState::TurnSpeaking;
                Ok(())
            }
            current => Err(EngineError::Session(format!(
                "Cannot enter speaking from state: {:?}",
                current
            ))),
        }
    }

    /// ## State Transition:
    /// TurnSpeaking → TurnListening
    pub fn output_ended(&mut self) -> EngineResult<()> {
        match self.state {
            SessionState::TurnSpeaking => {
                self.state = SessionState::TurnListening;
                Ok(())
            }
            current => Err(EngineError::Session(format!(
                "Cannot end speaking from state: {:?}",
                current
            ))),
        }
    }

    /// ## State Transition:
    /// any non-terminal state → Interrupted → TurnListening (auto)
    ///
    /// Interruption truncates the in-flight turn without ending the session.
    /// The returned effects carry exactly one `InterruptPlayback`, which the
    /// owner must apply to every channel before enqueueing further audio.
    /// On an already-ended session this is a no-op with no effects.
    pub fn interrupted(&mut self) -> Vec<StateEffect> {
        if self.state == SessionState::Ended {
            return Vec::new();
        }
        // Interrupted is transient: the machine passes through it and
        // settles in listening within the same transition
        self.state = SessionState::TurnListening;
        vec![StateEffect::InterruptPlayback]
    }

    /// ## State Transition:
    /// any state → Ended (terminal, idempotent)
    pub fn ended(&mut self) -> Vec<StateEffect> {
        if self.state == SessionState::Ended {
            return Vec::new();
        }
        self.state = SessionState::Ended;
        vec![StateEffect::StopCapture, StateEffect::InterruptPlayback]
    }

    /// Adopt a server-notified state when it parses; unknown names are
    /// ignored (the server owns additions to its state vocabulary).
    pub fn sync_remote(&mut self, remote_state: &str) {
        if self.state == SessionState::Ended {
            return;
        }
        if let Ok(state) = remote_state.parse::<SessionState>() {
            self.state = state;
        }
    }

    /// Capture may run only while the session is live.
    pub fn can_capture(&self) -> bool {
        matches!(
            self.state,
            SessionState::Active
                | SessionState::TurnListening
                | SessionState::TurnThinking
                | SessionState::TurnSpeaking
        )
    }

    /// Playback enqueue requires an assigned session id and a non-terminal
    /// state.
    pub fn can_enqueue_playback(&self, has_session_id: bool) -> bool {
        has_session_id && self.state != SessionState::Ended
    }

    pub fn is_terminal(&self) -> bool {
        self.state == SessionState::Ended
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
