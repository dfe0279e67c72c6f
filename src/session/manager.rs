//! # Session Management
//!
//! Tracks live sessions by their server-assigned id and enforces the
//! one-live-session-per-id invariant: a session is registered when the
//! server acknowledges it and removed on session end or fatal close.
//!
//! The manager is owned by the task that drives the engine, so access is
//! plain `&mut` access, no locks.

use crate::error::{EngineError, EngineResult};
use crate::session::engine::Session;
use crate::session::state::SessionState;
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

/// Registry of live sessions with a concurrency limit.
pub struct SessionManager {
    /// Active sessions mapped by session id
    sessions: HashMap<String, Session>,

    /// Maximum number of concurrent sessions allowed
    max_concurrent_sessions: usize,
}

impl SessionManager {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_concurrent_sessions,
        }
    }

    /// Register a session, usually under its server-assigned id.
    ///
    /// ## Parameters:
    /// - **session_id**: the server-assigned id; `None` generates a local
    ///   UUID (offline and test hosts)
    ///
    /// ## Returns:
    /// - **Ok(session_id)**: session registered
    /// - **Err**: the limit was reached or the id is already live
    pub fn register(
        &mut self,
        session_id: Option<String>,
        session: Session,
    ) -> EngineResult<String> {
        if self.sessions.len() >= self.max_concurrent_sessions {
            return Err(EngineError::Session(format!(
                "Maximum concurrent sessions ({}) reached",
                self.max_concurrent_sessions
            )));
        }

        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.sessions.contains_key(&session_id) {
            return Err(EngineError::Session(format!(
                "Session id '{}' already exists",
                session_id
            )));
        }

        self.sessions.insert(session_id.clone(), session);
        Ok(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    /// Remove a session (cleanup when ended or failed).
    pub fn remove(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Remove terminal sessions and sessions older than the given age.
    ///
    /// ## Returns:
    /// The number of sessions removed.
    pub fn cleanup_old_sessions(&mut self, max_age_seconds: u64) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();

        self.sessions.retain(|_, session| {
            if session.state() == SessionState::Ended {
                return false;
            }
            let age_seconds = now.signed_duration_since(session.created_at).num_seconds();
            age_seconds <= max_age_seconds as i64
        });

        before - self.sessions.len()
    }

    /// Summary of all live sessions, grouped by state.
    pub fn summary(&self) -> SessionManagerSummary {
        let mut status_counts = HashMap::new();
        for session in self.sessions.values() {
            *status_counts
                .entry(session.state().as_str().to_string())
                .or_insert(0) += 1;
        }

        SessionManagerSummary {
            total_sessions: self.sessions.len(),
            max_sessions: self.max_concurrent_sessions,
            status_counts,
        }
    }
}

/// Summary of session manager state.
#[derive(Debug)]
pub struct SessionManagerSummary {
    pub total_sessions: usize,
    pub max_sessions: usize,
    pub status_counts: HashMap<String, usize>,
}
