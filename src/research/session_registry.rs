//! C5 — per-session cancellation token and degradation flag.
//!
//! A single process-wide concurrent map from session-id to its entry. The
//! registry is the only source of truth for cancellation and degradation;
//! nodes never keep a local copy (SPEC_FULL.md §4.5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct SessionEntry {
    cancelled: Arc<AtomicBool>,
    degraded: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh session, replacing any stale entry for the same
    /// id (mirrors the orchestrator's "reset any stale degradation" step).
    pub fn create(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                cancelled: Arc::new(AtomicBool::new(false)),
                degraded: Arc::new(AtomicBool::new(false)),
            },
        );
    }

    /// One-shot, idempotent: repeated calls are no-ops once cancelled.
    pub fn set_cancelled(&self, session_id: &str) {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        if let Some(entry) = sessions.get(session_id) {
            entry.cancelled.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self, session_id: &str) -> bool {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        sessions
            .get(session_id)
            .map(|e| e.cancelled.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Monotonic: primary → degraded only. Never resets to primary once set.
    pub fn set_degraded(&self, session_id: &str) {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        if let Some(entry) = sessions.get(session_id) {
            entry.degraded.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_degraded(&self, session_id: &str) -> bool {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        sessions
            .get(session_id)
            .map(|e| e.degraded.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn cleanup(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_monotonic_and_idempotent() {
        let reg = SessionRegistry::new();
        reg.create("s1");
        assert!(!reg.is_cancelled("s1"));
        reg.set_cancelled("s1");
        assert!(reg.is_cancelled("s1"));
        reg.set_cancelled("s1"); // idempotent
        assert!(reg.is_cancelled("s1"));
    }

    #[test]
    fn degradation_is_per_session() {
        let reg = SessionRegistry::new();
        reg.create("a");
        reg.create("b");
        reg.set_degraded("a");
        assert!(reg.is_degraded("a"));
        assert!(!reg.is_degraded("b"));
    }

    #[test]
    fn cleanup_removes_entry() {
        let reg = SessionRegistry::new();
        reg.create("s1");
        reg.set_cancelled("s1");
        reg.cleanup("s1");
        // Unknown session reads as not-cancelled, not-degraded.
        assert!(!reg.is_cancelled("s1"));
        assert!(!reg.is_degraded("s1"));
    }

    #[test]
    fn unknown_session_defaults_are_safe() {
        let reg = SessionRegistry::new();
        assert!(!reg.is_cancelled("ghost"));
        assert!(!reg.is_degraded("ghost"));
    }
}
