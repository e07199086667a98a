/// Per-session continuation bookkeeping.
///
/// Entries are created lazily on the first idle event for a session and are
/// never removed; the registry lives as long as the process.
use std::collections::HashMap;

/// Mutable record kept for each session the reactor has seen go idle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Continuations already sent to this session.
    pub continue_count: u32,
    /// Wall-clock ms of the most recent continuation (None = never).
    pub last_continue_ms: Option<u64>,
}

impl SessionState {
    fn in_cooldown(&self, now_ms: u64, cooldown_ms: u64) -> bool {
        self.last_continue_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < cooldown_ms)
    }
}

/// Decision returned by the registry after evaluating an idle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueDecision {
    /// Last continuation was too recent; do nothing.
    CooldownActive,
    /// Session already received `max` continuations.
    LimitReached { max: u32 },
    /// Continuation recorded; `count` is the new total for the session.
    Continue { count: u32 },
}

#[derive(Debug, Default)]
pub struct SessionStateRegistry {
    sessions: HashMap<String, SessionState>,
}

impl SessionStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, session_id: &str) -> &mut SessionState {
        if !self.sessions.contains_key(session_id) {
            tracing::debug!(session_id, "tracking new session");
        }
        self.sessions.entry(session_id.to_string()).or_default()
    }

    #[allow(dead_code)]
    pub fn get(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sum of continuations sent across every tracked session.
    pub fn total_continues(&self) -> u64 {
        self.sessions
            .values()
            .map(|s| u64::from(s.continue_count))
            .sum()
    }

    /// Check cooldown, then cap, and record a continuation if both pass.
    ///
    /// `cap` of `None` means unlimited. The state is updated before any
    /// prompt is sent and is never rolled back.
    pub fn evaluate(
        &mut self,
        session_id: &str,
        now_ms: u64,
        cap: Option<u32>,
        cooldown_ms: u64,
    ) -> ContinueDecision {
        let state = self.get_or_create(session_id);

        if state.in_cooldown(now_ms, cooldown_ms) {
            return ContinueDecision::CooldownActive;
        }

        if let Some(max) = cap {
            if state.continue_count >= max {
                return ContinueDecision::LimitReached { max };
            }
        }

        state.continue_count += 1;
        // Keep the timestamp monotonic if the wall clock steps backwards.
        let stamp = state.last_continue_ms.map_or(now_ms, |last| last.max(now_ms));
        state.last_continue_ms = Some(stamp);
        ContinueDecision::Continue {
            count: state.continue_count,
        }
    }
}
