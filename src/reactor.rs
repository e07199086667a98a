/// Idle-continuation reactor: turns `session.idle` events into "continue" prompts.
///
/// Each idle event is checked against the session's cooldown and the
/// configured cap. Accepted events are recorded in the registry before the
/// prompt is sent; a failed send is logged and otherwise ignored.
use crate::config::{ContinueConfig, ContinueLimit};
use crate::host::{HostClient, HostEvent, LogLevel, PromptPart, SubmitError};
use crate::registry::{ContinueDecision, SessionStateRegistry};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// What the reactor did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not an idle event.
    Ignored,
    CooldownSuppressed,
    Capped,
    /// Continuation recorded; `delivered` is false when the send failed.
    Continued { count: u32, delivered: bool },
}

/// Totals reported at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactorSummary {
    pub sessions: usize,
    pub continues: u64,
}

pub struct IdleContinuationReactor<C: HostClient> {
    client: Arc<C>,
    registry: Mutex<SessionStateRegistry>,
    clock: Box<dyn Clock>,
    message: String,
    cap: Option<u32>,
    cooldown_ms: u64,
}

impl<C: HostClient> IdleContinuationReactor<C> {
    /// Build the reactor, announcing the effective cap through the host log.
    ///
    /// Returns `None` when continuations are disabled (`max_continues < 0`);
    /// in that case nothing should be subscribed to the event stream.
    pub async fn install(
        config: &ContinueConfig,
        client: Arc<C>,
        registry: SessionStateRegistry,
        clock: Box<dyn Clock>,
    ) -> Option<Self> {
        let cap = match config.limit() {
            ContinueLimit::Disabled => {
                tracing::info!(max_continues = config.max_continues, "auto-continue disabled");
                client
                    .log(LogLevel::Info, "Plugin disabled (MAX_CONTINUES = -1)")
                    .await;
                return None;
            }
            ContinueLimit::Unlimited => None,
            ContinueLimit::Capped(max) => Some(max),
        };

        let limit = config.limit();
        tracing::info!(
            max = %limit,
            cooldown_ms = config.cooldown_ms,
            message = %config.message,
            "auto-continue initialized"
        );
        client
            .log(LogLevel::Info, &format!("Plugin initialized (max: {limit})"))
            .await;

        Some(Self {
            client,
            registry: Mutex::new(registry),
            clock,
            message: config.message.clone(),
            cap,
            cooldown_ms: config.cooldown_ms,
        })
    }

    /// Handle one host event. Never fails; the outcome is informational.
    pub async fn handle_event(&self, event: &HostEvent) -> EventOutcome {
        let session_id = match event {
            HostEvent::SessionIdle { session_id } => session_id,
            HostEvent::Other { .. } => return EventOutcome::Ignored,
        };

        // The lock covers check-and-record only and is released before any await.
        let decision = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.evaluate(session_id, self.clock.now_ms(), self.cap, self.cooldown_ms)
        };

        match decision {
            ContinueDecision::CooldownActive => {
                tracing::debug!(session_id = %session_id, "idle within cooldown, skipping");
                EventOutcome::CooldownSuppressed
            }
            ContinueDecision::LimitReached { max } => {
                tracing::info!(session_id = %session_id, max, "session reached max continues");
                self.client
                    .log(
                        LogLevel::Info,
                        &format!("Session {session_id} reached max continues ({max})"),
                    )
                    .await;
                EventOutcome::Capped
            }
            ContinueDecision::Continue { count } => {
                let progress = match self.cap {
                    Some(max) => format!("{count}/{max}"),
                    None => count.to_string(),
                };
                tracing::info!(session_id = %session_id, count, max = ?self.cap, "continuing session");
                self.client
                    .log(
                        LogLevel::Info,
                        &format!("Continuing session {session_id} ({progress})"),
                    )
                    .await;

                let delivered = match self.submit_continuation(session_id).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(session_id = %session_id, error = %e, "failed to send continue");
                        self.client
                            .log(LogLevel::Error, &format!("Failed to send continue: {e}"))
                            .await;
                        false
                    }
                };
                EventOutcome::Continued { count, delivered }
            }
        }
    }

    async fn submit_continuation(&self, session_id: &str) -> Result<(), SubmitError> {
        let parts = [PromptPart::Text {
            text: self.message.clone(),
        }];
        self.client.prompt_async(session_id, &parts).await
    }

    pub fn summary(&self) -> ReactorSummary {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        ReactorSummary {
            sessions: registry.len(),
            continues: registry.total_continues(),
        }
    }

    #[cfg(test)]
    fn continue_count(&self, session_id: &str) -> Option<u32> {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.get(session_id).map(|s| s.continue_count)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock whose time only moves when the test says so.
    #[derive(Clone)]
    pub struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        pub fn new(start_ms: u64) -> Self {
            Self(Arc::new(AtomicU64::new(start_ms)))
        }

        pub fn advance(&self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Host client that records every call and can be told to fail submissions.
    #[derive(Default)]
    pub struct RecordingClient {
        pub fail_submissions: bool,
        pub logs: Mutex<Vec<(LogLevel, String)>>,
        pub prompts: Mutex<Vec<(String, Vec<PromptPart>)>>,
    }

    impl RecordingClient {
        pub fn failing() -> Self {
            Self {
                fail_submissions: true,
                ..Default::default()
            }
        }

        pub fn logs(&self) -> Vec<(LogLevel, String)> {
            self.logs.lock().unwrap().clone()
        }

        pub fn prompts(&self) -> Vec<(String, Vec<PromptPart>)> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HostClient for RecordingClient {
        async fn log(&self, level: LogLevel, message: &str) {
            self.logs.lock().unwrap().push((level, message.to_string()));
        }

        async fn prompt_async(
            &self,
            session_id: &str,
            parts: &[PromptPart],
        ) -> Result<(), SubmitError> {
            self.prompts
                .lock()
                .unwrap()
                .push((session_id.to_string(), parts.to_vec()));
            if self.fail_submissions {
                return Err(SubmitError::Status {
                    status: 500,
                    body: "session busy".to_string(),
                });
            }
            Ok(())
        }
    }
}
