/// Event loop: subscribe to the host, feed every event to the reactor, and
/// resubscribe with exponential backoff when the stream drops.
use crate::config::ReconnectConfig;
use crate::host::{HostClient, HostEvent};
use crate::opencode::{OpencodeClient, OpencodeError};
use crate::reactor::{IdleContinuationReactor, ReactorSummary};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Something the runner can subscribe to for host events.
#[async_trait]
pub trait EventSource: Send + Sync {
    type Error: Display + Send;

    async fn subscribe(
        &self,
    ) -> Result<BoxStream<'static, Result<HostEvent, Self::Error>>, Self::Error>;
}

#[async_trait]
impl EventSource for OpencodeClient {
    type Error = OpencodeError;

    async fn subscribe(
        &self,
    ) -> Result<BoxStream<'static, Result<HostEvent, OpencodeError>>, OpencodeError> {
        OpencodeClient::subscribe(self).await
    }
}

/// Calculate exponential backoff delay for reconnects.
///
/// Returns `initial_delay * 2^consecutive_count`, capped at `max_delay`.
pub fn backoff_delay(initial_delay_ms: u64, consecutive_count: u32, max_delay_ms: u64) -> u64 {
    let shift = 1u64.checked_shl(consecutive_count).unwrap_or(u64::MAX);
    let delay = initial_delay_ms.saturating_mul(shift);
    delay.min(max_delay_ms)
}

/// Hand each event to the reactor, one at a time, until the stream ends.
///
/// Each event is fully handled (including the prompt submission) before the
/// next one is pulled. A stream error stops the drive and is returned.
pub async fn drive<C, S, E>(reactor: &IdleContinuationReactor<C>, events: S) -> Result<u64, E>
where
    C: HostClient,
    S: Stream<Item = Result<HostEvent, E>>,
{
    futures::pin_mut!(events);
    let mut handled = 0u64;
    while let Some(event) = events.next().await {
        let event = event?;
        let outcome = reactor.handle_event(&event).await;
        tracing::trace!(?event, ?outcome, "event handled");
        handled += 1;
    }
    Ok(handled)
}

/// Run until `shutdown` resolves, reconnecting whenever the stream ends.
pub async fn run<S, C, F>(
    source: &S,
    reactor: &IdleContinuationReactor<C>,
    reconnect: &ReconnectConfig,
    shutdown: F,
) -> ReactorSummary
where
    S: EventSource,
    C: HostClient,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut consecutive_failures: u32 = 0;

    loop {
        let subscribed = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            result = source.subscribe() => result,
        };

        match subscribed {
            Ok(events) => {
                consecutive_failures = 0;
                tracing::info!("listening for session idle events");
                let result = tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    result = drive(reactor, events) => result,
                };
                match result {
                    Ok(handled) => tracing::warn!(handled, "event stream closed by host"),
                    Err(e) => tracing::warn!(error = %e, "event stream failed"),
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt = consecutive_failures.saturating_add(1),
                    "failed to subscribe to host events"
                );
            }
        }

        let delay_ms = backoff_delay(
            reconnect.initial_delay_ms,
            consecutive_failures,
            reconnect.max_delay_ms,
        );
        consecutive_failures = consecutive_failures.saturating_add(1);
        tracing::info!(delay_ms, "reconnecting to host");

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
    }

    let summary = reactor.summary();
    tracing::info!(
        sessions = summary.sessions,
        continues = summary.continues,
        "auto-continue shutting down"
    );
    summary
}
