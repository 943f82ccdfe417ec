//! Device session: owns one transport and drives the pipeline over it.
//!
//! A session runs on its own Tokio task. The transport read is the only
//! suspension point, and it is raced against the session's cancellation
//! token, so a detach always wins over a read that is still pending.

mod state;
#[cfg(test)]
mod tests;

pub use state::{CloseReason, SessionState};

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{RelayConfig, RestartPolicy};
use crate::decode::FixDecoder;
use crate::pipeline::SentencePipeline;
use crate::stats::PipelineStats;
use crate::transport::Transport;
use crate::types::{Fix, LineSettings};
use crate::{RelayError, Result};

/// How one streaming phase ended.
enum StreamEnd {
    Cancelled,
    EndOfStream,
    SinkClosed,
    ReadFailed(RelayError),
}

/// A session ready to be spawned.
pub struct DeviceSession<T> {
    id: u64,
    transport: T,
    pipeline: SentencePipeline,
    line: LineSettings,
    restart: RestartPolicy,
    fixes: mpsc::Sender<Fix>,
    state: Arc<watch::Sender<SessionState>>,
    restarts: Arc<AtomicU32>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
}

impl<T: Transport> DeviceSession<T> {
    /// Build a session that sends decoded fixes to `fixes`.
    pub fn new(
        id: u64,
        transport: T,
        config: &RelayConfig,
        fixes: mpsc::Sender<Fix>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let pipeline =
            SentencePipeline::new(config.max_sentence_len, config.strict_checksum, Arc::clone(&stats));
        let (state, _) = watch::channel(SessionState::Closed);

        Self {
            id,
            transport,
            pipeline,
            line: config.line,
            restart: config.restart,
            fixes,
            state: Arc::new(state),
            restarts: Arc::new(AtomicU32::new(0)),
            stats,
            cancel: CancellationToken::new(),
        }
    }

    /// Publish state changes on a channel shared with the caller instead of
    /// a private one. The channel is reset to `Closed` when the session spawns.
    pub fn with_state_channel(mut self, state: Arc<watch::Sender<SessionState>>) -> Self {
        self.state = state;
        self
    }

    /// Replace the decoder, e.g. to pin the date used for time-only sentences.
    pub fn with_decoder(mut self, decoder: FixDecoder) -> Self {
        self.pipeline.set_decoder(decoder);
        self
    }

    /// Start the session task. The transport is opened immediately.
    pub fn spawn(self) -> SessionHandle {
        self.state.send_replace(SessionState::Closed);

        let handle_state = Arc::clone(&self.state);
        let id = self.id;
        let cancel = self.cancel.clone();
        let restarts = Arc::clone(&self.restarts);

        let task = tokio::spawn(self.run());

        SessionHandle { id, state: handle_state, cancel, restarts, task }
    }

    async fn run(mut self) -> Result<CloseReason> {
        info!(session = self.id, transport = %self.transport.describe(), "Device session started");
        self.stats.record_session_started();

        let mut failures = 0u32;
        let outcome = loop {
            if self.cancel.is_cancelled() {
                break Ok(CloseReason::Detached);
            }

            self.transition(SessionState::Opening);
            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(session = self.id, "Detached while opening");
                    break Ok(CloseReason::Detached);
                }
                result = Self::open(&mut self.transport, &self.line) => result,
            };
            if let Err(e) = opened {
                error!(session = self.id, error = %e, "Failed to open transport");
                break Err((CloseReason::OpenFailed, e));
            }

            self.transition(SessionState::Streaming);
            let error = match self.stream(&mut failures).await {
                StreamEnd::Cancelled => break Ok(CloseReason::Detached),
                StreamEnd::EndOfStream => break Ok(CloseReason::EndOfStream),
                StreamEnd::SinkClosed => break Ok(CloseReason::SinkClosed),
                StreamEnd::ReadFailed(e) => e,
            };

            failures += 1;
            self.stats.record_read_error();
            self.transition(SessionState::Restarting);
            self.transport.close().await;
            self.pipeline.reset();

            if self.restart.is_exhausted(failures) {
                error!(
                    session = self.id,
                    failures,
                    error = %error,
                    "Too many consecutive read failures, giving up"
                );
                break Err((CloseReason::ReadFailed, error));
            }

            let backoff = self.restart.backoff(failures);
            let attempt = self.restarts.fetch_add(1, Ordering::Relaxed) + 1;
            self.stats.record_restart();
            warn!(
                session = self.id,
                attempt,
                failures,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Read failed, restarting transport"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(session = self.id, "Detached while restarting");
                    break Ok(CloseReason::Detached);
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        };

        self.transport.close().await;

        let (reason, result) = match outcome {
            Ok(reason) => (reason, Ok(reason)),
            Err((reason, e)) => (reason, Err(e)),
        };
        self.transition(SessionState::Terminated(reason));
        info!(session = self.id, reason = %reason, "Device session ended");

        result
    }

    async fn open(transport: &mut T, line: &LineSettings) -> Result<()> {
        transport.open().await?;
        if let Err(e) = transport.configure(line).await {
            transport.close().await;
            return Err(e);
        }
        debug!(transport = %transport.describe(), line = %line, "Transport ready");
        Ok(())
    }

    async fn stream(&mut self, failures: &mut u32) -> StreamEnd {
        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(session = self.id, "Detached during read");
                    return StreamEnd::Cancelled;
                }
                read = self.transport.read_chunk() => read,
            };

            let chunk = match read {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    info!(session = self.id, "Transport reached end of stream");
                    return StreamEnd::EndOfStream;
                }
                Err(e) => {
                    // A failing read racing a detach is a detach
                    if self.cancel.is_cancelled() {
                        return StreamEnd::Cancelled;
                    }
                    return StreamEnd::ReadFailed(e);
                }
            };

            *failures = 0;
            trace!(session = self.id, len = chunk.len(), "Read chunk");

            for fix in self.pipeline.process(&chunk) {
                let sent = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return StreamEnd::Cancelled,
                    sent = self.fixes.send(fix) => sent,
                };
                if sent.is_err() {
                    warn!(session = self.id, "Fix receiver gone, stopping session");
                    return StreamEnd::SinkClosed;
                }
            }
        }
    }

    fn transition(&self, next: SessionState) {
        let current = *self.state.borrow();
        if !current.can_transition_to(next) {
            warn!(session = self.id, from = %current, to = %next, "Ignoring invalid state transition");
            return;
        }
        debug!(session = self.id, from = %current, to = %next, "Session state changed");
        self.state.send_replace(next);
    }
}

/// Handle to a spawned [`DeviceSession`].
///
/// Dropping the handle does not stop the session; call
/// [`SessionHandle::detach`].
pub struct SessionHandle {
    id: u64,
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
    restarts: Arc<AtomicU32>,
    task: JoinHandle<Result<CloseReason>>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver observing every state change of this session.
    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Restarts performed after read failures.
    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Ask the session to stop. Any pending read is abandoned.
    pub fn detach(&self) {
        self.cancel.cancel();
    }

    /// Whether the session task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the session enters a state matching `predicate`.
    pub async fn wait_for_state(&self, predicate: impl FnMut(&SessionState) -> bool) -> SessionState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(predicate).await {
            Ok(state) => *state,
            // The sender lives as long as this handle
            Err(_) => *self.state.borrow(),
        }
    }

    /// Like [`SessionHandle::wait_for_state`], failing with
    /// [`RelayError::Timeout`] once `limit` has passed.
    pub async fn wait_for_state_within(
        &self,
        limit: Duration,
        predicate: impl FnMut(&SessionState) -> bool,
    ) -> Result<SessionState> {
        tokio::time::timeout(limit, self.wait_for_state(predicate))
            .await
            .map_err(|_| RelayError::Timeout { duration: limit })
    }

    /// Wait for the task to exit and return why the session ended.
    ///
    /// Open failures and exhausted restart policies are returned as errors.
    pub async fn join(self) -> Result<CloseReason> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(RelayError::SessionTask { reason: e.to_string() }),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("restarts", &self.restart_count())
            .finish()
    }
}
