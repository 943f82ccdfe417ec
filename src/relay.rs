//! Relay supervisor: turns device events into sessions.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::emitter::FixEmitter;
use crate::session::{CloseReason, DeviceSession, SessionHandle, SessionState};
use crate::sink::LocationSink;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::stream::ThrottleExt;
use crate::transport::{DeviceEvent, Transport};
use crate::types::{Fix, UpdateRate};
use crate::{RelayError, Result};

/// Fix rate assumed when normalising subscription rates. Most consumer
/// receivers emit at 1 to 10 Hz.
pub const NOMINAL_FIX_RATE_HZ: f64 = 10.0;

type ConsentGate = Box<dyn Fn() -> bool + Send + Sync>;

/// Supervises at most one device session and owns the fix emitter.
///
/// Must be created inside a Tokio runtime: the emitter task is spawned
/// immediately.
pub struct GpsRelay {
    config: RelayConfig,
    stats: Arc<PipelineStats>,
    fixes: Option<mpsc::Sender<Fix>>,
    latest: watch::Receiver<Option<Arc<Fix>>>,
    state: Arc<watch::Sender<SessionState>>,
    session: Option<SessionHandle>,
    next_session_id: u64,
    consent: Option<ConsentGate>,
    emitter_cancel: CancellationToken,
    emitter: Option<JoinHandle<()>>,
}

impl GpsRelay {
    /// Validate `config` and start the emitter that feeds `sink`.
    pub fn new<S: LocationSink>(config: RelayConfig, sink: S) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(PipelineStats::new());
        let (fix_tx, fix_rx) = mpsc::channel(config.fix_channel_capacity);
        let emitter = FixEmitter::new(sink, config.suppress_stale_fixes, Arc::clone(&stats));
        let latest = emitter.latest();

        let emitter_cancel = CancellationToken::new();
        let cancel = emitter_cancel.clone();
        let emitter = tokio::spawn(async move {
            emitter.run(fix_rx, cancel).await;
        });

        let (state, _) = watch::channel(SessionState::Closed);

        info!(line = %config.line, strict_checksum = config.strict_checksum, "GPS relay started");

        Ok(Self {
            config,
            stats,
            fixes: Some(fix_tx),
            latest,
            state: Arc::new(state),
            session: None,
            next_session_id: 1,
            consent: None,
            emitter_cancel,
            emitter: Some(emitter),
        })
    }

    /// Refuse attaches while `gate` returns `false`, e.g. while the user has
    /// not allowed synthetic location input.
    pub fn with_consent_gate<F>(mut self, gate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.consent = Some(Box::new(gate));
        self
    }

    /// Start a session over `transport`.
    ///
    /// Fails with [`RelayError::SessionActive`] while another session is
    /// still running, and with [`RelayError::ConsentDenied`] when the consent
    /// gate refuses.
    pub fn attach<T: Transport>(&mut self, transport: T) -> Result<u64> {
        let Some(fixes) = self.fixes.clone() else {
            return Err(RelayError::Shutdown);
        };

        if let Some(gate) = &self.consent {
            if !gate() {
                warn!(transport = %transport.describe(), "Attach refused, consent not granted");
                return Err(RelayError::ConsentDenied);
            }
        }

        if let Some(active) = self.session.as_ref().filter(|s| !s.state().is_terminated()) {
            warn!(
                session = active.id(),
                transport = %transport.describe(),
                "Attach refused, a session is already active"
            );
            return Err(RelayError::SessionActive { session_id: active.id() });
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        info!(session = id, transport = %transport.describe(), "Device attached");
        let handle = DeviceSession::new(id, transport, &self.config, fixes, Arc::clone(&self.stats))
            .with_state_channel(Arc::clone(&self.state))
            .spawn();
        self.session = Some(handle);

        Ok(id)
    }

    /// Stop the active session, if any, and wait for it to release the
    /// transport. Returns why the session ended.
    pub async fn detach(&mut self) -> Option<CloseReason> {
        let handle = self.session.take()?;
        info!(session = handle.id(), "Device detached");
        handle.detach();

        match handle.join().await {
            Ok(reason) => Some(reason),
            Err(e) => {
                debug!(error = %e, "Session had already failed before detach");
                self.state.borrow().close_reason()
            }
        }
    }

    /// Apply one platform device event.
    pub async fn handle_event<T: Transport>(&mut self, event: DeviceEvent<T>) -> Result<()> {
        match event {
            DeviceEvent::Attached(transport) => self.attach(transport).map(|_| ()),
            DeviceEvent::Detached => {
                self.detach().await;
                Ok(())
            }
        }
    }

    /// Apply events until the stream ends. Refused attaches are logged and
    /// skipped. The active session keeps running after the stream ends.
    pub async fn run<T, E>(&mut self, events: E) -> Result<()>
    where
        T: Transport,
        E: Stream<Item = DeviceEvent<T>>,
    {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            if let Err(e) = self.handle_event(event).await {
                if matches!(e, RelayError::Shutdown) {
                    return Err(e);
                }
                warn!(error = %e, "Device event rejected");
            }
        }
        debug!("Device event stream ended");
        Ok(())
    }

    /// State of the current (or most recent) session.
    pub fn session_state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Stream of session state changes across all sessions.
    pub fn state_updates(&self) -> impl Stream<Item = SessionState> + 'static {
        WatchStream::new(self.state.subscribe())
    }

    /// Restarts performed by the current session.
    pub fn restart_count(&self) -> u32 {
        self.session.as_ref().map_or(0, SessionHandle::restart_count)
    }

    /// The most recent fix the sink accepted.
    pub fn latest_fix(&self) -> Option<Arc<Fix>> {
        self.latest.borrow().clone()
    }

    /// Stream of fixes the sink accepted.
    ///
    /// Backed by a watch channel: a slow consumer sees the latest fix and
    /// skips the ones in between. Use a [`ChannelSink`](crate::ChannelSink)
    /// to observe every fix.
    pub fn fix_updates(&self) -> impl Stream<Item = Arc<Fix>> + 'static {
        WatchStream::new(self.latest.clone()).filter_map(|fix| async move { fix })
    }

    /// Fix stream capped at `rate`.
    pub fn subscribe(&self, rate: UpdateRate) -> BoxStream<'static, Arc<Fix>> {
        let fixes = self.fix_updates();
        match rate.throttle_interval(NOMINAL_FIX_RATE_HZ) {
            None => fixes.boxed(),
            Some(interval) => fixes.throttle(interval).boxed(),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Detach the active session, flush pending fixes to the sink and stop
    /// the emitter. Further attaches fail with [`RelayError::Shutdown`].
    pub async fn shutdown(&mut self) -> Result<()> {
        self.detach().await;

        // Emitter exits once the last sender is gone
        self.fixes = None;
        if let Some(emitter) = self.emitter.take() {
            emitter.await.map_err(|e| RelayError::SessionTask { reason: e.to_string() })?;
        }

        info!(stats = ?self.stats.snapshot(), "GPS relay shut down");
        Ok(())
    }
}

impl Drop for GpsRelay {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            debug!(session = session.id(), "Dropping relay with active session");
            session.detach();
        }
        self.emitter_cancel.cancel();
    }
}

impl std::fmt::Debug for GpsRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpsRelay")
            .field("state", &self.session_state())
            .field("session", &self.session)
            .field("consent_gate", &self.consent.is_some())
            .finish()
    }
}
