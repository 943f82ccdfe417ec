//! Fix emitter: the single owner of the location sink.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::sink::LocationSink;
use crate::stats::PipelineStats;
use crate::types::Fix;

/// What happened to one fix handed to [`FixEmitter::emit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Forwarded,
    /// Sink was unregistered or refused the fix
    Dropped,
    /// Older than the last forwarded fix, under stale suppression
    Stale,
}

/// Forwards fixes to a [`LocationSink`] and publishes the latest one.
pub struct FixEmitter<S> {
    sink: S,
    suppress_stale: bool,
    last_forwarded: Option<DateTime<Utc>>,
    latest: watch::Sender<Option<Arc<Fix>>>,
    stats: Arc<PipelineStats>,
}

impl<S: LocationSink> FixEmitter<S> {
    pub fn new(sink: S, suppress_stale: bool, stats: Arc<PipelineStats>) -> Self {
        let (latest, _) = watch::channel(None);
        Self { sink, suppress_stale, last_forwarded: None, latest, stats }
    }

    /// Receiver that always holds the most recent fix the sink accepted.
    pub fn latest(&self) -> watch::Receiver<Option<Arc<Fix>>> {
        self.latest.subscribe()
    }

    pub async fn emit(&mut self, fix: Fix) -> EmitOutcome {
        if self.suppress_stale {
            if let Some(last) = self.last_forwarded {
                if fix.timestamp() < last {
                    debug!(timestamp = %fix.timestamp(), last = %last, "Dropping stale fix");
                    self.stats.record_stale();
                    return EmitOutcome::Stale;
                }
            }
        }

        if !self.sink.is_registered() {
            debug!("Location sink not registered, dropping fix");
            self.stats.record_dropped();
            return EmitOutcome::Dropped;
        }

        let timestamp = fix.timestamp();
        let published = Arc::new(fix.clone());
        if self.sink.push(fix).await {
            self.latest.send_replace(Some(published));
            self.last_forwarded = Some(timestamp);
            self.stats.record_forwarded();
            EmitOutcome::Forwarded
        } else {
            debug!(%timestamp, "Location sink refused fix");
            self.stats.record_dropped();
            EmitOutcome::Dropped
        }
    }

    /// Emit every fix received on `fixes` until all senders are gone or
    /// `cancel` fires. Returns the sink so it can be reused.
    pub async fn run(mut self, mut fixes: mpsc::Receiver<Fix>, cancel: CancellationToken) -> S {
        info!("Fix emitter started");
        let mut emitted = 0u64;

        loop {
            let fix = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Fix emitter cancelled");
                    break;
                }
                fix = fixes.recv() => fix,
            };

            let Some(fix) = fix else {
                debug!("All fix producers gone");
                break;
            };

            if self.emit(fix).await == EmitOutcome::Forwarded {
                emitted += 1;
            }
        }

        info!(forwarded = emitted, "Fix emitter stopped");
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingSink, sample_fix};

    fn emitter(sink: RecordingSink, suppress_stale: bool) -> FixEmitter<RecordingSink> {
        FixEmitter::new(sink, suppress_stale, Arc::new(PipelineStats::new()))
    }

    #[tokio::test]
    async fn forwards_in_order_and_publishes_latest() {
        let sink = RecordingSink::new();
        let mut emitter = emitter(sink.clone(), false);
        let latest = emitter.latest();

        assert_eq!(emitter.emit(sample_fix(1)).await, EmitOutcome::Forwarded);
        assert_eq!(emitter.emit(sample_fix(2)).await, EmitOutcome::Forwarded);

        assert_eq!(sink.fixes(), vec![sample_fix(1), sample_fix(2)]);
        assert_eq!(latest.borrow().as_deref(), Some(&sample_fix(2)));
    }

    #[tokio::test]
    async fn drops_silently_when_unregistered_or_refused() {
        let sink = RecordingSink::new();
        let mut emitter = emitter(sink.clone(), false);
        let latest = emitter.latest();

        sink.set_registered(false);
        assert_eq!(emitter.emit(sample_fix(1)).await, EmitOutcome::Dropped);

        sink.set_registered(true);
        sink.set_accepting(false);
        assert_eq!(emitter.emit(sample_fix(2)).await, EmitOutcome::Dropped);

        assert!(sink.fixes().is_empty());
        assert!(latest.borrow().is_none());
        assert_eq!(emitter.stats.snapshot().fixes_dropped, 2);

        sink.set_accepting(true);
        assert_eq!(emitter.emit(sample_fix(3)).await, EmitOutcome::Forwarded);
        assert_eq!(latest.borrow().as_deref(), Some(&sample_fix(3)));
    }

    #[tokio::test]
    async fn stale_suppression_is_opt_in() {
        let sink = RecordingSink::new();
        let mut forwarding = emitter(sink.clone(), false);
        forwarding.emit(sample_fix(5)).await;
        assert_eq!(forwarding.emit(sample_fix(3)).await, EmitOutcome::Forwarded);

        let mut suppressing = emitter(RecordingSink::new(), true);
        suppressing.emit(sample_fix(5)).await;
        assert_eq!(suppressing.emit(sample_fix(3)).await, EmitOutcome::Stale);
        assert_eq!(suppressing.emit(sample_fix(5)).await, EmitOutcome::Forwarded);
    }

    #[tokio::test]
    async fn run_drains_channel_until_senders_drop() {
        let sink = RecordingSink::new();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(emitter(sink.clone(), false).run(rx, CancellationToken::new()));

        for n in 0..3 {
            tx.send(sample_fix(n)).await.unwrap();
        }
        drop(tx);

        task.await.unwrap();
        assert_eq!(sink.fixes().len(), 3);
    }
}
