//! Lifecycle tests for device sessions
//!
//! These drive a session over a scripted transport and verify state
//! transitions, restart behaviour and fix delivery.

use super::*;
use crate::test_utils::{MockController, MockTransport, SAMPLE_GGA, SAMPLE_RMC, gga_at};
use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

const WAIT: Duration = Duration::from_secs(5);

fn fast_restarts(max_consecutive_failures: u32) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.restart =
        RestartPolicy { initial_backoff_ms: 1, max_backoff_ms: 5, max_consecutive_failures };
    config
}

struct Harness {
    handle: SessionHandle,
    control: MockController,
    fixes: mpsc::Receiver<Fix>,
    stats: Arc<PipelineStats>,
}

fn start(config: RelayConfig) -> Harness {
    let _ = tracing_subscriber::fmt::try_init();

    let (transport, control) = MockTransport::new("ttyACM0");
    let (tx, fixes) = mpsc::channel(16);
    let stats = Arc::new(PipelineStats::new());
    let decoder = FixDecoder::with_reference_date(NaiveDate::from_ymd_opt(2024, 3, 23).unwrap());

    let handle = DeviceSession::new(1, transport, &config, tx, Arc::clone(&stats))
        .with_decoder(decoder)
        .spawn();

    Harness { handle, control, fixes, stats }
}

async fn next_fix(fixes: &mut mpsc::Receiver<Fix>) -> Fix {
    timeout(WAIT, fixes.recv()).await.expect("fix in time").expect("channel open")
}

async fn wait_state(handle: &SessionHandle, wanted: SessionState) {
    timeout(WAIT, handle.wait_for_state(|s| *s == wanted))
        .await
        .unwrap_or_else(|_| panic!("session never reached {wanted}, stuck in {}", handle.state()));
}

#[tokio::test]
async fn opens_configures_and_streams_fixes() {
    let mut h = start(RelayConfig::default());
    wait_state(&h.handle, SessionState::Streaming).await;

    assert_eq!(h.control.opens(), 1);
    assert_eq!(h.control.configured(), vec![LineSettings::default()]);

    h.control.push_sentence(SAMPLE_GGA);
    h.control.push_sentence(SAMPLE_RMC);

    let gga = next_fix(&mut h.fixes).await;
    let rmc = next_fix(&mut h.fixes).await;
    assert!((gga.latitude() - 48.1173).abs() < 1e-4);
    assert!((rmc.longitude() - 11.5167).abs() < 1e-4);
    assert_eq!(h.stats.snapshot().fixes_decoded, 2);

    h.handle.detach();
    assert_eq!(h.handle.join().await.unwrap(), CloseReason::Detached);
}

#[tokio::test]
async fn detach_while_blocked_in_read_terminates_without_reopening() {
    let h = start(RelayConfig::default());
    wait_state(&h.handle, SessionState::Streaming).await;

    // No bytes queued, so the session is parked inside read_chunk
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.handle.detach();
    wait_state(&h.handle, SessionState::Terminated(CloseReason::Detached)).await;

    // Data arriving after the detach is never read
    h.control.push_sentence(SAMPLE_GGA);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.control.opens(), 1);
    assert!(!h.control.is_open());
    assert_eq!(h.stats.snapshot().chunks_received, 0);
    assert_eq!(h.handle.join().await.unwrap(), CloseReason::Detached);
}

#[tokio::test]
async fn read_error_restarts_and_fixes_keep_flowing() {
    let mut h = start(fast_restarts(10));
    let mut states = h.handle.state_receiver();
    wait_state(&h.handle, SessionState::Streaming).await;

    h.control.push_sentence(SAMPLE_GGA);
    next_fix(&mut h.fixes).await;

    // Half a sentence, then the port fails; the fragment must not leak into
    // the sentence read after the restart
    h.control.push_bytes(&SAMPLE_GGA.as_bytes()[..30]);
    h.control.fail_read("device reported EIO");

    let mut seen = Vec::new();
    while seen.last() != Some(&SessionState::Streaming) || !seen.contains(&SessionState::Restarting) {
        timeout(WAIT, states.changed()).await.expect("state change").unwrap();
        let state = *states.borrow_and_update();
        info!(%state, "Observed state");
        seen.push(state);
    }
    assert_eq!(seen.last(), Some(&SessionState::Streaming));

    h.control.push_sentence(&gga_at("123520"));
    let fix = next_fix(&mut h.fixes).await;
    assert_eq!(fix.timestamp().format("%H:%M:%S").to_string(), "12:35:20");

    assert_eq!(h.control.opens(), 2);
    assert_eq!(h.control.closes(), 1);
    assert_eq!(h.handle.restart_count(), 1);
    assert_eq!(h.stats.snapshot().read_errors, 1);
    assert_eq!(h.stats.snapshot().decode_errors, 0);

    h.handle.detach();
    assert_eq!(h.handle.join().await.unwrap(), CloseReason::Detached);
}

#[tokio::test]
async fn open_failure_terminates_without_streaming() {
    let (transport, control) = MockTransport::new("ttyUSB9");
    control.set_fail_open(true);
    let (tx, _rx) = mpsc::channel(4);
    let handle = DeviceSession::new(7, transport, &RelayConfig::default(), tx, Default::default())
        .spawn();

    let mut states = handle.state_receiver();
    let err = handle.join().await.unwrap_err();
    assert!(err.is_open_failure());
    assert_eq!(*states.borrow_and_update(), SessionState::Terminated(CloseReason::OpenFailed));
    assert_eq!(control.opens(), 1);
}

#[tokio::test]
async fn configure_failure_releases_handle() {
    let (transport, control) = MockTransport::new("ttyUSB9");
    control.set_fail_configure(true);
    let (tx, _rx) = mpsc::channel(4);
    let handle = DeviceSession::new(8, transport, &RelayConfig::default(), tx, Default::default())
        .spawn();

    assert!(handle.join().await.is_err());
    assert!(!control.is_open());
}

#[tokio::test]
async fn restart_policy_exhaustion_is_reported() {
    let h = start(fast_restarts(3));
    wait_state(&h.handle, SessionState::Streaming).await;

    for _ in 0..3 {
        h.control.fail_read("EIO");
    }

    let err = timeout(WAIT, h.handle.join()).await.unwrap().unwrap_err();
    assert!(matches!(err, RelayError::TransportRead { .. }));
    assert_eq!(h.stats.snapshot().read_errors, 3);
    assert_eq!(h.stats.snapshot().restarts, 2);
    assert_eq!(h.control.opens(), 3);
}

#[tokio::test]
async fn successful_read_resets_failure_count() {
    let mut h = start(fast_restarts(2));
    wait_state(&h.handle, SessionState::Streaming).await;

    for _ in 0..3 {
        h.control.fail_read("EIO");
        h.control.push_sentence(SAMPLE_GGA);
        next_fix(&mut h.fixes).await;
    }

    assert_eq!(h.handle.state(), SessionState::Streaming);
    assert_eq!(h.handle.restart_count(), 3);
    h.handle.detach();
    h.handle.join().await.unwrap();
}

#[tokio::test]
async fn end_of_stream_terminates() {
    let mut h = start(RelayConfig::default());
    h.control.push_sentence(SAMPLE_GGA);
    h.control.end_stream();

    next_fix(&mut h.fixes).await;
    assert_eq!(h.handle.join().await.unwrap(), CloseReason::EndOfStream);
    assert!(!h.control.is_open());
}

#[tokio::test]
async fn dropped_fix_receiver_stops_session() {
    let h = start(RelayConfig::default());
    drop(h.fixes);
    h.control.push_sentence(SAMPLE_GGA);

    assert_eq!(timeout(WAIT, h.handle.join()).await.unwrap().unwrap(), CloseReason::SinkClosed);
}

#[tokio::test]
async fn waiting_for_unreachable_state_times_out() {
    let h = start(RelayConfig::default());
    wait_state(&h.handle, SessionState::Streaming).await;

    let err = h
        .handle
        .wait_for_state_within(Duration::from_millis(20), |s| s.is_terminated())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Timeout { .. }));
    assert!(err.is_retryable());

    h.handle.detach();
    let reached = h.handle.wait_for_state_within(WAIT, |s| s.is_terminated()).await.unwrap();
    assert_eq!(reached, SessionState::Terminated(CloseReason::Detached));
}

#[tokio::test]
async fn detach_during_backoff_terminates_without_reopening() {
    let mut config = RelayConfig::default();
    config.restart =
        RestartPolicy { initial_backoff_ms: 30_000, max_backoff_ms: 30_000, max_consecutive_failures: 10 };
    let h = start(config);
    wait_state(&h.handle, SessionState::Streaming).await;

    h.control.fail_read("device reported EIO");
    wait_state(&h.handle, SessionState::Restarting).await;

    let mut states = h.handle.state_receiver();
    h.handle.detach();
    let reason = timeout(WAIT, h.handle.join()).await.expect("detach cut the backoff short").unwrap();

    assert_eq!(reason, CloseReason::Detached);
    assert_eq!(*states.borrow_and_update(), SessionState::Terminated(CloseReason::Detached));
    assert_eq!(h.control.opens(), 1);
    assert_eq!(h.control.closes(), 1);
    assert!(!h.control.is_open());
    assert_eq!(h.stats.snapshot().restarts, 1);
}

#[tokio::test]
async fn detach_while_opening_abandons_open() {
    let (transport, control) = MockTransport::new("ttyUSB3");
    control.set_hang_open(true);
    let (tx, _rx) = mpsc::channel(4);
    let handle = DeviceSession::new(4, transport, &RelayConfig::default(), tx, Default::default())
        .spawn();

    wait_state(&handle, SessionState::Opening).await;
    handle.detach();

    let mut states = handle.state_receiver();
    assert_eq!(timeout(WAIT, handle.join()).await.unwrap().unwrap(), CloseReason::Detached);
    assert_eq!(*states.borrow_and_update(), SessionState::Terminated(CloseReason::Detached));
    assert_eq!(control.opens(), 1);
    assert!(!control.is_open());
    assert!(control.configured().is_empty());
}
