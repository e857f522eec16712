//! Session lifecycle through the real Slurm adapter and local record store,
//! with the login host and local ports simulated.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use burrow_cli::application::ports::{PreferenceStore, SessionRecordStore};
use burrow_cli::application::services::session::{Budgets, SessionEnv};
use burrow_cli::application::services::status::{gather_status, verify};
use burrow_cli::domain::error::exit_code;
use burrow_cli::domain::retry::PollBudget;
use burrow_cli::domain::{
    BurrowConfig, JobName, SessionError, SessionRequest, SessionState, StateKey,
};
use burrow_cli::infra::state::StateManager;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::mocks::{InstantClock, LoopbackHost, RecordingReporter, SimulatedLoginHost, cluster};

const QUICK: Budgets = Budgets {
    allocation: PollBudget {
        ticks: 20,
        interval: Duration::from_secs(1),
    },
    readiness: PollBudget {
        ticks: 30,
        interval: Duration::from_secs(1),
    },
};

const RAW_URL: &str = "tcp://127.0.0.1:12345/abc";

fn config() -> BurrowConfig {
    let mut config = BurrowConfig::default();
    config.cluster.login_host = "login.hpc".to_string();
    config
}

fn request() -> SessionRequest {
    SessionRequest {
        hours: 2,
        partition: "gpu".to_string(),
        cpus: 4,
        ram_gb: 16,
        gpu: true,
        remote_port: 12345,
        local_port: 5555,
        image: "/images/backend.sif".to_string(),
        version: "1.4.0".to_string(),
    }
}

fn records(dir: &TempDir) -> StateManager {
    StateManager::with_path(dir.path().join("session.json"))
}

fn session_error(err: &anyhow::Error) -> &SessionError {
    err.downcast_ref::<SessionError>()
        .unwrap_or_else(|| panic!("expected a SessionError, got {err:#}"))
}

#[tokio::test]
async fn session_comes_up_with_local_link() {
    let host = SimulatedLoginHost::granting("4242", "cn42")
        .pending_for(2)
        .serving(RAW_URL);
    let cluster = cluster(&host);
    let local = LoopbackHost::default();
    let dir = TempDir::new().unwrap();
    let records = records(&dir);
    let clock = InstantClock::default();
    let reporter = RecordingReporter::default();
    let env = SessionEnv::new(&cluster, &local, &records, &clock, &reporter);

    let outcome = env
        .run(
            &config(),
            &request(),
            JobName::new(1_700_000_000, 7, 1),
            QUICK,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.link, "tcp://localhost:5555/abc");
    assert_eq!(outcome.session.node.as_deref(), Some("cn42"));
    assert_eq!(outcome.session.job_id.as_deref(), Some("4242"));
    assert_eq!(outcome.session.state, SessionState::TunnelOpen);
    assert!(!outcome.tunnel.reused);

    let tunnels = local.tunnels();
    assert_eq!(tunnels.len(), 1);
    assert_eq!(tunnels[0].node, "cn42");
    assert_eq!(tunnels[0].login_host, "login.hpc");
    assert_eq!(tunnels[0].remote_port, 12345);

    // Cleanup runs first, then exactly one submission.
    assert_eq!(&host.ops()[..3], ["cancel", "kill_clients", "reset"]);
    assert_eq!(host.count("submit"), 1);
    assert_eq!(host.count("launch"), 1);
    assert!(clock.sleeps() >= 2, "pending polls should wait");

    // The scraped URL is written back for later status and verify calls.
    assert_eq!(host.file(StateKey::JoinUrl).as_deref(), Some("tcp://127.0.0.1:12345/abc\n"));
    assert!(host.prefs().unwrap().contains("partition=gpu"));

    let saved = records.load_async().await.unwrap().unwrap();
    assert_eq!(saved.state, SessionState::TunnelOpen);
    assert_eq!(saved.local_port, 5555);
}

#[tokio::test]
async fn status_and_verify_follow_the_session_through_teardown() {
    let host = SimulatedLoginHost::granting("4242", "cn42").serving(RAW_URL);
    let cluster = cluster(&host);
    let local = LoopbackHost::default();
    let dir = TempDir::new().unwrap();
    let records = records(&dir);
    let clock = InstantClock::default();
    let reporter = RecordingReporter::default();
    let env = SessionEnv::new(&cluster, &local, &records, &clock, &reporter);
    env.run(&config(), &request(), JobName::new(1, 2, 3), QUICK, &CancellationToken::new())
        .await
        .unwrap();

    let status = gather_status(&cluster, &local, &records, 8888).await;
    assert_eq!(status.local_port, 5555, "recorded port wins over the default");
    let remote = status.remote.expect("login host reachable");
    assert_eq!(remote.node.as_deref(), Some("cn42"));
    assert_eq!(remote.job_id.as_deref(), Some("4242"));
    assert!(remote.ready);
    assert_eq!(status.scheduler.map(|s| s.state).as_deref(), Some("RUNNING"));
    assert!(status.tunnel_listening);
    assert_eq!(status.link.as_deref(), Some("tcp://localhost:5555/abc"));
    assert!(verify(&cluster, &local, 5555).await.verified());

    let first = env.teardown(5555).await;
    assert!(first.is_clean(), "{first:?}");
    let second = env.teardown(5555).await;
    assert!(second.is_clean(), "{second:?}");

    assert!(!local.is_open(5555));
    assert!(records.load_async().await.unwrap().is_none());
    assert_eq!(host.file(StateKey::Node), None);
    let after = verify(&cluster, &local, 5555).await;
    assert!(!after.verified());
    assert!(!after.ready);
}

#[tokio::test]
async fn missing_backend_fails_and_cleans_up() {
    let host = SimulatedLoginHost::granting("4242", "cn42").without_backend();
    let cluster = cluster(&host);
    let local = LoopbackHost::default();
    let dir = TempDir::new().unwrap();
    let records = records(&dir);
    let clock = InstantClock::default();
    let reporter = RecordingReporter::default();
    let env = SessionEnv::new(&cluster, &local, &records, &clock, &reporter);

    let err = env
        .run(&config(), &request(), JobName::new(1, 2, 3), QUICK, &CancellationToken::new())
        .await
        .unwrap_err();

    match session_error(&err) {
        SessionError::BackendMissing { version, node, path } => {
            assert_eq!(version, "1.4.0");
            assert_eq!(node, "cn42");
            assert!(path.starts_with("/opt/backend/1.4.0"), "path: {path}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(exit_code(&err), 1);
    assert_eq!(host.count("launch"), 0);
    assert_eq!(host.count("cancel"), 2, "cleanup before start and after failure");
    assert!(records.load_async().await.unwrap().is_none());
    assert!(reporter.warned("failed"));
}

#[tokio::test]
async fn silent_backend_times_out_with_logs() {
    let host = SimulatedLoginHost::granting("4242", "cn42");
    let cluster = cluster(&host);
    let local = LoopbackHost::default();
    let dir = TempDir::new().unwrap();
    let records = records(&dir);
    let clock = InstantClock::default();
    let reporter = RecordingReporter::default();
    let env = SessionEnv::new(&cluster, &local, &records, &clock, &reporter);

    let err = env
        .run(&config(), &request(), JobName::new(1, 2, 3), QUICK, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        session_error(&err),
        SessionError::BackendNotReady { ticks: 30, .. }
    ));
    assert_eq!(exit_code(&err), 1);
    assert_eq!(local.opens(), 0, "no tunnel without a ready backend");
}

#[tokio::test]
async fn tunnel_that_never_binds_is_reported_and_removed() {
    let host = SimulatedLoginHost::granting("4242", "cn42").serving(RAW_URL);
    let cluster = cluster(&host);
    let local = LoopbackHost {
        silent_forwards: true,
        ..LoopbackHost::default()
    };
    let dir = TempDir::new().unwrap();
    let records = records(&dir);
    let clock = InstantClock::default();
    let reporter = RecordingReporter::default();
    let env = SessionEnv::new(&cluster, &local, &records, &clock, &reporter);

    let err = env
        .run(&config(), &request(), JobName::new(1, 2, 3), QUICK, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        session_error(&err),
        SessionError::TunnelFailed {
            local_port: 5555,
            remote_port: 12345,
            ..
        }
    ));
    assert_eq!(local.opens(), 1);
    assert!(local.tunnels().is_empty(), "cleanup kills the stray forward");
}

#[tokio::test]
async fn interrupt_before_submission_exits_130() {
    let host = SimulatedLoginHost::granting("4242", "cn42").serving(RAW_URL);
    let cluster = cluster(&host);
    let local = LoopbackHost::default();
    let dir = TempDir::new().unwrap();
    let records = records(&dir);
    let clock = InstantClock::default();
    let reporter = RecordingReporter::default();
    let env = SessionEnv::new(&cluster, &local, &records, &clock, &reporter);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = env
        .run(&config(), &request(), JobName::new(1, 2, 3), QUICK, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(session_error(&err), SessionError::Interrupted));
    assert_eq!(exit_code(&err), 130);
    assert_eq!(host.count("submit"), 0);
    assert_eq!(host.count("reset"), 2);
}

#[tokio::test]
async fn unreachable_login_host_degrades_status_and_cleanup() {
    let host = SimulatedLoginHost::granting("4242", "cn42");
    host.set_reachable(false);
    let cluster = cluster(&host);
    let local = LoopbackHost::listening_on(5555);
    let dir = TempDir::new().unwrap();
    let records = records(&dir);
    let clock = InstantClock::default();
    let reporter = RecordingReporter::default();
    let env = SessionEnv::new(&cluster, &local, &records, &clock, &reporter);

    let status = gather_status(&cluster, &local, &records, 5555).await;
    assert!(status.remote.is_none());
    assert!(status.scheduler.is_none());
    assert!(status.tunnel_listening);

    let report = env.teardown(5555).await;
    assert!(!report.is_clean());
    assert!(!local.is_open(5555), "local steps still run");
    assert!(reporter.warned("cancel scheduler jobs"));
}

#[tokio::test]
async fn preferences_live_on_the_login_host() {
    let host = SimulatedLoginHost::granting("4242", "cn42");
    host.set_prefs("hours=8\ncpus=2\n");
    let cluster = cluster(&host);

    let prefs = cluster.load().await.unwrap();
    assert_eq!(prefs.get("hours"), Some("8"));
    assert_eq!(prefs.get("cpus"), Some("2"));

    let mut restored = SessionRequest::default();
    prefs.apply(&mut restored).unwrap();
    assert_eq!(restored.hours, 8);
    assert_eq!(restored.cpus, 2);
}
