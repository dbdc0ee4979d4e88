//! Content server lifecycle tests
//!
//! The "server" is a placeholder process; readiness is answered by a local
//! axum endpoint on the configured port.

mod common;

use std::sync::atomic::Ordering;

use sitecheck_e2e::{E2eError, ServerHandle};

#[tokio::test]
async fn ready_on_first_success() {
    let (port, hits) = common::flaky_endpoint(0).await;
    let config = common::harness_config(port, &["sleep", "30"]);

    let mut server = ServerHandle::spawn(&config.server).unwrap();
    let attempt = server.wait_until_ready(&config.server.readiness).await.unwrap();

    assert_eq!(attempt, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(server.is_ready());
    assert_eq!(server.base_url(), format!("http://127.0.0.1:{}", port));

    server.stop().await;
    assert!(!server.is_ready());
}

#[tokio::test]
async fn error_statuses_are_retried_until_success() {
    let (port, hits) = common::flaky_endpoint(2).await;
    let config = common::harness_config(port, &["sleep", "30"]);

    let mut server = ServerHandle::spawn(&config.server).unwrap();
    let attempt = server.wait_until_ready(&config.server.readiness).await.unwrap();

    assert_eq!(attempt, 3);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    server.stop().await;
}

#[tokio::test]
async fn gives_up_after_the_attempt_budget() {
    let (port, hits) = common::flaky_endpoint(usize::MAX).await;
    let mut config = common::harness_config(port, &["sleep", "30"]);
    config.server.readiness.max_attempts = 4;

    let err = ServerHandle::start(&config.server).await.err().unwrap();

    match err {
        E2eError::ReadinessTimeout { attempts, url } => {
            assert_eq!(attempts, 4);
            assert_eq!(url, format!("http://127.0.0.1:{}/", port));
        }
        other => panic!("expected readiness timeout, got {:?}", other),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn early_exit_fails_without_burning_attempts() {
    let mut config = common::harness_config(common::closed_port(), &["sh", "-c", "exit 2"]);
    config.server.readiness.max_attempts = 30;
    config.server.readiness.interval_ms = 50;

    let started = std::time::Instant::now();
    let err = ServerHandle::start(&config.server).await.err().unwrap();

    assert!(matches!(err, E2eError::ServerStartup(_)), "{:?}", err);
    assert!(err.to_string().contains("exited before becoming ready"));
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

#[cfg(unix)]
#[tokio::test]
async fn stop_terminates_the_whole_process_group() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("child.pid");

    let (port, _) = common::flaky_endpoint(0).await;
    let mut config = common::harness_config(port, &[]);
    // Shell stays in the foreground; the real work happens in a grandchild
    config.server.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("sleep 30 & echo $! > '{}'; wait", pidfile.display()),
    ];

    let mut server = ServerHandle::start(&config.server).await.unwrap();
    let grandchild = common::read_pid(&pidfile).await;
    let leader = server.pid().unwrap() as i32;

    server.stop().await;

    assert!(common::process_gone(leader).await, "server {} still running", leader);
    assert!(
        common::process_gone(grandchild).await,
        "grandchild {} still running",
        grandchild
    );
}

#[cfg(unix)]
#[tokio::test]
async fn dropping_the_handle_kills_the_server() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("server.pid");

    let (port, _) = common::flaky_endpoint(0).await;
    let mut config = common::harness_config(port, &[]);
    config.server.command = common::pid_recording_server(&pidfile);

    let server = ServerHandle::start(&config.server).await.unwrap();
    let pid = common::read_pid(&pidfile).await;
    drop(server);

    assert!(common::process_gone(pid).await, "server {} still running", pid);
}
