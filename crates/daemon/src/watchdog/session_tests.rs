// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::deployment::DeploymentStore;
use crate::watchdog::test_helpers::{
    commit_fake_deployment, fake_toolchain, test_instance_id, FakeTopicClient, TEST_TOOLCHAIN,
};
use gk_adapters::ProcessExecutor;
use gk_core::InstanceId;

struct Fixture {
    _dir: tempfile::TempDir,
    deps: SessionDeps,
    store: DeploymentStore,
    toolchain: crate::toolchain::ToolchainManager,
    topic: Arc<FakeTopicClient>,
}

async fn fixture(run_secs: f32) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = fake_toolchain(&dir.path().join("Toolchain"), run_secs);
    let store = DeploymentStore::new(dir.path().join("Game"));
    commit_fake_deployment(&store, 1).await;
    let topic = Arc::new(FakeTopicClient::default());
    let deps = SessionDeps {
        instance: test_instance_id(),
        executor: ProcessExecutor,
        registrar: BridgeRegistrar::new(),
        topic: topic.clone(),
        bridge_port: 5580,
    };
    Fixture { _dir: dir, deps, store, toolchain, topic }
}

fn launch_session(fx: &Fixture, params: LaunchParameters, port: u16) -> SessionController {
    let deployment = fx.store.latest().unwrap();
    let dmb = fx.store.acquire(&deployment.id).unwrap();
    let lock = fx.toolchain.acquire_shared(TEST_TOOLCHAIN).unwrap();
    SessionController::launch(fx.deps.clone(), dmb, lock, params, port, true, false).unwrap()
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn launch_registers_bridge_and_runs() {
    let fx = fixture(30.0).await;
    let session = launch_session(&fx, LaunchParameters::default(), free_port());

    assert!(session.running());
    assert!(!*session.initialised().borrow());
    assert_eq!(session.access_identifier().len(), 32);
    assert!(fx.deps.registrar.registered(session.access_identifier()));

    session.terminate(false).await;
    assert!(!session.running());
    assert!(!fx.deps.registrar.registered(session.access_identifier()));
}

#[tokio::test]
async fn startup_handshake_marks_initialised() {
    let fx = fixture(30.0).await;
    let session = launch_session(&fx, LaunchParameters::default(), free_port());

    fx.deps
        .registrar
        .dispatch(session.access_identifier(), BridgeRequest::Startup)
        .unwrap();
    let mut initialised = session.initialised();
    tokio::time::timeout(Duration::from_secs(2), initialised.wait_for(|v| *v))
        .await
        .expect("handshake not observed")
        .unwrap();

    session.terminate(false).await;
}

#[tokio::test]
async fn exit_watch_fires_when_process_dies() {
    let fx = fixture(0.1).await;
    let session = launch_session(&fx, LaunchParameters::default(), free_port());

    let mut exited = session.exited();
    tokio::time::timeout(Duration::from_secs(5), exited.wait_for(|v| v.is_some()))
        .await
        .expect("exit not observed")
        .unwrap();
    assert!(!session.running());
}

#[tokio::test]
async fn port_collision_is_a_conflict() {
    let fx = fixture(30.0).await;
    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let deployment = fx.store.latest().unwrap();
    let dmb = fx.store.acquire(&deployment.id).unwrap();
    let lock = fx.toolchain.acquire_shared(TEST_TOOLCHAIN).unwrap();
    let err = SessionController::launch(
        fx.deps.clone(),
        dmb,
        lock,
        LaunchParameters::default(),
        port,
        true,
        false,
    )
    .unwrap_err();
    assert_eq!(err.code, Some(ErrorCode::DreamDaemonPortInUse));
}

#[tokio::test]
async fn security_level_is_clamped_to_deployment_minimum() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = fake_toolchain(&dir.path().join("Toolchain"), 30.0);
    let store = DeploymentStore::new(dir.path().join("Game"));
    let mut deployment = commit_fake_deployment(&store, 1).await;
    deployment.minimum_security = SecurityLevel::Trusted;
    store.commit(deployment.clone());

    let deps = SessionDeps {
        instance: InstanceId::from("ins-clamp"),
        executor: ProcessExecutor,
        registrar: BridgeRegistrar::new(),
        topic: Arc::new(FakeTopicClient::default()),
        bridge_port: 5580,
    };
    let dmb = store.acquire(&deployment.id).unwrap();
    let lock = toolchain.acquire_shared(TEST_TOOLCHAIN).unwrap();
    let params = LaunchParameters {
        security_level: SecurityLevel::Safe,
        ..LaunchParameters::default()
    };
    let session =
        SessionController::launch(deps, dmb, lock, params, free_port(), true, false).unwrap();
    assert_eq!(session.security_level(), SecurityLevel::Trusted);
    session.terminate(false).await;
}

#[tokio::test]
async fn reattach_rebinds_by_pid() {
    let fx = fixture(30.0).await;
    let session = launch_session(&fx, LaunchParameters::default(), free_port());
    let record = session.reattach_record();
    // Simulate a controller restart: drop the owning controller but keep
    // the process. Dropping cancels the monitors without killing.
    let pid = session.pid();
    drop(session);
    assert!(fx.deps.executor.pid_alive(pid));

    let dmb = fx.store.acquire(&record.deployment).unwrap();
    let rebound = SessionController::reattach(
        fx.deps.clone(),
        &record,
        dmb,
        None,
        LaunchParameters::default(),
    );
    assert!(rebound.running());
    assert!(*rebound.initialised().borrow());
    assert_eq!(rebound.pid(), pid);

    rebound.terminate(false).await;
    let mut exited = rebound.exited();
    tokio::time::timeout(Duration::from_secs(5), exited.wait_for(|v| v.is_some()))
        .await
        .expect("reattached exit not observed")
        .unwrap();
}

#[tokio::test]
async fn send_topic_uses_configured_timeout() {
    let fx = fixture(30.0).await;
    let session = launch_session(&fx, LaunchParameters::default(), free_port());
    let response = session.send_topic(r#"{"command":"health"}"#).await.unwrap();
    assert_eq!(response, "ok");
    assert_eq!(fx.topic.sent.load(std::sync::atomic::Ordering::SeqCst), 1);
    session.terminate(false).await;
}

#[test]
fn command_line_matches_template() {
    let params = LaunchParameters {
        allow_web_client: true,
        ..LaunchParameters::default()
    };
    let args = command_line("station.dmb", &params, 1337, SecurityLevel::Safe, false, 5580, "c0ffee");
    assert_eq!(args[0], "station.dmb");
    let joined = args.join(" ");
    assert!(joined.contains("-port 1337"));
    assert!(joined.contains("-ports 1-65535"));
    assert!(joined.contains("-webclient"));
    assert!(joined.contains("-close"));
    assert!(joined.contains("-safe"));
    assert!(joined.contains("-public"));
    assert!(joined.contains("access_identifier=c0ffee"));
    assert!(joined.contains("bridge_port=5580"));
}

#[test]
fn validate_flag_hides_visibility() {
    let args = command_line(
        "station.dmb",
        &LaunchParameters::default(),
        1337,
        SecurityLevel::Trusted,
        true,
        5580,
        "c0ffee",
    );
    let joined = args.join(" ");
    assert!(joined.contains("-invisible"));
    assert!(!joined.contains("-public"));
    assert!(joined.contains("-trusted"));
}
