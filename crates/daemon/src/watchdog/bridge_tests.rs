// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::io::AsyncReadExt;

#[tokio::test]
async fn dispatch_routes_by_identifier() {
    let registrar = BridgeRegistrar::new();
    let mut alpha = registrar.register("alpha");
    let mut beta = registrar.register("beta");

    registrar.dispatch("alpha", BridgeRequest::Startup).unwrap();
    registrar
        .dispatch("beta", BridgeRequest::Chat { message: "who".to_string() })
        .unwrap();

    assert_eq!(alpha.recv().await, Some(BridgeRequest::Startup));
    assert_eq!(
        beta.recv().await,
        Some(BridgeRequest::Chat { message: "who".to_string() })
    );
}

#[tokio::test]
async fn unknown_identifier_is_rejected() {
    let registrar = BridgeRegistrar::new();
    let err = registrar.dispatch("nope", BridgeRequest::Startup).unwrap_err();
    assert_eq!(err.kind, gk_core::ErrorKind::Auth);
}

#[tokio::test]
async fn deregister_stops_routing() {
    let registrar = BridgeRegistrar::new();
    let _rx = registrar.register("alpha");
    assert!(registrar.registered("alpha"));
    registrar.deregister("alpha");
    assert!(!registrar.registered("alpha"));
    assert!(registrar.dispatch("alpha", BridgeRequest::Reboot).is_err());
}

#[tokio::test]
async fn tcp_topic_client_round_trips_one_line() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 256];
        let n = socket.read(&mut buf).await.unwrap();
        assert!(buf[..n].ends_with(b"\n"));
        socket.write_all(b"pong\n").await.unwrap();
    });

    let client = TcpTopicClient;
    let response = client
        .send(port, r#"{"command":"health"}"#, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(response, "pong");
}

#[tokio::test]
async fn tcp_topic_client_times_out_symmetrically() {
    // A listener that accepts and never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let client = TcpTopicClient;
    let err = client
        .send(port, "ping", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err.kind, gk_core::ErrorKind::Transient);
}
