use std::time::Duration;

use renos_ws::testing::{MockServer, MockSession, MockTransport};
use renos_ws::{
    ClassifiedMessage, ConnectionState, Direction, EventKind, RenosClient, RenosClientConfig,
    ResponseKind, WsFrame,
};
use tokio::sync::mpsc;

struct Harness {
    client: RenosClient<MockTransport>,
    server: MockServer,
    session: MockSession,
    messages: mpsc::UnboundedReceiver<ClassifiedMessage>,
}

async fn connected() -> Harness {
    let (transport, mut server) = MockTransport::channel_pair();
    let (sink, messages) = mpsc::unbounded_channel();
    let client = RenosClient::with_transport(
        RenosClientConfig::new("http://device.local:8081").with_message_sink(sink),
        transport,
    )
    .expect("valid config");
    assert!(client.start().await.unwrap());
    let session = server
        .next_session_timeout(Duration::from_secs(1))
        .await
        .expect("session");
    Harness {
        client,
        server,
        session,
        messages,
    }
}

async fn next_message(messages: &mut mpsc::UnboundedReceiver<ClassifiedMessage>) -> ClassifiedMessage {
    tokio::time::timeout(Duration::from_secs(1), messages.recv())
        .await
        .expect("message within a second")
        .expect("sink open")
}

async fn wait_for_state(client: &RenosClient<MockTransport>, expected: ConnectionState) {
    let mut states = client.state_changes();
    tokio::time::timeout(Duration::from_secs(1), states.wait_for(|s| *s == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {expected}"))
        .expect("supervisor alive");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn messages_reach_the_sink_in_receipt_order() {
    let mut h = connected().await;

    h.session
        .send_text(r#"{"response":"subscribe","content":{"message":"ok"}}"#)
        .unwrap();
    h.session
        .send_text(
            r#"{"event":"rfid_move","time":"2026-10-19T10:00:00Z","direction":"in",
                "epcs":[{"epc":"3034A","time":"2026-10-19T10:00:00Z"},{"epc":"3034B","time":"2026-10-19T10:00:01Z"}]}"#,
        )
        .unwrap();
    h.session
        .send_text(r#"{"response":"unknown","content":{"message":"Invalid token"}}"#)
        .unwrap();

    let ClassifiedMessage::Response(first) = next_message(&mut h.messages).await else {
        panic!("expected the subscribe response first");
    };
    assert_eq!(first.kind, ResponseKind::Subscribe);

    let ClassifiedMessage::Event(second) = next_message(&mut h.messages).await else {
        panic!("expected the move event second");
    };
    let EventKind::RfidMove { epcs, direction } = second.kind else {
        panic!("expected an rfid_move payload");
    };
    assert_eq!(direction, Direction::In);
    let ids: Vec<_> = epcs.iter().map(|t| t.epc.as_str()).collect();
    assert_eq!(ids, ["3034A", "3034B"]);

    let ClassifiedMessage::Response(third) = next_message(&mut h.messages).await else {
        panic!("expected the failure response third");
    };
    assert!(third.is_failure());
    assert_eq!(third.content_message(), Some("Invalid token"));

    h.client.finish().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_payloads_do_not_disturb_the_connection() {
    let mut h = connected().await;

    for payload in [
        "garbage",
        r#"{"event":"rfid_observation","time":"t0"}"#,
        r#"{"response": }"#,
        r#"{"unrelated":true}"#,
    ] {
        h.session.send_text(payload).unwrap();
    }
    h.session
        .send_inbound(WsFrame::Binary(bytes::Bytes::from_static(b"\x00\x01")))
        .unwrap();
    h.session
        .send_text(r#"{"event":"metal_alarm","time":"t1","aisle":2}"#)
        .unwrap();

    let ClassifiedMessage::Event(event) = next_message(&mut h.messages).await else {
        panic!("expected the metal alarm");
    };
    assert_eq!(event.tag, "metal_alarm");
    assert_eq!(event.locality.aisle, Some(2));
    assert_eq!(h.client.state(), ConnectionState::Connected);

    let snapshot = h.client.snapshot().await.unwrap();
    assert!(!snapshot.reconnect_pending);

    h.client.finish().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn device_close_leaves_the_client_disconnected_without_retry() {
    let mut h = connected().await;

    h.session.close(1001, "going away").unwrap();
    wait_for_state(&h.client, ConnectionState::Disconnected).await;

    let snapshot = h.client.snapshot().await.unwrap();
    assert!(!snapshot.reconnect_pending);
    assert!(
        h.server
            .next_session_timeout(Duration::from_millis(200))
            .await
            .is_none()
    );
    assert_eq!(h.server.connect_attempts(), 1);

    // Messages after the close belong to a dead session.
    let _ = h.session.send_text(r#"{"response":"heartbeat"}"#);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), h.messages.recv())
            .await
            .is_err()
    );

    h.client.finish().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_errors_and_drops_end_the_session() {
    let h = connected().await;
    h.session.fail("connection reset by peer").unwrap();
    wait_for_state(&h.client, ConnectionState::Disconnected).await;
    assert!(!h.client.snapshot().await.unwrap().reconnect_pending);
    h.client.finish().await.unwrap();

    let mut h = connected().await;
    h.session.drop_socket();
    wait_for_state(&h.client, ConnectionState::Disconnected).await;
    assert!(!h.client.snapshot().await.unwrap().reconnect_pending);
    h.client.finish().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_sends_a_normal_close_frame() {
    let mut h = connected().await;

    h.client.disconnect().await.unwrap();
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    let frame = h
        .session
        .recv_outbound_timeout(Duration::from_secs(1))
        .await
        .expect("close frame");
    let WsFrame::Close(Some(close)) = frame else {
        panic!("expected a close frame, got {frame:?}");
    };
    assert_eq!(close.code, 1000);
    assert_eq!(close.reason_lossy(), "Application exit.");
    assert!(!h.client.snapshot().await.unwrap().reconnect_pending);

    // Disconnect is not terminal.
    h.client.connect().await.unwrap();
    assert!(h.client.await_connect(Duration::from_secs(1)).await);
    h.client.finish().await.unwrap();
}
