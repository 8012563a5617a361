use std::time::Duration;

use renos_ws::testing::{ConnectScript, MockServer, MockSession, MockTransport};
use renos_ws::{
    ConnectionState, EventType, RenosClient, RenosClientConfig, RenosError, SubscriptionRequest,
    WsFrame,
};

const BASE_URL: &str = "http://device.local:8081";

fn client_with(config: RenosClientConfig) -> (RenosClient<MockTransport>, MockServer) {
    let (transport, server) = MockTransport::channel_pair();
    let client = RenosClient::with_transport(config, transport).expect("valid config");
    (client, server)
}

async fn connected_session(
    client: &RenosClient<MockTransport>,
    server: &mut MockServer,
) -> MockSession {
    assert!(client.start().await.expect("start"), "client should connect");
    server
        .next_session_timeout(Duration::from_secs(1))
        .await
        .expect("transport saw a connection")
}

async fn next_text(session: &mut MockSession) -> String {
    session
        .recv_text_timeout(Duration::from_secs(1))
        .await
        .expect("expected an outbound text frame")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn token_is_the_first_frame_on_the_derived_events_url() {
    let (client, mut server) = client_with(RenosClientConfig::new(BASE_URL).with_token("abc"));
    assert_eq!(client.events_url(), "ws://device.local:8081/api/v2/events");

    let mut session = connected_session(&client, &mut server).await;
    assert_eq!(
        server.last_url().await.as_deref(),
        Some("ws://device.local:8081/api/v2/events")
    );

    client.heartbeat().await.unwrap();
    client
        .send_subscription(SubscriptionRequest::new([EventType::RfidMove]).unwrap())
        .await
        .unwrap();

    assert_eq!(
        next_text(&mut session).await,
        r#"{"request":"authenticate","token":"abc"}"#
    );
    assert_eq!(next_text(&mut session).await, r#"{"request":"heartbeat"}"#);
    assert_eq!(
        next_text(&mut session).await,
        r#"{"request":"subscribe","events":["rfid_move"]}"#
    );
    assert!(session.drain_outbound().is_empty());

    client.finish().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn absent_or_empty_token_sends_no_authenticate_frame() {
    for config in [
        RenosClientConfig::new(BASE_URL),
        RenosClientConfig::new(BASE_URL).with_token(""),
    ] {
        let (client, mut server) = client_with(config);
        let mut session = connected_session(&client, &mut server).await;

        client.heartbeat().await.unwrap();
        assert_eq!(next_text(&mut session).await, r#"{"request":"heartbeat"}"#);
        assert!(session.drain_outbound().is_empty());

        client.finish().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn every_reconnect_authenticates_again_with_the_current_token() {
    let (client, mut server) = client_with(RenosClientConfig::new(BASE_URL).with_token("abc"));
    let mut first = connected_session(&client, &mut server).await;
    assert_eq!(
        next_text(&mut first).await,
        r#"{"request":"authenticate","token":"abc"}"#
    );

    client.set_token("def").await.unwrap();
    client.reconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::ReconnectScheduled);
    assert_eq!(
        first.recv_outbound_timeout(Duration::from_secs(1)).await,
        Some(WsFrame::normal_close())
    );

    let mut second = server
        .next_session_timeout(Duration::from_secs(6))
        .await
        .expect("reconnect after the fixed delay");
    assert_eq!(
        next_text(&mut second).await,
        r#"{"request":"authenticate","token":"def"}"#
    );
    assert!(client.await_connect(Duration::from_secs(1)).await);

    client.finish().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sends_while_disconnected_are_warned_no_ops() {
    let (client, server) = client_with(RenosClientConfig::new(BASE_URL).with_token("abc"));

    assert!(matches!(
        client.heartbeat().await,
        Err(RenosError::SendWhileDisconnected("heartbeat"))
    ));
    assert!(matches!(
        client.send_subscription(SubscriptionRequest::all()).await,
        Err(RenosError::SendWhileDisconnected("subscribe"))
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(server.connect_attempts(), 0);

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.frames_sent, 0);
    assert!(snapshot.token_set);

    client.finish().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trailing_separator_fails_before_any_connect() {
    let (transport, server) = MockTransport::channel_pair();
    let result =
        RenosClient::with_transport(RenosClientConfig::new("http://device.local:8081/"), transport);
    assert!(matches!(result, Err(RenosError::Config(_))));
    assert_eq!(server.connect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn state_watch_allows_resubscribing_after_a_background_retry() {
    let (client, mut server) = client_with(RenosClientConfig::new(BASE_URL).with_token("abc"));
    server.script(ConnectScript::Refuse).await;
    let mut states = client.state_changes();

    client.connect().await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(10),
        states.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("retry connects")
    .expect("supervisor alive");
    client
        .send_subscription(SubscriptionRequest::all())
        .await
        .unwrap();

    let mut session = server
        .next_session_timeout(Duration::from_secs(1))
        .await
        .expect("retried session");
    assert_eq!(
        next_text(&mut session).await,
        r#"{"request":"authenticate","token":"abc"}"#
    );
    let subscribe = next_text(&mut session).await;
    assert!(subscribe.starts_with(r#"{"request":"subscribe","events":["#));

    client.finish().await.unwrap();
}
