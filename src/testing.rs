//! Reusable test utilities for exercising the client without a real socket.
//!
//! [`MockTransport`] hands out in-memory sessions. Each successful connect produces a
//! [`MockSession`] on the paired [`MockServer`], which tests use to read outbound frames, push
//! inbound payloads, close the socket or fail it. Connect outcomes can be scripted per attempt.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Sink;
use tokio::sync::{Mutex, mpsc};

use crate::core::{
    ConnectFailureKind, RenosError, RenosResult, WebSocketBufferConfig, WsFrame,
};
use crate::transport::{WsTransport, WsTransportConnectFuture};

/// Outcome of one scripted connect attempt. Unscripted attempts are accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectScript {
    Accept,
    /// Fails with a refused connection.
    Refuse,
    /// Fails with a timed-out connection.
    Timeout,
    /// Never resolves; the caller's own connect timeout has to fire.
    Hang,
    /// Fails with a non-transient error.
    Fail(String),
}

#[derive(Default)]
struct MockShared {
    script: VecDeque<ConnectScript>,
    last_url: Option<String>,
}

/// A transport that uses in-memory channels so tests can emulate device behavior.
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<Mutex<MockShared>>,
    attempts: Arc<AtomicUsize>,
    sessions_tx: mpsc::UnboundedSender<MockSession>,
}

impl MockTransport {
    /// Build a transport + server control pair.
    pub fn channel_pair() -> (Self, MockServer) {
        let shared = Arc::new(Mutex::new(MockShared::default()));
        let attempts = Arc::new(AtomicUsize::new(0));
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::clone(&shared),
                attempts: Arc::clone(&attempts),
                sessions_tx,
            },
            MockServer {
                shared,
                attempts,
                sessions_rx,
            },
        )
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(
        &self,
        url: String,
        _buffers: WebSocketBufferConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer> {
        let shared = Arc::clone(&self.shared);
        let attempts = Arc::clone(&self.attempts);
        let sessions_tx = self.sessions_tx.clone();
        Box::pin(async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            let step = {
                let mut shared = shared.lock().await;
                shared.last_url = Some(url);
                shared.script.pop_front().unwrap_or(ConnectScript::Accept)
            };

            match step {
                ConnectScript::Accept => {}
                ConnectScript::Refuse => {
                    return Err(RenosError::Connect {
                        kind: ConnectFailureKind::Refused,
                        message: "connection refused".to_string(),
                    });
                }
                ConnectScript::Timeout => {
                    return Err(RenosError::Connect {
                        kind: ConnectFailureKind::Timeout,
                        message: "connection timed out".to_string(),
                    });
                }
                ConnectScript::Hang => std::future::pending::<()>().await,
                ConnectScript::Fail(message) => {
                    return Err(RenosError::Connect {
                        kind: ConnectFailureKind::Other,
                        message,
                    });
                }
            }

            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            sessions_tx
                .send(MockSession {
                    outbound_rx: sent_rx,
                    inbound_tx: Some(inbound_tx),
                })
                .map_err(|_| RenosError::Connect {
                    kind: ConnectFailureKind::Other,
                    message: "mock server dropped".to_string(),
                })?;
            Ok((MockReader { rx: inbound_rx }, MockWriter { sent_tx }))
        })
    }
}

/// Error surface for operations on [`MockSession`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The inbound socket side was intentionally dropped.
    SocketDropped,
    /// The client side is no longer receiving inbound frames.
    ChannelClosed,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock client channel is closed"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Device-side test handle paired with [`MockTransport`].
pub struct MockServer {
    shared: Arc<Mutex<MockShared>>,
    attempts: Arc<AtomicUsize>,
    sessions_rx: mpsc::UnboundedReceiver<MockSession>,
}

impl MockServer {
    /// Queue the outcome of a future connect attempt.
    pub async fn script(&self, step: ConnectScript) {
        self.shared.lock().await.script.push_back(step);
    }

    /// Number of connect attempts the transport has seen, successful or not.
    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// URL passed to the most recent connect attempt.
    pub async fn last_url(&self) -> Option<String> {
        self.shared.lock().await.last_url.clone()
    }

    /// Wait for the next accepted connection.
    pub async fn next_session(&mut self) -> Option<MockSession> {
        self.sessions_rx.recv().await
    }

    pub async fn next_session_timeout(&mut self, timeout: Duration) -> Option<MockSession> {
        tokio::time::timeout(timeout, self.sessions_rx.recv())
            .await
            .unwrap_or_default()
    }
}

/// Device side of one accepted connection.
pub struct MockSession {
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<RenosResult<WsFrame>>>,
}

impl MockSession {
    /// Receive a frame written by the client.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    pub async fn recv_outbound_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        tokio::time::timeout(timeout, self.outbound_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Next outbound text payload, skipping control frames.
    pub async fn recv_text_timeout(&mut self, timeout: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.outbound_rx.recv())
                .await
                .ok()??;
            if let Some(text) = frame.as_text() {
                return Some(text.to_string());
            }
        }
    }

    /// Frames the client wrote that have not been read yet.
    pub fn drain_outbound(&mut self) -> Vec<WsFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound_rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Push an inbound frame to the client.
    pub fn send_inbound(&self, frame: WsFrame) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(Ok(frame)).map_err(|_| MockServerError::ChannelClosed)
    }

    /// Push a UTF-8 payload as websocket text.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::text(text))
    }

    /// Send a close frame, as a device does when it ends the session.
    pub fn close(&self, code: u16, reason: &str) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::close(code, reason))
    }

    /// Surface a read error on the client side.
    pub fn fail(&self, error: impl Into<String>) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(Err(RenosError::Transport {
            context: "mock_transport_read",
            error: error.into(),
        }))
        .map_err(|_| MockServerError::ChannelClosed)
    }

    /// Simulate a socket drop by closing the inbound channel.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<RenosResult<WsFrame>>,
}

impl futures_util::Stream for MockReader {
    type Item = RenosResult<WsFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_recv(cx)
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    sent_tx: mpsc::UnboundedSender<WsFrame>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = RenosError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .sent_tx
            .send(item)
            .map_err(|_| RenosError::Transport {
                context: "mock_transport_write",
                error: "mock outbound channel closed".to_string(),
            })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
