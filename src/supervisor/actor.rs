use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use kameo::actor::WeakActorRef;
use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::writer::{FrameWriter, WriteFrame};
use crate::core::{
    ConnectFailureKind, ConnectionSnapshot, ConnectionState, ReconnectScheduler, RenosError,
    RenosResult, WebSocketBufferConfig, WsCloseFrame, WsFrame,
};
use crate::dispatch::Dispatcher;
use crate::protocol::{ClassifiedMessage, ControlMessage, SubscriptionRequest, encode};
use crate::transport::WsTransport;

/// Map a kameo send failure onto the client error surface.
pub(crate) fn map_send_error<M>(err: SendError<M, RenosError>) -> RenosError {
    match err {
        SendError::HandlerError(err) => err,
        SendError::ActorNotRunning(_) | SendError::ActorStopped => RenosError::Finished,
        SendError::MailboxFull(_) => RenosError::Actor("mailbox full".to_string()),
        _ => RenosError::Actor("request timed out".to_string()),
    }
}

pub struct SupervisorArgs<T: WsTransport> {
    pub url: String,
    pub transport: T,
    pub token: Option<String>,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub ws_buffers: WebSocketBufferConfig,
    pub message_sink: Option<mpsc::UnboundedSender<ClassifiedMessage>>,
    pub state_tx: watch::Sender<ConnectionState>,
}

struct PendingAttempt {
    attempt: u64,
    handle: JoinHandle<()>,
}

struct Session<T: WsTransport> {
    id: u64,
    writer: ActorRef<FrameWriter<T::Writer>>,
    reader_task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owner of the events connection.
///
/// Every lifecycle notification (connect result, session end, reconnect timer) and every facade
/// call goes through this actor's mailbox, so state transitions are strictly serialized. The
/// socket reader runs in its own task and only reports back when its session ends.
pub struct ConnectionSupervisor<T: WsTransport> {
    url: Arc<str>,
    transport: T,
    token: Option<String>,
    connect_timeout: Duration,
    ws_buffers: WebSocketBufferConfig,
    message_sink: Option<mpsc::UnboundedSender<ClassifiedMessage>>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    scheduler: ReconnectScheduler,
    actor_ref: WeakActorRef<Self>,
    attempt_seq: u64,
    pending_attempt: Option<PendingAttempt>,
    session_seq: u64,
    session: Option<Session<T>>,
    reconnect_attempts: u64,
    connect_attempts: u64,
    frames_sent: u64,
    finished: bool,
}

impl<T: WsTransport> Actor for ConnectionSupervisor<T> {
    type Args = SupervisorArgs<T>;
    type Error = RenosError;

    fn name() -> &'static str {
        "ConnectionSupervisor"
    }

    async fn on_start(args: Self::Args, ctx: ActorRef<Self>) -> RenosResult<Self> {
        let SupervisorArgs {
            url,
            transport,
            token,
            reconnect_delay,
            connect_timeout,
            ws_buffers,
            message_sink,
            state_tx,
        } = args;

        state_tx.send_replace(ConnectionState::Disconnected);
        Ok(Self {
            url: Arc::from(url),
            transport,
            token,
            connect_timeout,
            ws_buffers,
            message_sink,
            state: ConnectionState::Disconnected,
            state_tx,
            scheduler: ReconnectScheduler::new(reconnect_delay),
            actor_ref: ctx.downgrade(),
            attempt_seq: 0,
            pending_attempt: None,
            session_seq: 0,
            session: None,
            reconnect_attempts: 0,
            connect_attempts: 0,
            frames_sent: 0,
            finished: false,
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: kameo::error::ActorStopReason,
    ) -> RenosResult<()> {
        self.scheduler.release();
        self.abandon_attempt();
        self.teardown_session(Some(WsFrame::normal_close())).await;
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "ConnectionSupervisor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

/// Open the connection unless one is already open or being opened.
#[derive(Debug)]
pub struct Connect;

/// Close the current session (if any) and schedule a fresh attempt after the reconnect delay.
#[derive(Debug)]
pub struct Reconnect;

/// Close the current session with a normal close frame. No reconnect is scheduled.
#[derive(Debug)]
pub struct Disconnect;

/// Replace the authentication token used on the next successful connect.
#[derive(Debug)]
pub struct SetToken(pub Option<String>);

#[derive(Debug)]
pub struct SendHeartbeat;

#[derive(Debug)]
pub struct SendSubscription(pub SubscriptionRequest);

#[derive(Debug)]
pub struct GetSnapshot;

/// Terminal shutdown: cancel pending work, close the socket and release the scheduler.
#[derive(Debug)]
pub struct Finish;

pub(crate) struct ConnectionEstablished<T: WsTransport> {
    attempt: u64,
    reader: T::Reader,
    writer: T::Writer,
}

pub(crate) struct ConnectionFailed {
    attempt: u64,
    error: RenosError,
}

#[derive(Debug)]
enum SessionEnd {
    Closed(Option<WsCloseFrame>),
    Failed(String),
}

pub(crate) struct SessionEnded {
    session: u64,
    end: SessionEnd,
}

pub(crate) struct ReconnectDue {
    generation: u64,
}

impl<T: WsTransport> KameoMessage<Connect> for ConnectionSupervisor<T> {
    type Reply = RenosResult<()>;

    async fn handle(&mut self, _msg: Connect, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.ensure_live()?;
        self.begin_connect("start");
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<Reconnect> for ConnectionSupervisor<T> {
    type Reply = RenosResult<()>;

    async fn handle(
        &mut self,
        _msg: Reconnect,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_live()?;
        self.teardown_session(Some(WsFrame::normal_close())).await;
        self.abandon_attempt();
        self.schedule_reconnect("requested");
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<Disconnect> for ConnectionSupervisor<T> {
    type Reply = RenosResult<()>;

    async fn handle(
        &mut self,
        _msg: Disconnect,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_live()?;
        info!(connection = %self.url, "Closing the connection");
        self.abandon_attempt();
        self.teardown_session(Some(WsFrame::normal_close())).await;
        if self.state != ConnectionState::ReconnectScheduled {
            self.set_state(ConnectionState::Disconnected);
        }
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<SetToken> for ConnectionSupervisor<T> {
    type Reply = RenosResult<()>;

    async fn handle(&mut self, msg: SetToken, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.ensure_live()?;
        self.token = msg.0;
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<SendHeartbeat> for ConnectionSupervisor<T> {
    type Reply = RenosResult<()>;

    async fn handle(
        &mut self,
        _msg: SendHeartbeat,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_live()?;
        self.send_control(ControlMessage::Heartbeat).await
    }
}

impl<T: WsTransport> KameoMessage<SendSubscription> for ConnectionSupervisor<T> {
    type Reply = RenosResult<()>;

    async fn handle(
        &mut self,
        msg: SendSubscription,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_live()?;
        self.send_control(ControlMessage::Subscribe(msg.0)).await
    }
}

impl<T: WsTransport> KameoMessage<GetSnapshot> for ConnectionSupervisor<T> {
    type Reply = RenosResult<ConnectionSnapshot>;

    async fn handle(
        &mut self,
        _msg: GetSnapshot,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(ConnectionSnapshot {
            state: self.state,
            reconnect_pending: self.scheduler.is_pending(),
            reconnect_attempts: self.reconnect_attempts,
            connect_attempts: self.connect_attempts,
            frames_sent: self.frames_sent,
            token_set: self.token.as_deref().is_some_and(|t| !t.is_empty()),
        })
    }
}

impl<T: WsTransport> KameoMessage<Finish> for ConnectionSupervisor<T> {
    type Reply = RenosResult<()>;

    async fn handle(&mut self, _msg: Finish, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.scheduler.release();
        self.abandon_attempt();
        self.teardown_session(Some(WsFrame::normal_close())).await;
        self.set_state(ConnectionState::Disconnected);
        info!(connection = %self.url, "client finished");
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<ConnectionEstablished<T>> for ConnectionSupervisor<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConnectionEstablished<T>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.finished || msg.attempt != self.attempt_seq {
            debug!(
                connection = %self.url,
                attempt = msg.attempt,
                "discarding connection from an abandoned attempt"
            );
            return;
        }
        self.pending_attempt = None;
        self.on_connection_established(msg.reader, msg.writer).await;
    }
}

impl<T: WsTransport> KameoMessage<ConnectionFailed> for ConnectionSupervisor<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConnectionFailed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.finished || msg.attempt != self.attempt_seq {
            debug!(connection = %self.url, attempt = msg.attempt, "ignoring stale connect failure");
            return;
        }
        self.pending_attempt = None;
        self.set_state(ConnectionState::Disconnected);

        let kind = msg.error.connect_failure_kind();
        if kind.is_transient() {
            warn!(
                connection = %self.url,
                attempt = msg.attempt,
                cause = %kind,
                error = %msg.error,
                "Could not connect to Renos WebSocket."
            );
            self.schedule_reconnect("connect_failed");
        } else {
            error!(
                connection = %self.url,
                attempt = msg.attempt,
                error = %msg.error,
                "connection attempt failed, not retrying"
            );
        }
    }
}

impl<T: WsTransport> KameoMessage<SessionEnded> for ConnectionSupervisor<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: SessionEnded,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.session.as_ref().map(|s| s.id) != Some(msg.session) {
            debug!(connection = %self.url, session = msg.session, "ignoring end of a stale session");
            return;
        }

        match &msg.end {
            SessionEnd::Closed(Some(frame)) => info!(
                connection = %self.url,
                code = frame.code,
                reason = %frame.reason_lossy(),
                "Connection closed on {}: {} - {}",
                self.url,
                frame.code,
                frame.reason_lossy()
            ),
            SessionEnd::Closed(None) => {
                info!(connection = %self.url, "connection closed without a close frame")
            }
            SessionEnd::Failed(err) => error!(
                connection = %self.url,
                error = %err,
                "An error occurred while communicating via WebSocket"
            ),
        }

        self.teardown_session(None).await;
        self.set_state(ConnectionState::Disconnected);
    }
}

impl<T: WsTransport> KameoMessage<ReconnectDue> for ConnectionSupervisor<T> {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ReconnectDue,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.finished || !self.scheduler.claim(msg.generation) {
            debug!(connection = %self.url, generation = msg.generation, "ignoring cancelled reconnect timer");
            return;
        }
        self.begin_connect("reconnect");
    }
}

impl<T: WsTransport> ConnectionSupervisor<T> {
    fn ensure_live(&self) -> RenosResult<()> {
        if self.finished {
            return Err(RenosError::Finished);
        }
        Ok(())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(connection = %self.url, from = %self.state, to = %state, "connection state changed");
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn begin_connect(&mut self, trigger: &'static str) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(connection = %self.url, state = %self.state, trigger, "connect skipped");
            return;
        }
        self.scheduler.cancel();

        self.attempt_seq = self.attempt_seq.wrapping_add(1);
        self.connect_attempts += 1;
        let attempt = self.attempt_seq;
        self.set_state(ConnectionState::Connecting);
        info!(connection = %self.url, attempt, trigger, "Connecting to {}", self.url);

        let actor = self.actor_ref.clone();
        let transport = self.transport.clone();
        let url = self.url.to_string();
        let buffers = self.ws_buffers;
        let timeout = self.connect_timeout;
        let handle = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.connect(url, buffers)).await {
                Ok(result) => result,
                Err(_) => Err(RenosError::Connect {
                    kind: ConnectFailureKind::Timeout,
                    message: format!("no handshake within {}ms", timeout.as_millis()),
                }),
            };
            let Some(actor) = actor.upgrade() else {
                return;
            };
            match result {
                Ok((reader, writer)) => {
                    let _ = actor
                        .tell(ConnectionEstablished::<T> {
                            attempt,
                            reader,
                            writer,
                        })
                        .send()
                        .await;
                }
                Err(error) => {
                    let _ = actor.tell(ConnectionFailed { attempt, error }).send().await;
                }
            }
        });
        self.pending_attempt = Some(PendingAttempt { attempt, handle });
    }

    /// Drop an in-flight connect attempt. Its result, if it still arrives, is ignored.
    fn abandon_attempt(&mut self) {
        if let Some(pending) = self.pending_attempt.take() {
            pending.handle.abort();
            debug!(connection = %self.url, attempt = pending.attempt, "connect attempt abandoned");
        }
        self.attempt_seq = self.attempt_seq.wrapping_add(1);
        if self.state == ConnectionState::Connecting {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn schedule_reconnect(&mut self, trigger: &'static str) {
        let actor = self.actor_ref.clone();
        let scheduled = self.scheduler.schedule(move |generation| async move {
            if let Some(actor) = actor.upgrade() {
                let _ = actor.tell(ReconnectDue { generation }).send().await;
            }
        });
        if scheduled.is_none() {
            debug!(connection = %self.url, trigger, "reconnect scheduler released, not scheduling");
            return;
        }

        self.reconnect_attempts += 1;
        self.set_state(ConnectionState::ReconnectScheduled);
        let delay = self.scheduler.delay();
        info!(
            connection = %self.url,
            trigger,
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Trying to reconnect to Renos WebSocket, wait {}s",
            delay.as_secs()
        );
    }

    async fn on_connection_established(&mut self, reader: T::Reader, writer: T::Writer) {
        self.scheduler.cancel();
        self.reconnect_attempts = 0;
        self.session_seq = self.session_seq.wrapping_add(1);
        let session_id = self.session_seq;

        let writer = FrameWriter::spawn(FrameWriter::new(writer, Arc::clone(&self.url)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reader_task = self.spawn_reader(session_id, reader, shutdown_rx);
        self.session = Some(Session {
            id: session_id,
            writer,
            reader_task,
            shutdown_tx,
        });
        self.set_state(ConnectionState::Connected);

        let host = Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default();
        info!(connection = %self.url, session = session_id, "Connected: {host}");

        self.authenticate_if_needed().await;
    }

    fn spawn_reader(
        &self,
        session: u64,
        mut reader: T::Reader,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let actor = self.actor_ref.clone();
        let connection = Arc::clone(&self.url);
        let mut dispatcher = Dispatcher::new(Arc::clone(&self.url), self.message_sink.clone());

        tokio::spawn(async move {
            let end = loop {
                tokio::select! {
                    res = shutdown_rx.changed() => {
                        if res.is_err() || *shutdown_rx.borrow_and_update() {
                            return;
                        }
                    }
                    frame = reader.next() => match frame {
                        Some(Ok(WsFrame::Close(close))) => break SessionEnd::Closed(close),
                        Some(Ok(frame)) => match frame.as_text() {
                            Some(text) => {
                                dispatcher.dispatch(text);
                            }
                            None => debug!(
                                connection = %connection,
                                kind = frame.kind(),
                                "ignoring non-text frame"
                            ),
                        },
                        Some(Err(err)) => break SessionEnd::Failed(err.to_string()),
                        None => break SessionEnd::Closed(None),
                    },
                }
            };

            if let Some(actor) = actor.upgrade() {
                let _ = actor.tell(SessionEnded { session, end }).send().await;
            }
        })
    }

    async fn authenticate_if_needed(&mut self) {
        let Some(token) = self.token.clone().filter(|t| !t.is_empty()) else {
            return;
        };
        info!(connection = %self.url, "Sending authentication token");
        if let Err(err) = self.send_control(ControlMessage::Authenticate { token }).await {
            warn!(connection = %self.url, error = %err, "authentication was not sent");
        }
    }

    async fn send_control(&mut self, message: ControlMessage) -> RenosResult<()> {
        let Some(session) = self.session.as_ref() else {
            warn!(
                connection = %self.url,
                request = message.name(),
                "Client is not connected. No message will be sent."
            );
            return Err(RenosError::SendWhileDisconnected(message.name()));
        };

        let text = encode(&message)?;
        match session.writer.ask(WriteFrame { frame: WsFrame::text(text) }).await {
            Ok(()) => {
                self.frames_sent += 1;
                debug!(connection = %self.url, request = message.name(), "request sent");
                Ok(())
            }
            Err(err) => {
                let err = map_send_error(err);
                error!(
                    connection = %self.url,
                    request = message.name(),
                    error = %err,
                    "There was an error sending the request"
                );
                Err(err)
            }
        }
    }

    /// Close and forget the current session, sending `close_frame` first when given.
    async fn teardown_session(&mut self, close_frame: Option<WsFrame>) {
        let Some(session) = self.session.take() else {
            return;
        };

        let _ = session.shutdown_tx.send(true);
        session.reader_task.abort();

        if let Some(frame) = close_frame {
            match session.writer.ask(WriteFrame { frame }).await {
                Ok(()) => self.frames_sent += 1,
                Err(err) => debug!(
                    connection = %self.url,
                    error = %map_send_error(err),
                    "close frame not delivered"
                ),
            }
        }
        let _ = session.writer.stop_gracefully().await;
        session.writer.wait_for_shutdown().await;
        debug!(connection = %self.url, session = session.id, "session torn down");
    }
}
