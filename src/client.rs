use std::time::Duration;

use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::RenosClientConfig;
use crate::core::{ConnectionSnapshot, ConnectionState, RenosResult};
use crate::protocol::SubscriptionRequest;
use crate::supervisor::{
    Connect, ConnectionSupervisor, Disconnect, Finish, GetSnapshot, Reconnect, SendHeartbeat,
    SendSubscription, SetToken, SupervisorArgs, map_send_error,
};
use crate::transport::{TungsteniteTransport, WsTransport};

/// Control-channel facade over one events connection.
///
/// Construction validates the configuration and spawns the connection supervisor, so it must
/// happen inside a tokio runtime. Nothing touches the network until [`RenosClient::connect`] or
/// [`RenosClient::start`] is called.
pub struct RenosClient<T: WsTransport = TungsteniteTransport> {
    actor: ActorRef<ConnectionSupervisor<T>>,
    state_rx: watch::Receiver<ConnectionState>,
    events_url: String,
    await_connect_timeout: Duration,
}

impl RenosClient<TungsteniteTransport> {
    pub fn new(config: RenosClientConfig) -> RenosResult<Self> {
        Self::with_transport(config, TungsteniteTransport::default())
    }
}

impl<T: WsTransport> RenosClient<T> {
    pub fn with_transport(config: RenosClientConfig, transport: T) -> RenosResult<Self> {
        let events_url = config.events_url()?;
        info!(url = %events_url, "Events socket URL {events_url}");

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let actor = ConnectionSupervisor::spawn(SupervisorArgs {
            url: events_url.clone(),
            transport,
            token: config.token,
            reconnect_delay: config.reconnect_delay,
            connect_timeout: config.connect_timeout,
            ws_buffers: config.ws_buffers,
            message_sink: config.message_sink,
            state_tx,
        });

        Ok(Self {
            actor,
            state_rx,
            events_url,
            await_connect_timeout: config.await_connect_timeout,
        })
    }

    /// The derived events socket URI.
    pub fn events_url(&self) -> &str {
        &self.events_url
    }

    /// Begin connecting without waiting for the outcome.
    pub async fn connect(&self) -> RenosResult<()> {
        self.actor.ask(Connect).await.map_err(map_send_error)
    }

    /// Connect and wait up to the configured window for the socket to become active.
    ///
    /// Returns whether the connection is up. Not connecting in time is not an error; a refused
    /// or timed-out attempt is retried in the background regardless.
    pub async fn start(&self) -> RenosResult<bool> {
        self.connect().await?;
        let connected = self.await_connect(self.await_connect_timeout).await;
        if connected {
            info!(connection = %self.events_url, "Client started.");
        } else {
            warn!(
                connection = %self.events_url,
                timeout_ms = self.await_connect_timeout.as_millis() as u64,
                state = %self.state(),
                "events socket did not become active in time"
            );
        }
        Ok(connected)
    }

    /// Wait up to `timeout` for the connection to be active. Never fails.
    pub async fn await_connect(&self, timeout: Duration) -> bool {
        let mut state_rx = self.state_rx.clone();
        matches!(
            tokio::time::timeout(timeout, state_rx.wait_for(|state| state.is_connected())).await,
            Ok(Ok(_))
        )
    }

    /// Token sent after every successful connect. An empty token disables authentication.
    pub async fn set_token(&self, token: impl Into<String>) -> RenosResult<()> {
        self.actor
            .ask(SetToken(Some(token.into())))
            .await
            .map_err(map_send_error)
    }

    pub async fn clear_token(&self) -> RenosResult<()> {
        self.actor.ask(SetToken(None)).await.map_err(map_send_error)
    }

    /// Send a heartbeat. While disconnected this logs a warning, sends nothing and returns
    /// [`crate::RenosError::SendWhileDisconnected`].
    pub async fn heartbeat(&self) -> RenosResult<()> {
        self.actor.ask(SendHeartbeat).await.map_err(map_send_error)
    }

    pub async fn send_subscription(&self, request: SubscriptionRequest) -> RenosResult<()> {
        self.actor
            .ask(SendSubscription(request))
            .await
            .map_err(map_send_error)
    }

    /// Close the current session and schedule a new attempt after the reconnect delay.
    /// Repeated calls keep a single pending attempt.
    pub async fn reconnect(&self) -> RenosResult<()> {
        self.actor.ask(Reconnect).await.map_err(map_send_error)
    }

    /// Close the socket. No reconnect is scheduled by this call, but a retry that was already
    /// pending still fires after its delay. Use [`RenosClient::finish`] to stop retries as well.
    pub async fn disconnect(&self) -> RenosResult<()> {
        self.actor.ask(Disconnect).await.map_err(map_send_error)
    }

    /// Cancel pending reconnects, close the socket and stop the supervisor.
    ///
    /// Idempotent and safe without a prior connect. The client cannot be reused afterwards.
    pub async fn finish(&self) -> RenosResult<()> {
        match self.actor.ask(Finish).await {
            Ok(()) => {}
            Err(SendError::ActorNotRunning(_) | SendError::ActorStopped) => return Ok(()),
            Err(err) => return Err(map_send_error(err)),
        }
        let _ = self.actor.stop_gracefully().await;
        self.actor.wait_for_shutdown().await;
        Ok(())
    }

    /// Alias of [`RenosClient::finish`].
    pub async fn stop(&self) -> RenosResult<()> {
        self.finish().await
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver observing every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub async fn snapshot(&self) -> RenosResult<ConnectionSnapshot> {
        self.actor.ask(GetSnapshot).await.map_err(map_send_error)
    }
}
