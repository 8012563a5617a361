use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{RenosError, RenosResult, WebSocketBufferConfig, WsFrame};

pub mod tungstenite;

pub use tungstenite::TungsteniteTransport;

pub type WsTransportConnectFuture<R, W> =
    Pin<Box<dyn Future<Output = RenosResult<(R, W)>> + Send>>;

/// Transport boundary for websocket IO.
///
/// The IO loop lives outside kameo; the supervisor actor owns state and policies. Connect failures
/// must be reported as [`RenosError::Connect`] with the right
/// [`crate::core::ConnectFailureKind`], since that is what decides whether a reconnect is
/// scheduled.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = RenosResult<WsFrame>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = RenosError> + Send + Sync + Unpin + 'static;

    fn connect(
        &self,
        url: String,
        buffers: WebSocketBufferConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer>;
}
