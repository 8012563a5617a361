use std::sync::Arc;

use futures_util::{Sink, SinkExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tracing::debug;

use crate::core::{RenosError, RenosResult, WsFrame};

/// Writer actor that owns the transport sink of one session and serializes writes.
pub struct FrameWriter<W>
where
    W: Sink<WsFrame, Error = RenosError> + Send + Sync + Unpin + 'static,
{
    writer: W,
    connection: Arc<str>,
}

impl<W> FrameWriter<W>
where
    W: Sink<WsFrame, Error = RenosError> + Send + Sync + Unpin + 'static,
{
    pub fn new(writer: W, connection: Arc<str>) -> Self {
        Self { writer, connection }
    }
}

impl<W> Actor for FrameWriter<W>
where
    W: Sink<WsFrame, Error = RenosError> + Send + Sync + Unpin + 'static,
{
    type Args = Self;
    type Error = RenosError;

    fn name() -> &'static str {
        "FrameWriter"
    }

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    async fn on_stop(
        &mut self,
        _ctx: kameo::actor::WeakActorRef<Self>,
        _reason: kameo::error::ActorStopReason,
    ) -> Result<(), Self::Error> {
        if let Err(err) = self.writer.close().await {
            debug!(connection = %self.connection, error = %err, "writer close failed");
        }
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "FrameWriter panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

#[derive(Clone, Debug)]
pub struct WriteFrame {
    pub frame: WsFrame,
}

impl<W> KameoMessage<WriteFrame> for FrameWriter<W>
where
    W: Sink<WsFrame, Error = RenosError> + Send + Sync + Unpin + 'static,
{
    type Reply = RenosResult<()>;

    async fn handle(
        &mut self,
        msg: WriteFrame,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        debug!(
            target: "renos-ws-writer",
            connection = %self.connection,
            kind = msg.frame.kind(),
            "sending websocket frame to wire"
        );
        self.writer.send(msg.frame).await
    }
}
