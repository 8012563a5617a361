//! Kameo-based client for a device events WebSocket channel.
//!
//! One [`RenosClient`] keeps a single long-lived connection: it authenticates every new session,
//! reconnects after refused or timed-out attempts on a fixed delay, and classifies every inbound
//! payload into typed responses and events.

pub mod client;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod protocol;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use client::RenosClient;
pub use config::{ConfigError, EVENTS_PATH, RenosClientConfig, events_url};
pub use core::{
    ConnectFailureKind, ConnectionSnapshot, ConnectionState, RenosError, RenosResult,
    WebSocketBufferConfig, WsFrame,
};
pub use protocol::{
    ClassifiedMessage, ControlMessage, Direction, EventKind, EventMessage, EventType,
    ResponseKind, ResponseMessage, SubscriptionRequest, TagRecord,
};
pub use transport::{TungsteniteTransport, WsTransport};
