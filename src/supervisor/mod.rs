//! Connection supervision: the lifecycle actor and the per-session writer actor.

pub mod actor;
pub mod writer;

pub use actor::{
    Connect, ConnectionSupervisor, Disconnect, Finish, GetSnapshot, Reconnect, SendHeartbeat,
    SendSubscription, SetToken, SupervisorArgs,
};
pub(crate) use actor::map_send_error;
pub use writer::{FrameWriter, WriteFrame};
