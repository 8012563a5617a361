pub mod frame;
pub mod reconnect;
pub mod types;

pub use frame::*;
pub use reconnect::*;
pub use types::*;
