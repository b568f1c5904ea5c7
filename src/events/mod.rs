//! Event channel: daemon-pushed notifications on the event socket.

pub mod channel;
pub mod dispatch;

pub use channel::{EventChannel, EventChannelConfig, EventChannelHandle};
pub use dispatch::{DispatchTable, EventHandler};
