//! Inbound message routing and the ride state machine.

pub mod handlers;
pub mod protocol;

pub use handlers::Dispatcher;
pub use protocol::{InboundMessage, OutboundMessage, ProtocolError};
