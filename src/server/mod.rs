//! Transport layer: WebSocket listener and shutdown plumbing

mod shutdown;
mod websocket;

pub use shutdown::{spawn_signal_listener, ShutdownSignal};
pub use websocket::OcppServer;
