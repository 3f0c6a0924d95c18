//! The real-time side of the service: admission, live membership and
//! message fan-out for `/session/{session_id}` WebSocket connections.

pub mod handle;
pub mod handshake;
pub mod registry;
pub mod relay;
pub mod server;
