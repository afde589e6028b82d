//! WebSocket infrastructure for real-time progress delivery.
//!
//! Provides the connection registry, session fan-out, liveness supervision,
//! inbound message dispatch, and the HTTP upgrade handler used by Axum routes.

pub mod broadcast;
pub mod dispatch;
mod handler;
pub mod heartbeat;
pub mod registry;

pub use broadcast::BroadcastRouter;
pub use handler::ws_handler;
pub use heartbeat::{start_heartbeat, sweep_inactive};
pub use registry::{ConnectionRegistry, WsSender};
