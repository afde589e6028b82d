//! Domain layer for the prospect progress relay.
//!
//! Holds the workflow status model and its transition rules, the WebSocket
//! wire protocol, and the persistence seam used by the engine. Nothing in
//! this crate performs network or database I/O.

pub mod error;
pub mod plan;
pub mod protocol;
pub mod store;
pub mod types;
pub mod workflow;
