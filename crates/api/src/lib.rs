//! Prospect progress relay server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! WebSocket infrastructure, workflow engine) so integration tests and the
//! binary entrypoint can both access them.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
