//! # Gantry Gateway
//! HTTP workload run by `gantry app start`.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, serve, serve_listener};
