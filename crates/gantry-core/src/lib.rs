//! # Gantry Core
//!
//! Shared pieces every Gantry crate depends on: the config file model, the
//! application context (folders + node identity) and the error type.

pub mod app;
pub mod config;
pub mod error;

pub use app::AppContext;
pub use config::{GantryConfig, LogFormat, Overlap};
pub use error::{GantryError, Result};
