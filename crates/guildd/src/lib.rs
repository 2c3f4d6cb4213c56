//! guildd - guild site backend daemon
//!
//! Configuration loading and application wiring, shared by the binary and
//! the end-to-end tests.

pub mod app;
pub mod config;

pub use app::{build_router, open_store};
pub use config::Config;
