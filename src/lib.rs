//! Web console for a goose-powered load-test rig: a login-gated control
//! panel that forwards start/stop/status actions to the engine's controller
//! socket. The load generation itself lives entirely in goose; this crate
//! is the glue in front of it.

pub mod auth;
pub mod config;
pub mod engine;
pub mod http;
pub mod log;
mod prelude;
