//! HTTP server for the recipe sharing backend's authentication endpoints.
//!
//! - [`api`]: Router, handlers and middleware
//! - [`config`]: Environment-driven server configuration
//! - [`logging`]: Structured logging setup and event helpers

pub mod api;
pub mod config;
pub mod logging;
