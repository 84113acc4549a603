//! # tandem-server
//!
//! Axum host for tandem endpoints.
//!
//! - `GET /health`: liveness and connection count
//! - WebSocket upgrade at the configured path: one [`Endpoint`] per
//!   connection, with a delegate built by a [`DelegateFactory`]
//! - Connection limit, with surplus upgrades rejected as 503
//! - Graceful shutdown via `CancellationToken`
//!
//! [`Endpoint`]: tandem_endpoint::Endpoint

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{DelegateFactory, TandemServer};
pub use shutdown::ShutdownCoordinator;
