//! # tandem-endpoint
//!
//! Endpoint runtime for the tandem bidirectional RPC protocol.
//!
//! Either side of a connection may call methods on the other. Each side runs
//! an [`Endpoint`]: it owns one connection, tracks the lifecycle state,
//! encodes outbound calls and dispatches inbound ones onto a [`Delegate`]
//! through a [`DispatchTable`].
//!
//! - **Runtime**: [`Endpoint`], [`Caller`]
//! - **Construction**: [`EndpointBuilder`], [`ConnectionContext`]
//! - **Dispatch**: [`DispatchTable`], built once per interface
//! - **Capabilities**: [`Delegate`], [`ConnectionErrorHandler`]
//! - **Transports**: [`connection`] (WebSocket client, in-memory pair, and
//!   the adapter seam for custom drivers)

#![deny(unsafe_code)]

pub mod builder;
pub mod connection;
pub mod delegate;
pub mod dispatch;
pub mod runtime;

pub use builder::{BuilderError, ConnectionContext, EndpointBuilder};
pub use connection::{ConnectionAdapter, TransportCommand, TransportEvent, TransportHandle};
pub use delegate::{ConnectionErrorHandler, Delegate};
pub use dispatch::{DispatchTable, DispatchTableBuilder, HandlerPanic};
pub use runtime::{Caller, Endpoint};
