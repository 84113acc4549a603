//! # tandem-core
//!
//! Shared vocabulary for the tandem bidirectional RPC protocol.
//!
//! - **Envelope**: [`Envelope`], the wire-level record of one method call
//! - **Arguments**: [`Arguments`], a typed view over an envelope's argument list
//! - **State**: [`EndpointState`], the `Connecting → Open → Closed` lifecycle
//! - **Errors**: one `thiserror` type per error sink (transport, call, send, codec)
//! - **Constants**: the frame sentinel and the fixed stream header markers

#![deny(unsafe_code)]

pub mod arguments;
pub mod constants;
pub mod envelope;
pub mod errors;
pub mod state;

pub use arguments::Arguments;
pub use envelope::Envelope;
pub use errors::{
    ArgumentError, BoxError, CallError, RegistrationError, SendError, SerializationError,
    TransportError,
};
pub use state::EndpointState;
