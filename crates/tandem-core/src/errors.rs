//! Error taxonomy for the tandem protocol.
//!
//! Errors are split by the sink they are reported to, not unified:
//!
//! - [`TransportError`]: connection-scoped. Goes to the connection error
//!   handler (or a `warn!` diagnostic). Includes malformed inbound frames.
//! - [`CallError`]: call-scoped. Goes to the delegate's `on_error`.
//! - [`SendError`]: returned to the caller of `send_message`.
//! - [`SerializationError`]: codec failures, wrapped by the three above.
//! - [`ArgumentError`]: argument decoding inside a dispatch trampoline.
//! - [`RegistrationError`]: building a dispatch table.

use thiserror::Error;

use crate::state::EndpointState;

/// Boxed error returned by dispatch handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ─────────────────────────────────────────────────────────────────────────────
// SerializationError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure to encode or decode a serialization stream.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SerializationError {
    /// Frame did not begin with the `//OK` sentinel.
    #[error("frame does not start with the //OK sentinel")]
    MissingSentinel,

    /// An object in the argument graph names a type the registry does not know.
    #[error("object type '{type_name}' is not registered with the serializer")]
    UnregisteredType {
        /// The offending `$type` tag.
        type_name: String,
    },

    /// The next token had the wrong shape.
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        /// What the reader wanted.
        expected: &'static str,
        /// Short rendering of what it got.
        found: String,
    },

    /// The stream ended early.
    #[error("stream ended while reading {expected}")]
    EndOfStream {
        /// What the reader wanted.
        expected: &'static str,
    },

    /// Tokens remained after the envelope.
    #[error("{count} unread token(s) after the envelope")]
    TrailingTokens {
        /// Number of unread tokens.
        count: usize,
    },

    /// One of the fixed header tokens did not match.
    #[error("unexpected stream header: {0}")]
    HeaderMismatch(String),

    /// Envelope method names must be non-empty.
    #[error("envelope method name is empty")]
    EmptyMethodName,

    /// Encoded frame exceeds the configured limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Underlying JSON failure.
    #[error("json: {0}")]
    Json(String),
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TransportError
// ─────────────────────────────────────────────────────────────────────────────

/// Connection-scoped failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connect or handshake failed.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying cause.
        reason: String,
    },

    /// A low-level socket failure after connect.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// An inbound frame could not be decoded. That frame is dropped.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] SerializationError),

    /// The adapter's channel to the transport task is gone.
    #[error("connection channel closed")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────────────────
// CallError
// ─────────────────────────────────────────────────────────────────────────────

/// Call-scoped failure, reported to the delegate's `on_error`.
#[derive(Debug, Error)]
pub enum CallError {
    /// The decoded envelope names a method absent from the dispatch table.
    #[error("unknown method '{method}'")]
    UnknownMethod {
        /// Requested method name.
        method: String,
    },

    /// The local handler failed, panicked, or rejected its arguments.
    #[error("dispatch of '{method}' failed: {source}")]
    DispatchFailure {
        /// Method being dispatched.
        method: String,
        /// Handler error.
        #[source]
        source: BoxError,
    },

    /// Outbound encoding of a call failed.
    #[error("failed to encode call to '{method}': {source}")]
    EncodeFailure {
        /// Method being sent.
        method: String,
        /// Codec error.
        #[source]
        source: SerializationError,
    },
}

impl CallError {
    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownMethod { .. } => "unknown_method",
            Self::DispatchFailure { .. } => "dispatch_failure",
            Self::EncodeFailure { .. } => "encode_failure",
        }
    }

    /// The method the failed call named.
    pub fn method(&self) -> &str {
        match self {
            Self::UnknownMethod { method }
            | Self::DispatchFailure { method, .. }
            | Self::EncodeFailure { method, .. } => method,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SendError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure returned to the caller of `send_message`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SendError {
    /// The runtime is Connecting or Closed. Nothing was handed to the transport.
    #[error("endpoint is not connected (state: {state})")]
    NotConnected {
        /// State observed at send time.
        state: EndpointState,
    },

    /// The envelope could not be encoded.
    #[error("failed to encode call: {0}")]
    Encode(#[from] SerializationError),

    /// The transport refused the frame.
    #[error("transport rejected frame: {0}")]
    Transport(#[from] TransportError),
}

// ─────────────────────────────────────────────────────────────────────────────
// ArgumentError
// ─────────────────────────────────────────────────────────────────────────────

/// Argument decoding failure inside a dispatch trampoline.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// Wrong number of arguments for the declared signature.
    #[error("expected {expected} argument(s), found {found}")]
    Arity {
        /// Declared arity.
        expected: usize,
        /// Received count.
        found: usize,
    },

    /// No argument at this position.
    #[error("argument {index} is missing")]
    Missing {
        /// Zero-based position.
        index: usize,
    },

    /// The argument did not decode into the requested type.
    #[error("argument {index} is invalid: {reason}")]
    Invalid {
        /// Zero-based position.
        index: usize,
        /// Decoder message.
        reason: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// RegistrationError
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatch table construction failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A method was registered with an empty name.
    #[error("method name is empty")]
    EmptyName,
    /// The same method name was registered twice.
    #[error("method '{0}' is registered more than once")]
    Duplicate(String),
}
