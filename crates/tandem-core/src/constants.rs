//! Wire constants shared by both endpoints.

/// Prefix carried by every valid text frame.
pub const SENTINEL: &str = "//OK";

/// First token of every stream: the generic interface both sides decode through.
pub const INTERFACE_MARKER: &str = "tandem.Endpoint";

/// Second token: placeholder method name required by the generic decode shape.
pub const DISPATCH_MARKER: &str = "dummy";

/// Third token: parameter count. Always one (the envelope).
pub const PARAMETER_COUNT: i64 = 1;

/// Fourth token: type marker of the envelope object that follows.
pub const ENVELOPE_TYPE: &str = "tandem.Invocation";

/// Object key naming a serializer-known type inside an argument graph.
pub const TYPE_TAG: &str = "$type";

/// Default upper bound for one encoded frame (16 MB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
