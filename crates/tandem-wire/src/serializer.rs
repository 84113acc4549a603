//! Stream codec trait and its JSON implementation.

use serde_json::Value;
use tandem_core::SerializationError;
use tandem_core::constants::DEFAULT_MAX_FRAME_BYTES;

use crate::registry::TypeRegistry;

/// Converts a token stream to and from its text form.
///
/// Both endpoints must use compatible serializers. The frame codec adds the
/// sentinel and header; implementations only handle the token list.
pub trait Serializer: Send + Sync {
    /// Encode tokens as stream text.
    fn write_stream(&self, tokens: &[Value]) -> Result<String, SerializationError>;

    /// Decode stream text into tokens.
    fn read_stream(&self, body: &str) -> Result<Vec<Value>, SerializationError>;

    /// Object types this serializer accepts.
    fn types(&self) -> &TypeRegistry;

    /// Upper bound for one encoded stream, in bytes.
    fn max_frame_bytes(&self) -> usize;
}

/// Stream codec over a JSON array.
#[derive(Clone, Debug)]
pub struct JsonSerializer {
    types: TypeRegistry,
    max_frame_bytes: usize,
}

impl JsonSerializer {
    /// Serializer with the default registry and size limit.
    pub fn new() -> Self {
        Self {
            types: TypeRegistry::new(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Replace the type registry.
    #[must_use]
    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// Replace the size limit.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    fn check_size(&self, size: usize) -> Result<(), SerializationError> {
        if size > self.max_frame_bytes {
            return Err(SerializationError::FrameTooLarge {
                size,
                max: self.max_frame_bytes,
            });
        }
        Ok(())
    }
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer for JsonSerializer {
    fn write_stream(&self, tokens: &[Value]) -> Result<String, SerializationError> {
        let body = serde_json::to_string(tokens)?;
        self.check_size(body.len())?;
        Ok(body)
    }

    fn read_stream(&self, body: &str) -> Result<Vec<Value>, SerializationError> {
        self.check_size(body.len())?;
        match serde_json::from_str::<Value>(body)? {
            Value::Array(tokens) => Ok(tokens),
            other => Err(SerializationError::UnexpectedToken {
                expected: "stream array",
                found: value_kind(&other).to_string(),
            }),
        }
    }

    fn types(&self) -> &TypeRegistry {
        &self.types
    }

    fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

/// Short name of a JSON value's kind, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
