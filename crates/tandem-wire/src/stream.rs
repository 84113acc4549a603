//! Typed cursors over a serialization stream's token list.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tandem_core::SerializationError;

use crate::serializer::value_kind;

/// Appends typed tokens to a stream.
#[derive(Debug, Default)]
pub struct StreamWriter {
    tokens: Vec<Value>,
}

impl StreamWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string token.
    pub fn write_string(&mut self, value: &str) {
        self.tokens.push(Value::String(value.to_string()));
    }

    /// Append an integer token.
    pub fn write_int(&mut self, value: i64) {
        self.tokens.push(Value::from(value));
    }

    /// Append an object token.
    pub fn write_object<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), SerializationError> {
        self.tokens.push(serde_json::to_value(value)?);
        Ok(())
    }

    /// Tokens written so far.
    pub fn tokens(&self) -> &[Value] {
        &self.tokens
    }

    /// Consume into the token list.
    pub fn into_tokens(self) -> Vec<Value> {
        self.tokens
    }
}

/// Reads typed tokens from a stream, front to back.
#[derive(Debug)]
pub struct StreamReader {
    tokens: std::vec::IntoIter<Value>,
}

impl StreamReader {
    /// Reader over `tokens`.
    pub fn new(tokens: Vec<Value>) -> Self {
        Self {
            tokens: tokens.into_iter(),
        }
    }

    fn next(&mut self, expected: &'static str) -> Result<Value, SerializationError> {
        self.tokens
            .next()
            .ok_or(SerializationError::EndOfStream { expected })
    }

    /// Read a string token.
    pub fn read_string(&mut self) -> Result<String, SerializationError> {
        match self.next("string")? {
            Value::String(s) => Ok(s),
            other => Err(unexpected("string", &other)),
        }
    }

    /// Read an integer token.
    pub fn read_int(&mut self) -> Result<i64, SerializationError> {
        let token = self.next("integer")?;
        token.as_i64().ok_or_else(|| unexpected("integer", &token))
    }

    /// Read an object token and decode it into `T`.
    pub fn read_object<T: DeserializeOwned>(&mut self) -> Result<T, SerializationError> {
        match self.next("object")? {
            value @ Value::Object(_) => Ok(serde_json::from_value(value)?),
            other => Err(unexpected("object", &other)),
        }
    }

    /// Tokens not yet read.
    pub fn remaining(&self) -> usize {
        self.tokens.len()
    }

    /// Fail if any token is left unread.
    pub fn finish(self) -> Result<(), SerializationError> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(SerializationError::TrailingTokens { count }),
        }
    }
}

fn unexpected(expected: &'static str, found: &Value) -> SerializationError {
    SerializationError::UnexpectedToken {
        expected,
        found: value_kind(found).to_string(),
    }
}
