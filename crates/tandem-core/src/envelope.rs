//! The invocation envelope: one method call on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::arguments::Arguments;
use crate::errors::SerializationError;

/// A single method call, in either direction.
///
/// Immutable once built. The method name is never empty; [`Envelope::new`]
/// and [`Envelope::validate`] both enforce that.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    method: String,
    #[serde(default)]
    arguments: Vec<Value>,
}

impl Envelope {
    /// Build an envelope, rejecting an empty method name.
    pub fn new(
        method: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Result<Self, SerializationError> {
        let envelope = Self {
            method: method.into(),
            arguments,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Check invariants on a deserialized envelope.
    pub fn validate(&self) -> Result<(), SerializationError> {
        if self.method.is_empty() {
            return Err(SerializationError::EmptyMethodName);
        }
        Ok(())
    }

    /// Method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Typed view over the argument list.
    pub fn arguments(&self) -> Arguments<'_> {
        Arguments::new(&self.arguments)
    }

    /// Raw argument values.
    pub fn values(&self) -> &[Value] {
        &self.arguments
    }

    /// Consume into `(method, arguments)`.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.method, self.arguments)
    }
}
