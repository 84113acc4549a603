//! Typed access to an envelope's ordered arguments.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ArgumentError;

/// Borrowed view over an argument list.
#[derive(Clone, Copy, Debug)]
pub struct Arguments<'a> {
    values: &'a [Value],
}

impl<'a> Arguments<'a> {
    /// Wrap a slice of values.
    pub fn new(values: &'a [Value]) -> Self {
        Self { values }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at `index`.
    pub fn raw(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    /// Decode the argument at `index` into `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArgumentError> {
        let value = self.raw(index).ok_or(ArgumentError::Missing { index })?;
        T::deserialize(value).map_err(|e| ArgumentError::Invalid {
            index,
            reason: e.to_string(),
        })
    }

    /// Fail unless exactly `expected` arguments are present.
    pub fn expect_arity(&self, expected: usize) -> Result<(), ArgumentError> {
        if self.values.len() == expected {
            Ok(())
        } else {
            Err(ArgumentError::Arity {
                expected,
                found: self.values.len(),
            })
        }
    }
}
