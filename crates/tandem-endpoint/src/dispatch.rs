//! Method name → handler table for one interface.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tandem_core::{Arguments, BoxError, CallError, Envelope, RegistrationError};
use thiserror::Error;

type Trampoline<D> = Arc<dyn Fn(&D, Arguments<'_>) -> Result<(), BoxError> + Send + Sync>;

struct MethodEntry<D> {
    arity: usize,
    trampoline: Trampoline<D>,
}

/// A handler panicked while dispatching.
#[derive(Debug, Error)]
#[error("handler panicked: {0}")]
pub struct HandlerPanic(pub String);

/// Immutable map from method name to a typed trampoline on `D`.
///
/// Built once per interface through [`DispatchTable::builder`] and shared
/// by every endpoint speaking that interface.
pub struct DispatchTable<D> {
    interface: String,
    default_path: Option<String>,
    methods: HashMap<String, MethodEntry<D>>,
}

impl<D> DispatchTable<D> {
    /// Start a table for `interface`.
    pub fn builder(interface: impl Into<String>) -> DispatchTableBuilder<D> {
        DispatchTableBuilder {
            interface: interface.into(),
            default_path: None,
            methods: HashMap::new(),
            error: None,
        }
    }

    /// Interface name.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Default request path declared for this interface.
    pub fn default_path(&self) -> Option<&str> {
        self.default_path.as_deref()
    }

    /// Whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Declared arity of a method.
    pub fn arity(&self, method: &str) -> Option<usize> {
        self.methods.get(method).map(|m| m.arity)
    }

    /// All registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke the method named by `envelope` on `delegate`.
    ///
    /// Arity is checked before the handler runs. Handler errors and panics
    /// both come back as [`CallError::DispatchFailure`].
    pub fn dispatch(&self, delegate: &D, envelope: &Envelope) -> Result<(), CallError> {
        let method = envelope.method();
        let Some(entry) = self.methods.get(method) else {
            return Err(CallError::UnknownMethod {
                method: method.to_owned(),
            });
        };

        let args = envelope.arguments();
        let failure = |source: BoxError| CallError::DispatchFailure {
            method: method.to_owned(),
            source,
        };

        args.expect_arity(entry.arity)
            .map_err(|e| failure(Box::new(e)))?;

        match catch_unwind(AssertUnwindSafe(|| (entry.trampoline)(delegate, args))) {
            Ok(result) => result.map_err(failure),
            Err(payload) => Err(failure(Box::new(HandlerPanic(panic_message(&*payload))))),
        }
    }
}

impl<D> fmt::Debug for DispatchTable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("interface", &self.interface)
            .field("default_path", &self.default_path)
            .field("methods", &self.methods())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Builder for [`DispatchTable`].
///
/// Registration errors are deferred to [`build`](Self::build) so the
/// chain stays fluent.
pub struct DispatchTableBuilder<D> {
    interface: String,
    default_path: Option<String>,
    methods: HashMap<String, MethodEntry<D>>,
    error: Option<RegistrationError>,
}

impl<D> DispatchTableBuilder<D> {
    /// Register a raw handler taking the argument list.
    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, arity: usize, handler: F) -> Self
    where
        F: Fn(&D, Arguments<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        let name = name.into();
        if name.is_empty() {
            self.error = Some(RegistrationError::EmptyName);
            return self;
        }
        match self.methods.entry(name) {
            Entry::Occupied(slot) => {
                self.error = Some(RegistrationError::Duplicate(slot.key().clone()));
            }
            Entry::Vacant(slot) => {
                let _ = slot.insert(MethodEntry {
                    arity,
                    trampoline: Arc::new(handler),
                });
            }
        }
        self
    }

    /// Register a method with no arguments.
    #[must_use]
    pub fn method0<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&D) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.method(name, 0, move |d, _args| handler(d))
    }

    /// Register a method with one typed argument.
    #[must_use]
    pub fn method1<A, F>(self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned,
        F: Fn(&D, A) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.method(name, 1, move |d, args| handler(d, args.get(0)?))
    }

    /// Register a method with two typed arguments.
    #[must_use]
    pub fn method2<A, B, F>(self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned,
        B: DeserializeOwned,
        F: Fn(&D, A, B) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.method(name, 2, move |d, args| handler(d, args.get(0)?, args.get(1)?))
    }

    /// Declare the request path endpoints of this interface default to.
    #[must_use]
    pub fn default_path(mut self, path: impl Into<String>) -> Self {
        self.default_path = Some(path.into());
        self
    }

    /// Finish the table.
    pub fn build(self) -> Result<DispatchTable<D>, RegistrationError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(DispatchTable {
            interface: self.interface,
            default_path: self.default_path,
            methods: self.methods,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
