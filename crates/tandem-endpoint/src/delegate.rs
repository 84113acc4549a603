//! Capabilities an application plugs into an endpoint.

use tandem_core::{CallError, TransportError};

/// Lifecycle and call-error callbacks for one interface implementation.
///
/// Interface methods themselves are reached through the endpoint's
/// [`DispatchTable`](crate::DispatchTable). All callbacks for one endpoint
/// run on that endpoint's event-loop task, one at a time. A delegate shared
/// by several endpoints sees their callbacks interleave.
pub trait Delegate: Send + Sync + 'static {
    /// The transport connected.
    fn on_open(&self) {}

    /// The connection ended. Called at most once per endpoint.
    fn on_close(&self) {}

    /// A call-scoped failure: unknown method, dispatch failure, or an
    /// outbound call that could not be encoded.
    fn on_error(&self, _error: &CallError) {}
}

/// Receives connection-scoped failures.
///
/// Kept separate from [`Delegate::on_error`]: transport trouble never
/// reaches the delegate.
pub trait ConnectionErrorHandler: Send + Sync + 'static {
    /// Handle one transport error.
    fn on_error(&self, error: &TransportError);
}

impl<F> ConnectionErrorHandler for F
where
    F: Fn(&TransportError) + Send + Sync + 'static,
{
    fn on_error(&self, error: &TransportError) {
        self(error);
    }
}
