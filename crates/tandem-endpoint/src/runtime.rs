//! The endpoint runtime.
//!
//! One [`Endpoint`] owns one connection for its whole life. A single task
//! drains the connection's events in order: it drives the
//! `Connecting → Open → Closed` state machine, decodes inbound frames, and
//! dispatches them through the [`DispatchTable`] onto the delegate.
//!
//! Error routing:
//! - call-scoped ([`CallError`]) → `delegate.on_error`, or `warn!` with no delegate
//! - connection-scoped ([`TransportError`]) → the [`ConnectionErrorHandler`],
//!   or `warn!` with no handler
//!
//! Neither kind closes the connection. Only [`Endpoint::close`] or the
//! transport's own disconnect does. A panicking delegate callback or error
//! handler is logged and the loop carries on with the next event.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tandem_core::{
    CallError, EndpointState, Envelope, SendError, SerializationError, TransportError,
};
use tandem_wire::{JsonSerializer, Serializer, decode_frame, encode_frame, value_kind};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionAdapter, TransportEvent};
use crate::delegate::{ConnectionErrorHandler, Delegate};
use crate::dispatch::{DispatchTable, panic_message};

// ─────────────────────────────────────────────────────────────────────────────
// Outbound half
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to put a call on the wire.
struct Outbound {
    connection: ConnectionAdapter,
    serializer: Arc<dyn Serializer>,
    state: watch::Sender<EndpointState>,
    /// Held across the open check and the enqueue, and across close, so no
    /// frame is queued behind the close command.
    gate: Mutex<()>,
}

impl Outbound {
    fn state(&self) -> EndpointState {
        *self.state.borrow()
    }

    /// Apply `next` if the state machine allows it.
    fn transition(&self, next: EndpointState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    fn close(&self) -> bool {
        let _gate = self.gate.lock();
        if !self.transition(EndpointState::Closed) {
            return false;
        }
        self.connection.close();
        true
    }

    fn send(
        &self,
        method: &str,
        arguments: Result<Vec<Value>, SerializationError>,
        errors: Option<&dyn ErrorSink>,
    ) -> Result<(), SendError> {
        let state = self.state();
        if !state.is_open() {
            debug!(method, %state, "send refused, endpoint not open");
            return Err(SendError::NotConnected { state });
        }

        let encoded = arguments
            .and_then(|args| Envelope::new(method, args))
            .and_then(|envelope| encode_frame(self.serializer.as_ref(), &envelope));
        let frame = match encoded {
            Ok(frame) => frame,
            Err(source) => {
                let error = CallError::EncodeFailure {
                    method: method.to_owned(),
                    source: source.clone(),
                };
                match errors {
                    Some(sink) => sink.report(&error),
                    None => warn!(method, %error, "encode failure with no delegate attached"),
                }
                return Err(SendError::Encode(source));
            }
        };

        {
            let _gate = self.gate.lock();
            let state = self.state();
            if !state.is_open() {
                debug!(method, %state, "send refused, endpoint closed while encoding");
                return Err(SendError::NotConnected { state });
            }
            self.connection.send_text(frame)?;
        }
        counter!("tandem_frames_sent_total").increment(1);
        debug!(method, "call sent");
        Ok(())
    }
}

/// Convert a serializable argument tuple into an argument list.
///
/// Arrays (tuples, `Vec`s) become the list; `()` becomes no arguments.
fn to_arguments<A: Serialize + ?Sized>(args: &A) -> Result<Vec<Value>, SerializationError> {
    match serde_json::to_value(args)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(SerializationError::UnexpectedToken {
            expected: "argument array",
            found: value_kind(&other).to_owned(),
        }),
    }
}

/// Run one delegate or handler callback, containing any panic.
fn guarded(callback: &'static str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        counter!("tandem_callback_panics_total", "callback" => callback).increment(1);
        warn!(
            callback,
            panic = %panic_message(&*payload),
            "callback panicked, continuing"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Delegate slot
// ─────────────────────────────────────────────────────────────────────────────

/// Where call-scoped errors go.
trait ErrorSink: Send + Sync {
    fn report(&self, error: &CallError);
}

struct DelegateSlot<D> {
    delegate: RwLock<Option<Arc<D>>>,
}

impl<D: Delegate> DelegateSlot<D> {
    fn get(&self) -> Option<Arc<D>> {
        self.delegate.read().clone()
    }
}

impl<D: Delegate> ErrorSink for DelegateSlot<D> {
    fn report(&self, error: &CallError) {
        counter!("tandem_call_errors_total", "kind" => error.kind()).increment(1);
        match self.get() {
            Some(delegate) => guarded("on_error", || delegate.on_error(error)),
            None => warn!(
                method = error.method(),
                kind = error.kind(),
                %error,
                "call error with no delegate attached"
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoint
// ─────────────────────────────────────────────────────────────────────────────

struct Inner<D: Delegate> {
    outbound: Arc<Outbound>,
    slot: Arc<DelegateSlot<D>>,
    table: Arc<DispatchTable<D>>,
    error_handler: Option<Arc<dyn ConnectionErrorHandler>>,
    close_notified: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    finished: watch::Sender<bool>,
}

/// One side of a tandem connection.
///
/// Cheap to clone; clones share the same runtime. Dropping every handle
/// (and every [`Caller`]) closes the connection without further callbacks.
pub struct Endpoint<D: Delegate> {
    inner: Arc<Inner<D>>,
}

impl<D: Delegate> Endpoint<D> {
    /// Runtime over `connection` with the default JSON serializer.
    pub fn new(connection: ConnectionAdapter, table: Arc<DispatchTable<D>>) -> Self {
        Self::with_options(connection, table, Arc::new(JsonSerializer::new()), None)
    }

    /// Runtime with an explicit serializer and connection error handler.
    pub fn with_options(
        mut connection: ConnectionAdapter,
        table: Arc<DispatchTable<D>>,
        serializer: Arc<dyn Serializer>,
        error_handler: Option<Arc<dyn ConnectionErrorHandler>>,
    ) -> Self {
        let events = connection.take_events();
        if events.is_none() {
            warn!("connection events already taken, endpoint will never open");
        }
        let (state, _) = watch::channel(EndpointState::Connecting);
        let (finished, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                outbound: Arc::new(Outbound {
                    connection,
                    serializer,
                    state,
                    gate: Mutex::new(()),
                }),
                slot: Arc::new(DelegateSlot {
                    delegate: RwLock::new(None),
                }),
                table,
                error_handler,
                close_notified: AtomicBool::new(false),
                events: Mutex::new(events),
                finished,
            }),
        }
    }

    /// Spawn the event loop. Later calls are no-ops.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self) {
        let Some(events) = self.inner.events.lock().take() else {
            debug!("endpoint already started");
            return;
        };
        drop(tokio::spawn(run_event_loop(
            Arc::downgrade(&self.inner),
            events,
        )));
    }

    // ── Delegate slot ───────────────────────────────────────────────

    /// Attach `delegate`, returning the previous one.
    pub fn set_delegate(&self, delegate: Arc<D>) -> Option<Arc<D>> {
        self.inner.slot.delegate.write().replace(delegate)
    }

    /// The attached delegate.
    pub fn delegate(&self) -> Option<Arc<D>> {
        self.inner.slot.get()
    }

    /// Detach the delegate, returning it.
    pub fn clear_delegate(&self) -> Option<Arc<D>> {
        self.inner.slot.delegate.write().take()
    }

    // ── State ───────────────────────────────────────────────────────

    /// Current lifecycle state.
    pub fn state(&self) -> EndpointState {
        self.inner.outbound.state()
    }

    /// Wait until the state is `target` or `Closed`, returning the state seen.
    pub async fn wait_for_state(&self, target: EndpointState) -> EndpointState {
        let mut rx = self.inner.outbound.state.subscribe();
        match rx.wait_for(|s| *s == target || s.is_closed()).await {
            Ok(state) => *state,
            Err(_) => EndpointState::Closed,
        }
    }

    /// Wait until the transport is gone and `on_close` has been delivered.
    pub async fn closed(&self) {
        let mut rx = self.inner.finished.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// The dispatch table this endpoint serves.
    pub fn dispatch_table(&self) -> &Arc<DispatchTable<D>> {
        &self.inner.table
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Close locally, then ask the transport to close.
    ///
    /// The state is `Closed` when this returns; `on_close` follows once the
    /// transport confirms. No-op when already closed.
    pub fn close(&self) {
        if self.inner.outbound.close() {
            info!(interface = self.inner.table.interface(), "closing endpoint");
        }
    }

    /// Send one call to the peer.
    ///
    /// Requires `Open`. Encode failures are also reported to the
    /// delegate's `on_error`.
    pub fn send_message(&self, method: &str, arguments: Vec<Value>) -> Result<(), SendError> {
        self.inner
            .outbound
            .send(method, Ok(arguments), Some(self.inner.slot.as_ref() as &dyn ErrorSink))
    }

    /// Send one call whose arguments serialize to a JSON array.
    pub fn call<A: Serialize + ?Sized>(&self, method: &str, args: &A) -> Result<(), SendError> {
        self.inner
            .outbound
            .send(method, to_arguments(args), Some(self.inner.slot.as_ref() as &dyn ErrorSink))
    }

    /// Outbound-only handle for delegates.
    ///
    /// Holds no strong reference to the delegate, so a delegate may store
    /// its own caller without forming a cycle.
    pub fn caller(&self) -> Caller {
        let sink: Arc<dyn ErrorSink> = self.inner.slot.clone();
        Caller {
            outbound: Arc::clone(&self.inner.outbound),
            errors: Arc::downgrade(&sink),
        }
    }
}

impl<D: Delegate> Clone for Endpoint<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Delegate> fmt::Debug for Endpoint<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("interface", &self.inner.table.interface())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run_event_loop<D: Delegate>(
    weak: Weak<Inner<D>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = weak.upgrade() else {
            debug!("endpoint dropped, stopping event loop");
            return;
        };
        match event {
            TransportEvent::Opened => inner.on_open(),
            TransportEvent::Message(frame) => inner.on_message(&frame),
            TransportEvent::Error(error) => inner.on_transport_error(error),
            TransportEvent::Closed => break,
        }
    }

    if let Some(inner) = weak.upgrade() {
        inner.on_transport_closed();
        let _ = inner.finished.send_replace(true);
    }
}

impl<D: Delegate> Inner<D> {
    fn on_open(&self) {
        if !self.outbound.transition(EndpointState::Open) {
            debug!(state = %self.outbound.state(), "ignoring open notification");
            return;
        }
        info!(interface = self.table.interface(), "endpoint open");
        match self.slot.get() {
            Some(delegate) => guarded("on_open", || delegate.on_open()),
            None => debug!(
                interface = self.table.interface(),
                "no delegate attached, dropping open notification"
            ),
        }
    }

    fn on_message(&self, frame: &str) {
        if self.outbound.state().is_closed() {
            debug!(bytes = frame.len(), "endpoint closed, dropping inbound frame");
            return;
        }
        counter!("tandem_frames_received_total").increment(1);

        let envelope = match decode_frame(self.outbound.serializer.as_ref(), frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                self.on_transport_error(TransportError::MalformedFrame(error));
                return;
            }
        };

        let method = envelope.method();
        debug!(method, args = envelope.values().len(), "dispatching call");
        let result = match self.slot.get() {
            Some(delegate) => self.table.dispatch(delegate.as_ref(), &envelope),
            None if self.table.has_method(method) => {
                warn!(method, "no delegate attached, dropping call");
                return;
            }
            None => Err(CallError::UnknownMethod {
                method: method.to_owned(),
            }),
        };
        if let Err(error) = result {
            self.slot.report(&error);
        }
    }

    fn on_transport_error(&self, error: TransportError) {
        counter!("tandem_transport_errors_total").increment(1);
        match &self.error_handler {
            Some(handler) => guarded("transport_error", || handler.on_error(&error)),
            None => warn!(%error, "unhandled transport error"),
        }

        if self.outbound.state() == EndpointState::Connecting {
            info!(interface = self.table.interface(), "connect failed");
            let _ = self.outbound.close();
            self.notify_closed();
        }
    }

    fn on_transport_closed(&self) {
        if self.outbound.transition(EndpointState::Closed) {
            info!(interface = self.table.interface(), "transport closed");
        }
        self.notify_closed();
    }

    fn notify_closed(&self) {
        if self.close_notified.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.slot.get() {
            Some(delegate) => guarded("on_close", || delegate.on_close()),
            None => debug!(
                interface = self.table.interface(),
                "no delegate attached, dropping close notification"
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Caller
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound half of an endpoint.
///
/// Encode failures still reach the endpoint's delegate while it is
/// attached.
#[derive(Clone)]
pub struct Caller {
    outbound: Arc<Outbound>,
    errors: Weak<dyn ErrorSink>,
}

impl Caller {
    /// Send one call to the peer. Same contract as [`Endpoint::send_message`].
    pub fn send_message(&self, method: &str, arguments: Vec<Value>) -> Result<(), SendError> {
        let sink = self.errors.upgrade();
        self.outbound.send(method, Ok(arguments), sink.as_deref())
    }

    /// Send one call whose arguments serialize to a JSON array.
    pub fn call<A: Serialize + ?Sized>(&self, method: &str, args: &A) -> Result<(), SendError> {
        let sink = self.errors.upgrade();
        self.outbound.send(method, to_arguments(args), sink.as_deref())
    }

    /// Current state of the owning endpoint.
    pub fn state(&self) -> EndpointState {
        self.outbound.state()
    }

    /// Close the owning endpoint. Same contract as [`Endpoint::close`].
    pub fn close(&self) {
        let _ = self.outbound.close();
    }
}

impl fmt::Debug for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{TransportCommand, TransportHandle, channel};
    use assert_matches::assert_matches;
    use serde_json::json;
    use tandem_logging::capture_logs;
    use tracing::Level;

    #[derive(Default)]
    struct Witness {
        log: Mutex<Vec<String>>,
    }

    impl Witness {
        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    impl Delegate for Witness {
        fn on_open(&self) {
            self.log.lock().push("open".into());
        }
        fn on_close(&self) {
            self.log.lock().push("close".into());
        }
        fn on_error(&self, error: &CallError) {
            self.log.lock().push(format!("error:{}", error.kind()));
        }
    }

    fn table() -> Arc<DispatchTable<Witness>> {
        Arc::new(
            DispatchTable::builder("test.Witness")
                .method1("note", |p: &Witness, text: String| {
                    p.log.lock().push(format!("note:{text}"));
                    Ok(())
                })
                .method0("explode", |_p: &Witness| panic!("boom"))
                .build()
                .unwrap(),
        )
    }

    fn frame(method: &str, args: Vec<Value>) -> String {
        encode_frame(&JsonSerializer::new(), &Envelope::new(method, args).unwrap()).unwrap()
    }

    fn started() -> (Endpoint<Witness>, TransportHandle, Arc<Witness>) {
        let (adapter, handle) = channel();
        let endpoint = Endpoint::new(adapter, table());
        let witness = Arc::new(Witness::default());
        let _ = endpoint.set_delegate(Arc::clone(&witness));
        endpoint.start();
        (endpoint, handle, witness)
    }

    async fn opened() -> (Endpoint<Witness>, TransportHandle, Arc<Witness>) {
        let (endpoint, mut handle, witness) = started();
        handle.opened();
        assert_eq!(
            endpoint.wait_for_state(EndpointState::Open).await,
            EndpointState::Open
        );
        (endpoint, handle, witness)
    }

    /// Close from the transport side and wait until every event is handled.
    async fn drain(endpoint: &Endpoint<Witness>, mut handle: TransportHandle) {
        handle.closed();
        endpoint.closed().await;
    }

    #[tokio::test]
    async fn lifecycle_callbacks_in_order() {
        let (endpoint, handle, witness) = opened().await;
        handle.message(frame("note", vec![json!("hi")]));
        drain(&endpoint, handle).await;

        assert_eq!(witness.log(), vec!["open", "note:hi", "close"]);
        assert_eq!(endpoint.state(), EndpointState::Closed);
    }

    #[tokio::test]
    async fn send_requires_open() {
        let (endpoint, mut handle, _witness) = started();
        let err = endpoint.send_message("note", vec![json!("x")]).unwrap_err();
        assert_eq!(
            err,
            SendError::NotConnected {
                state: EndpointState::Connecting
            }
        );
        assert!(handle.try_next_command().is_none());
    }

    #[tokio::test]
    async fn send_puts_one_frame_on_the_wire() {
        let (endpoint, mut handle, _witness) = opened().await;
        endpoint.send_message("ping", vec![json!(42)]).unwrap();

        assert_eq!(
            handle.try_next_command(),
            Some(TransportCommand::SendText(frame("ping", vec![json!(42)])))
        );
        assert!(handle.try_next_command().is_none());
    }

    #[tokio::test]
    async fn close_is_synchronous_and_idempotent() {
        let (endpoint, mut handle, witness) = opened().await;

        endpoint.close();
        assert_eq!(endpoint.state(), EndpointState::Closed);
        assert_eq!(handle.try_next_command(), Some(TransportCommand::Close));
        assert_eq!(witness.log(), vec!["open"]);

        endpoint.close();
        assert!(handle.try_next_command().is_none());

        assert_matches!(
            endpoint.send_message("note", vec![json!("late")]),
            Err(SendError::NotConnected {
                state: EndpointState::Closed
            })
        );

        drain(&endpoint, handle).await;
        assert_eq!(witness.log(), vec!["open", "close"]);
    }

    #[tokio::test]
    async fn inbound_frames_after_close_are_dropped() {
        let (endpoint, handle, witness) = opened().await;
        endpoint.close();
        handle.message(frame("note", vec![json!("late")]));
        drain(&endpoint, handle).await;
        assert_eq!(witness.log(), vec!["open", "close"]);
    }

    #[tokio::test]
    async fn unknown_method_reaches_delegate_and_keeps_connection() {
        let (endpoint, handle, witness) = opened().await;
        handle.message(frame("missing", vec![]));
        handle.message(frame("note", vec![json!("after")]));
        tokio::task::yield_now().await;
        assert_eq!(endpoint.state(), EndpointState::Open);
        drain(&endpoint, handle).await;

        assert_eq!(
            witness.log(),
            vec!["open", "error:unknown_method", "note:after", "close"]
        );
    }

    #[tokio::test]
    async fn handler_failures_are_dispatch_failures() {
        let (endpoint, handle, witness) = opened().await;
        handle.message(frame("explode", vec![]));
        handle.message(frame("note", vec![json!(1)]));
        handle.message(frame("note", vec![]));
        handle.message(frame("note", vec![json!("ok")]));
        drain(&endpoint, handle).await;

        assert_eq!(
            witness.log(),
            vec![
                "open",
                "error:dispatch_failure",
                "error:dispatch_failure",
                "error:dispatch_failure",
                "note:ok",
                "close",
            ]
        );
    }

    #[tokio::test]
    async fn malformed_frames_go_to_the_error_handler_only() {
        let seen: Arc<Mutex<Vec<TransportError>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn ConnectionErrorHandler> =
            Arc::new(move |e: &TransportError| sink.lock().push(e.clone()));

        let (adapter, mut handle) = channel();
        let endpoint = Endpoint::with_options(
            adapter,
            table(),
            Arc::new(JsonSerializer::new()),
            Some(handler),
        );
        let witness = Arc::new(Witness::default());
        let _ = endpoint.set_delegate(Arc::clone(&witness));
        endpoint.start();
        handle.opened();

        handle.message("no sentinel".into());
        handle.message("//OK[1,2".into());
        handle.message(frame("note", vec![json!("fine")]));
        drain(&endpoint, handle).await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_matches!(
            &seen[0],
            TransportError::MalformedFrame(SerializationError::MissingSentinel)
        );
        assert_matches!(&seen[1], TransportError::MalformedFrame(SerializationError::Json(_)));
        assert_eq!(witness.log(), vec!["open", "note:fine", "close"]);
    }

    #[tokio::test]
    async fn unhandled_transport_error_is_logged() {
        let (logs, _guard) = capture_logs();
        let (endpoint, handle, witness) = opened().await;
        handle.error(TransportError::WebSocket("reset by peer".into()));
        drain(&endpoint, handle).await;

        assert!(logs.has_event(Level::WARN, "unhandled transport error"));
        assert_eq!(witness.log(), vec!["open", "close"]);
    }

    #[tokio::test]
    async fn failed_connect_closes_and_notifies_once() {
        let (endpoint, mut handle, witness) = started();
        handle.error(TransportError::Connect {
            url: "ws://nowhere/".into(),
            reason: "refused".into(),
        });
        assert_eq!(
            endpoint.wait_for_state(EndpointState::Open).await,
            EndpointState::Closed
        );
        handle.closed();
        endpoint.closed().await;
        assert_eq!(witness.log(), vec!["close"]);
    }

    #[tokio::test]
    async fn open_after_local_close_is_ignored() {
        let (endpoint, mut handle, witness) = started();
        endpoint.close();
        handle.opened();
        drain(&endpoint, handle).await;
        assert_eq!(witness.log(), vec!["close"]);
    }

    #[tokio::test]
    async fn no_delegate_diagnostics() {
        let (logs, _guard) = capture_logs();
        let (adapter, mut handle) = channel();
        let endpoint = Endpoint::<Witness>::new(adapter, table());
        endpoint.start();
        handle.opened();
        handle.message(frame("missing", vec![]));
        handle.message(frame("note", vec![json!("x")]));
        handle.closed();
        endpoint.closed().await;

        assert!(logs.has_event(Level::DEBUG, "no delegate attached, dropping open notification"));
        assert!(logs.has_event(Level::WARN, "call error with no delegate attached"));
        assert!(logs.has_event(Level::WARN, "no delegate attached, dropping call"));
    }

    #[tokio::test]
    async fn encode_failure_is_reported_and_returned() {
        let (endpoint, mut handle, witness) = opened().await;
        let err = endpoint
            .send_message("note", vec![json!({"$type": "demo.Unknown"})])
            .unwrap_err();
        assert_matches!(
            err,
            SendError::Encode(SerializationError::UnregisteredType { .. })
        );
        assert!(handle.try_next_command().is_none());
        assert_eq!(witness.log(), vec!["open", "error:encode_failure"]);
    }

    #[tokio::test]
    async fn typed_call_helper() {
        let (endpoint, mut handle, witness) = opened().await;
        endpoint.call("note", &("typed",)).unwrap();
        let Some(TransportCommand::SendText(text)) = handle.try_next_command() else {
            panic!("expected a frame");
        };
        let envelope = decode_frame(&JsonSerializer::new(), &text).unwrap();
        assert_eq!(envelope.values(), &[json!("typed")]);

        endpoint.call("ping", &()).unwrap();
        let Some(TransportCommand::SendText(text)) = handle.try_next_command() else {
            panic!("expected a frame");
        };
        assert!(decode_frame(&JsonSerializer::new(), &text)
            .unwrap()
            .values()
            .is_empty());

        assert_matches!(endpoint.call("note", &5), Err(SendError::Encode(_)));
        assert_eq!(witness.log(), vec!["open", "error:encode_failure"]);
    }

    #[tokio::test]
    async fn caller_does_not_keep_delegate_alive() {
        let (endpoint, mut handle, witness) = opened().await;
        let caller = endpoint.caller();
        let weak = Arc::downgrade(&witness);

        let _ = endpoint.clear_delegate();
        drop(witness);
        assert!(weak.upgrade().is_none());

        caller.send_message("note", vec![json!("still works")]).unwrap();
        assert_matches!(handle.try_next_command(), Some(TransportCommand::SendText(_)));
        assert_eq!(caller.state(), EndpointState::Open);

        caller.close();
        assert_eq!(endpoint.state(), EndpointState::Closed);
    }

    #[tokio::test]
    async fn delegate_can_be_rebound() {
        let (endpoint, handle, first) = opened().await;
        let second = Arc::new(Witness::default());
        let previous = endpoint.set_delegate(Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&previous, &first));

        handle.message(frame("note", vec![json!("to second")]));
        drain(&endpoint, handle).await;
        assert_eq!(first.log(), vec!["open"]);
        assert_eq!(second.log(), vec!["note:to second", "close"]);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (endpoint, mut handle, witness) = started();
        endpoint.start();
        handle.opened();
        drain(&endpoint, handle).await;
        assert_eq!(witness.log(), vec!["open", "close"]);
    }

    /// Records like [`Witness`], then panics in every lifecycle callback.
    #[derive(Default)]
    struct Grumpy {
        log: Mutex<Vec<String>>,
    }

    impl Delegate for Grumpy {
        fn on_open(&self) {
            self.log.lock().push("open".into());
            panic!("open handler broke");
        }
        fn on_close(&self) {
            self.log.lock().push("close".into());
            panic!("close handler broke");
        }
        fn on_error(&self, error: &CallError) {
            self.log.lock().push(format!("error:{}", error.kind()));
            panic!("error handler broke");
        }
    }

    #[tokio::test]
    async fn panicking_callbacks_do_not_stop_the_loop() {
        let (logs, _guard) = capture_logs();
        let table = Arc::new(
            DispatchTable::builder("test.Grumpy")
                .method1("note", |g: &Grumpy, text: String| {
                    g.log.lock().push(format!("note:{text}"));
                    Ok(())
                })
                .build()
                .unwrap(),
        );
        let (adapter, mut handle) = channel();
        let endpoint = Endpoint::new(adapter, table);
        let grumpy = Arc::new(Grumpy::default());
        let _ = endpoint.set_delegate(Arc::clone(&grumpy));
        endpoint.start();

        handle.opened();
        handle.message(frame("missing", vec![]));
        handle.message(frame("note", vec![json!("after")]));
        handle.closed();
        tokio::time::timeout(std::time::Duration::from_secs(5), endpoint.closed())
            .await
            .unwrap();

        assert_eq!(
            *grumpy.log.lock(),
            vec!["open", "error:unknown_method", "note:after", "close"]
        );
        assert_eq!(endpoint.state(), EndpointState::Closed);
        assert!(logs.has_event(Level::WARN, "callback panicked, continuing"));
    }

    fn broken_handler(_error: &TransportError) {
        panic!("handler broke");
    }

    #[tokio::test]
    async fn panicking_error_handler_is_contained() {
        let handler: Arc<dyn ConnectionErrorHandler> = Arc::new(broken_handler);
        let (adapter, mut handle) = channel();
        let endpoint = Endpoint::with_options(
            adapter,
            table(),
            Arc::new(JsonSerializer::new()),
            Some(handler),
        );
        let witness = Arc::new(Witness::default());
        let _ = endpoint.set_delegate(Arc::clone(&witness));
        endpoint.start();
        handle.opened();

        handle.message("garbage".into());
        handle.message(frame("note", vec![json!("still here")]));
        drain(&endpoint, handle).await;
        assert_eq!(witness.log(), vec!["open", "note:still here", "close"]);
    }

    #[tokio::test]
    async fn no_frame_is_queued_behind_close() {
        let (endpoint, mut handle, _witness) = opened().await;
        let accepted = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let caller = endpoint.caller();
                let accepted = &accepted;
                let _ = scope.spawn(move || {
                    for n in 0..200 {
                        if caller.call("note", &(n.to_string(),)).is_ok() {
                            let _ = accepted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
            let closer = endpoint.caller();
            let _ = scope.spawn(move || {
                std::thread::yield_now();
                closer.close();
            });
        });

        let mut frames = 0;
        let mut saw_close = false;
        while let Some(command) = handle.try_next_command() {
            match command {
                TransportCommand::SendText(_) => {
                    assert!(!saw_close, "frame queued after close");
                    frames += 1;
                }
                TransportCommand::Close => saw_close = true,
            }
        }
        assert!(saw_close);
        assert_eq!(frames, accepted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn transport_drop_counts_as_close() {
        let (endpoint, handle, witness) = opened().await;
        drop(handle);
        endpoint.closed().await;
        assert_eq!(endpoint.state(), EndpointState::Closed);
        assert_eq!(witness.log(), vec!["open", "close"]);
    }
}
