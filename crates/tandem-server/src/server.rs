//! `TandemServer`: Axum HTTP + WebSocket host.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::{counter, gauge};
use tandem_endpoint::{Caller, Delegate, DispatchTable};
use tandem_wire::{JsonSerializer, Serializer};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{self, ServerConfig};
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::session::{self, SessionContext};
use crate::shutdown::ShutdownCoordinator;

/// Builds the delegate for one accepted connection.
///
/// The [`Caller`] lets the delegate call back to the peer on that
/// connection.
pub trait DelegateFactory<D: Delegate>: Send + Sync + 'static {
    /// Delegate for a new connection.
    fn create(&self, caller: Caller) -> Arc<D>;
}

impl<D, F> DelegateFactory<D> for F
where
    D: Delegate,
    F: Fn(Caller) -> Arc<D> + Send + Sync + 'static,
{
    fn create(&self, caller: Caller) -> Arc<D> {
        self(caller)
    }
}

/// Shared state accessible from Axum handlers.
struct AppState<D: Delegate> {
    config: Arc<ServerConfig>,
    table: Arc<DispatchTable<D>>,
    factory: Arc<dyn DelegateFactory<D>>,
    serializer: Arc<dyn Serializer>,
    shutdown: Arc<ShutdownCoordinator>,
    connections: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
    start_time: Instant,
}

impl<D: Delegate> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            table: Arc::clone(&self.table),
            factory: Arc::clone(&self.factory),
            serializer: Arc::clone(&self.serializer),
            shutdown: Arc::clone(&self.shutdown),
            connections: Arc::clone(&self.connections),
            next_id: Arc::clone(&self.next_id),
            start_time: self.start_time,
        }
    }
}

/// Hosts one interface: every WebSocket connection gets its own endpoint
/// and its own delegate.
pub struct TandemServer<D: Delegate> {
    config: Arc<ServerConfig>,
    table: Arc<DispatchTable<D>>,
    factory: Arc<dyn DelegateFactory<D>>,
    serializer: Arc<dyn Serializer>,
    shutdown: Arc<ShutdownCoordinator>,
    connections: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
    start_time: Instant,
}

impl<D: Delegate> TandemServer<D> {
    /// Create a new server. The frame codec is a [`JsonSerializer`] limited
    /// to `config.max_frame_bytes`.
    pub fn new(
        config: ServerConfig,
        table: Arc<DispatchTable<D>>,
        factory: impl DelegateFactory<D>,
    ) -> Self {
        let serializer = JsonSerializer::new().with_max_frame_bytes(config.max_frame_bytes);
        Self {
            config: Arc::new(config),
            table,
            factory: Arc::new(factory),
            serializer: Arc::new(serializer),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            connections: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
            start_time: Instant::now(),
        }
    }

    /// Replace the frame codec.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Largest WebSocket message a session accepts, derived from the codec's
    /// frame limit.
    pub fn max_message_size(&self) -> usize {
        config::max_message_size(self.serializer.max_frame_bytes())
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: Arc::clone(&self.config),
            table: Arc::clone(&self.table),
            factory: Arc::clone(&self.factory),
            serializer: Arc::clone(&self.serializer),
            shutdown: Arc::clone(&self.shutdown),
            connections: Arc::clone(&self.connections),
            next_id: Arc::clone(&self.next_id),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler::<D>))
            .route(&self.config.path, get(upgrade_handler::<D>))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes after [`ShutdownCoordinator::shutdown`].
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;

        info!(
            %local,
            path = %self.config.path,
            interface = self.table.interface(),
            "tandem server listening"
        );

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let stop = async move { token.cancelled().await };
            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(stop)
                .await
            {
                error!(%error, "server terminated");
            }
        });
        Ok((local, handle))
    }

    /// Open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the served dispatch table.
    pub fn dispatch_table(&self) -> &Arc<DispatchTable<D>> {
        &self.table
    }
}

/// One counted connection. Releases its slot on drop.
struct ConnectionSlot {
    connections: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(connections: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        let acquired = connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1));
        if acquired.is_err() {
            return None;
        }
        counter!("tandem_connections_total").increment(1);
        gauge!("tandem_connections_active").increment(1.0);
        Some(Self {
            connections: Arc::clone(connections),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.connections.fetch_sub(1, Ordering::SeqCst);
        gauge!("tandem_connections_active").decrement(1.0);
    }
}

/// GET /health
async fn health_handler<D: Delegate>(State(state): State<AppState<D>>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.table.interface(),
        state.start_time,
        state.connections.load(Ordering::SeqCst),
        state.config.max_connections,
    ))
}

/// GET {path}: WebSocket upgrade into a new endpoint.
async fn upgrade_handler<D: Delegate>(
    State(state): State<AppState<D>>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Some(slot) = ConnectionSlot::acquire(&state.connections, state.config.max_connections)
    else {
        counter!("tandem_connections_rejected_total").increment(1);
        warn!(
            max_connections = state.config.max_connections,
            "connection limit reached, rejecting upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    let ctx = SessionContext {
        table: Arc::clone(&state.table),
        factory: Arc::clone(&state.factory),
        serializer: Arc::clone(&state.serializer),
        shutdown: state.shutdown.token(),
    };
    ws.max_message_size(config::max_message_size(state.serializer.max_frame_bytes()))
        .on_upgrade(move |socket| async move {
            session::run_session(socket, id, ctx).await;
            drop(slot);
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
