//! One WebSocket connection from upgrade to disconnect.
//!
//! The axum socket is bridged onto a [`TransportHandle`], and an
//! [`Endpoint`] runs on the other half of that channel. From the endpoint's
//! point of view a server connection looks exactly like a client one.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::histogram;
use tandem_core::TransportError;
use tandem_endpoint::connection::{self, TransportCommand, TransportHandle};
use tandem_endpoint::{Delegate, DispatchTable, Endpoint};
use tandem_wire::Serializer;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::server::DelegateFactory;

/// What a session needs from its server.
pub struct SessionContext<D: Delegate> {
    /// Interface served on this connection.
    pub table: Arc<DispatchTable<D>>,
    /// Builds the connection's delegate.
    pub factory: Arc<dyn DelegateFactory<D>>,
    /// Frame codec.
    pub serializer: Arc<dyn Serializer>,
    /// Server-wide stop signal.
    pub shutdown: CancellationToken,
}

/// Serve one upgraded socket until either side closes.
///
/// 1. Creates an endpoint and a fresh delegate for the connection
/// 2. Pumps frames between the socket and the endpoint
/// 3. Waits for the endpoint to deliver `on_close`
#[instrument(skip_all, fields(connection_id = id))]
pub async fn run_session<D: Delegate>(socket: WebSocket, id: u64, ctx: SessionContext<D>) {
    let started = Instant::now();
    let (adapter, handle) = connection::channel();
    let endpoint = Endpoint::with_options(adapter, ctx.table, ctx.serializer, None);
    let _ = endpoint.set_delegate(ctx.factory.create(endpoint.caller()));
    endpoint.start();
    info!("connection accepted");

    pump(socket, handle, ctx.shutdown).await;
    endpoint.closed().await;
    let _ = endpoint.clear_delegate();

    let elapsed = started.elapsed();
    histogram!("tandem_connection_duration_seconds").record(elapsed.as_secs_f64());
    info!(
        duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        "connection closed"
    );
}

/// Bridge `socket` onto `handle` until the peer, the endpoint, or a
/// server shutdown ends the connection.
pub async fn pump(socket: WebSocket, mut handle: TransportHandle, shutdown: CancellationToken) {
    handle.opened();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            cmd = handle.next_command() => match cmd {
                Some(TransportCommand::SendText(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        handle.error(TransportError::WebSocket(e.to_string()));
                        break;
                    }
                }
                Some(TransportCommand::Close) | None => {
                    debug!("endpoint closed, sending close frame");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => handle.message(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => {
                    debug!(bytes = data.len(), "ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    debug!("peer closed");
                    break;
                }
                Some(Err(e)) => {
                    handle.error(TransportError::WebSocket(e.to_string()));
                    break;
                }
            },
            () = shutdown.cancelled() => {
                debug!("server shutting down, closing connection");
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    handle.closed();
}

// Session behavior needs a live socket; see tests/integration.rs.
