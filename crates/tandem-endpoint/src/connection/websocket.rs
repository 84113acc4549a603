//! WebSocket transport driver (tokio-tungstenite).

use futures::{SinkExt, StreamExt};
use tandem_core::TransportError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, info};
use url::Url;

use super::{ConnectionAdapter, TransportCommand, TransportHandle, channel};

/// Open a client connection to `url`.
///
/// Returns immediately. The connect runs on a spawned task and reports
/// `Opened` or `Error` + `Closed` through the adapter's events. Must be
/// called inside a tokio runtime.
pub fn connect(url: &Url) -> ConnectionAdapter {
    let (adapter, handle) = channel();
    drop(tokio::spawn(run_client(url.clone(), handle)));
    adapter
}

async fn run_client(url: Url, mut handle: TransportHandle) {
    debug!(%url, "connecting");
    match connect_async(url.as_str()).await {
        Ok((stream, _response)) => {
            info!(%url, "websocket connected");
            drive(stream, handle).await;
        }
        Err(e) => {
            handle.error(TransportError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            });
            handle.closed();
        }
    }
}

/// Drive an already-open WebSocket stream until either side closes.
///
/// Emits `Opened` first and `Closed` last. Text frames become `Message`
/// events; binary frames are ignored; control frames are left to
/// tungstenite.
pub async fn drive<S>(stream: WebSocketStream<S>, mut handle: TransportHandle)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    handle.opened();
    let (mut ws_tx, mut ws_rx) = stream.split();

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
                    debug!("closing websocket");
                    let _ = ws_tx.close().await;
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => handle.message(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => {
                    debug!(len = bytes.len(), "ignoring binary frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer closed websocket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    handle.error(TransportError::WebSocket(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }

    handle.closed();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TransportEvent;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn refused_connect_reports_error_then_closed() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/")).unwrap();
        let mut adapter = connect(&url);
        let mut events = adapter.take_events().unwrap();

        assert_matches!(
            events.recv().await,
            Some(TransportEvent::Error(TransportError::Connect { .. }))
        );
        assert_eq!(events.recv().await, Some(TransportEvent::Closed));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn drive_relays_text_both_ways() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Echo peer.
        drop(tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() {
                    ws.send(msg).await.unwrap();
                }
            }
        }));

        let url = Url::parse(&format!("ws://{addr}/")).unwrap();
        let mut adapter = connect(&url);
        let mut events = adapter.take_events().unwrap();

        assert_eq!(events.recv().await, Some(TransportEvent::Opened));
        adapter.send_text("hello".into()).unwrap();
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Message("hello".into()))
        );
        adapter.close();
        assert_eq!(events.recv().await, Some(TransportEvent::Closed));
    }
}
