//! Endpoint construction and URL resolution.
//!
//! Resolution order for the connection URL:
//! 1. an explicit URL wins outright
//! 2. otherwise it is assembled from protocol, host, port and path, where
//!    each unset part falls back to the [`ConnectionContext`] (or, for the
//!    path, to the dispatch table's default path and then `/`)

use std::fmt;
use std::sync::Arc;

use tandem_settings::EndpointSettings;
use tandem_wire::{JsonSerializer, Serializer};
use tracing::{debug, info};
use url::Url;

use crate::connection::{ConnectionAdapter, websocket};
use crate::delegate::{ConnectionErrorHandler, Delegate};
use crate::dispatch::DispatchTable;
use crate::runtime::Endpoint;

/// Errors from resolving an endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuilderError {
    /// The URL (explicit or assembled) did not parse.
    #[error("invalid endpoint url {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// Protocol other than `ws` or `wss`.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// A connection context location that is not an absolute
    /// `http`/`https`/`ws`/`wss` URL with a host.
    #[error("invalid location: {0}")]
    InvalidLocation(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionContext
// ─────────────────────────────────────────────────────────────────────────────

/// Where defaults for host, port and scheme come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionContext {
    host: String,
    port: Option<u16>,
    secure: bool,
}

impl ConnectionContext {
    /// Explicit context.
    pub fn new(host: impl Into<String>, port: Option<u16>, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// Context taken from a location URL such as `https://example.com:8443/app`.
    ///
    /// `https` and `wss` locations are secure. A port equal to the scheme's
    /// default is treated as unset.
    pub fn from_location(location: &str) -> Result<Self, BuilderError> {
        let url =
            Url::parse(location).map_err(|_| BuilderError::InvalidLocation(location.to_owned()))?;
        let secure = match url.scheme() {
            "http" | "ws" => false,
            "https" | "wss" => true,
            _ => return Err(BuilderError::InvalidLocation(location.to_owned())),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BuilderError::InvalidLocation(location.to_owned()))?;
        Ok(Self::new(host, url.port(), secure))
    }

    /// Host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, if not the scheme default.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Whether the context is served over TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new("localhost", None, false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EndpointBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Configures and starts endpoints for one interface.
///
/// Every [`start`](Self::start) produces an independent runtime over a
/// fresh connection.
pub struct EndpointBuilder<D: Delegate> {
    table: Arc<DispatchTable<D>>,
    context: ConnectionContext,
    url: Option<String>,
    path: Option<String>,
    port: Option<u16>,
    hostname: Option<String>,
    protocol: Option<String>,
    delegate: Option<Arc<D>>,
    error_handler: Option<Arc<dyn ConnectionErrorHandler>>,
    serializer: Arc<dyn Serializer>,
}

impl<D: Delegate> EndpointBuilder<D> {
    /// Builder with the default context (`localhost`, insecure).
    pub fn new(table: Arc<DispatchTable<D>>) -> Self {
        Self::with_context(table, ConnectionContext::default())
    }

    /// Builder with an explicit context.
    pub fn with_context(table: Arc<DispatchTable<D>>, context: ConnectionContext) -> Self {
        Self {
            table,
            context,
            url: None,
            path: None,
            port: None,
            hostname: None,
            protocol: None,
            delegate: None,
            error_handler: None,
            serializer: Arc::new(JsonSerializer::new()),
        }
    }

    /// Builder seeded from endpoint settings.
    pub fn from_settings(table: Arc<DispatchTable<D>>, settings: &EndpointSettings) -> Self {
        let mut builder = Self::new(table);
        builder.url.clone_from(&settings.url);
        builder.protocol.clone_from(&settings.protocol);
        builder.hostname.clone_from(&settings.hostname);
        builder.port = settings.port;
        builder.path.clone_from(&settings.path);
        builder
    }

    /// Full URL; overrides every other address knob.
    pub fn set_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.url = Some(url.into());
        self
    }

    /// Request path.
    pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.path = Some(path.into());
        self
    }

    /// Port.
    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = Some(port);
        self
    }

    /// Host name.
    pub fn set_hostname(&mut self, hostname: impl Into<String>) -> &mut Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// `ws` or `wss`; `ws:` and `wss://` forms are accepted.
    pub fn set_protocol(&mut self, protocol: impl Into<String>) -> &mut Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Delegate attached to every endpoint this builder starts.
    pub fn set_delegate(&mut self, delegate: Arc<D>) -> &mut Self {
        self.delegate = Some(delegate);
        self
    }

    /// Receiver for connection-scoped errors.
    pub fn set_error_handler(&mut self, handler: Arc<dyn ConnectionErrorHandler>) -> &mut Self {
        self.error_handler = Some(handler);
        self
    }

    /// Stream codec. Must match the peer's.
    pub fn set_serializer(&mut self, serializer: Arc<dyn Serializer>) -> &mut Self {
        self.serializer = serializer;
        self
    }

    /// The connection context defaults come from.
    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Resolve the URL the next [`start`](Self::start) will connect to.
    pub fn resolve_url(&self) -> Result<Url, BuilderError> {
        if let Some(url) = &self.url {
            let parsed = parse_url(url)?;
            check_scheme(parsed.scheme())?;
            return Ok(parsed);
        }

        let scheme = match &self.protocol {
            Some(protocol) => normalize_protocol(protocol)?,
            None if self.context.secure => "wss",
            None => "ws",
        };
        let host = url_host(self.hostname.as_deref().unwrap_or(&self.context.host));
        let port = self.port.or(self.context.port);
        let path = self
            .path
            .as_deref()
            .or_else(|| self.table.default_path())
            .unwrap_or("/");

        let text = match port {
            Some(port) => format!("{scheme}://{host}:{port}{}", with_leading_slash(path)),
            None => format!("{scheme}://{host}{}", with_leading_slash(path)),
        };
        parse_url(&text)
    }

    /// Connect over WebSocket and start a new endpoint.
    pub fn start(&self) -> Result<Endpoint<D>, BuilderError> {
        let url = self.resolve_url()?;
        info!(interface = self.table.interface(), %url, "starting endpoint");
        Ok(self.start_with(websocket::connect(&url)))
    }

    /// Start a new endpoint over a caller-supplied connection.
    pub fn start_with(&self, connection: ConnectionAdapter) -> Endpoint<D> {
        let endpoint = Endpoint::with_options(
            connection,
            Arc::clone(&self.table),
            Arc::clone(&self.serializer),
            self.error_handler.clone(),
        );
        if let Some(delegate) = &self.delegate {
            let _ = endpoint.set_delegate(Arc::clone(delegate));
        }
        endpoint.start();
        debug!(interface = self.table.interface(), "endpoint started");
        endpoint
    }
}

impl<D: Delegate> fmt::Debug for EndpointBuilder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointBuilder")
            .field("interface", &self.table.interface())
            .field("context", &self.context)
            .field("url", &self.url)
            .field("protocol", &self.protocol)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("has_delegate", &self.delegate.is_some())
            .finish_non_exhaustive()
    }
}

fn parse_url(text: &str) -> Result<Url, BuilderError> {
    Url::parse(text).map_err(|e| BuilderError::InvalidUrl {
        url: text.to_owned(),
        reason: e.to_string(),
    })
}

fn check_scheme(scheme: &str) -> Result<(), BuilderError> {
    match scheme {
        "ws" | "wss" => Ok(()),
        other => Err(BuilderError::UnsupportedProtocol(other.to_owned())),
    }
}

/// `"WSS://"`, `"wss:"` and `" wss "` all become `"wss"`.
fn normalize_protocol(protocol: &str) -> Result<&'static str, BuilderError> {
    let trimmed = protocol.trim();
    let bare = trimmed
        .strip_suffix("://")
        .or_else(|| trimmed.strip_suffix(':'))
        .unwrap_or(trimmed);
    match bare.to_ascii_lowercase().as_str() {
        "ws" => Ok("ws"),
        "wss" => Ok("wss"),
        _ => Err(BuilderError::UnsupportedProtocol(protocol.to_owned())),
    }
}

/// IPv6 literals need brackets inside a URL authority.
fn url_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    }
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
