//! `tandem call`: connect, send one call, print what comes back.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tandem_core::{Arguments, BoxError, CallError, EndpointState, RegistrationError};
use tandem_endpoint::{Delegate, DispatchTable, EndpointBuilder};
use tandem_settings::TandemSettings;
use tandem_wire::JsonSerializer;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Prints inbound calls to stdout.
struct Printer;

impl Delegate for Printer {
    fn on_error(&self, error: &CallError) {
        println!("! {error}");
    }
}

fn print_call(method: &str, args: Arguments<'_>) -> Result<(), BoxError> {
    let rendered: Vec<String> = (0..args.len())
        .filter_map(|i| args.raw(i))
        .map(Value::to_string)
        .collect();
    println!("< {method}({})", rendered.join(", "));
    Ok(())
}

/// Callbacks the echo host sends.
fn printer_table() -> Result<DispatchTable<Printer>, RegistrationError> {
    DispatchTable::builder("tandem.demo.EchoClient")
        .method("pong", 1, |_: &Printer, args| print_call("pong", args))
        .method("echoed", 1, |_: &Printer, args| print_call("echoed", args))
        .build()
}

/// Each argument is read as JSON; anything that does not parse is a string.
pub fn parse_args(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect()
}

/// Run one call against `url` (or the settings' endpoint knobs).
pub async fn run(
    settings: &TandemSettings,
    url: Option<String>,
    method: &str,
    args: Vec<Value>,
    wait: Duration,
) -> Result<()> {
    let table = Arc::new(printer_table()?);
    let mut builder = EndpointBuilder::from_settings(table, &settings.endpoint);
    if let Some(url) = url {
        let _ = builder.set_url(url);
    }
    let serializer = JsonSerializer::new().with_max_frame_bytes(settings.wire.max_frame_bytes);
    let _ = builder
        .set_delegate(Arc::new(Printer))
        .set_serializer(Arc::new(serializer));

    let target = builder.resolve_url()?;
    let endpoint = builder.start()?;
    let state = tokio::time::timeout(CONNECT_TIMEOUT, endpoint.wait_for_state(EndpointState::Open))
        .await
        .unwrap_or(EndpointState::Connecting);
    if state != EndpointState::Open {
        endpoint.close();
        bail!("could not connect to {target}");
    }

    println!("> {method}({})", render(&args));
    endpoint
        .send_message(method, args)
        .with_context(|| format!("failed to send {method}"))?;

    tokio::select! {
        () = tokio::time::sleep(wait) => debug!("wait elapsed"),
        () = endpoint.closed() => println!("! connection closed by peer"),
    }

    endpoint.close();
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, endpoint.closed()).await;
    Ok(())
}

fn render(args: &[Value]) -> String {
    args.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
}
