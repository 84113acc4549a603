//! The demo interface served by `tandem serve`.
//!
//! - `ping(n)` calls back `pong(n)`
//! - `echo(text)` calls back `echoed(text)`

use std::sync::Arc;

use tandem_core::{CallError, RegistrationError};
use tandem_endpoint::{Caller, Delegate, DispatchTable};
use tracing::{info, warn};

/// Interface name announced by the echo host.
pub const ECHO_INTERFACE: &str = "tandem.demo.Echo";

/// Per-connection echo delegate.
pub struct Echo {
    caller: Caller,
}

impl Echo {
    /// Delegate answering through `caller`.
    pub fn new(caller: Caller) -> Arc<Self> {
        Arc::new(Self { caller })
    }
}

impl Delegate for Echo {
    fn on_open(&self) {
        info!("echo peer connected");
    }

    fn on_close(&self) {
        info!("echo peer disconnected");
    }

    fn on_error(&self, error: &CallError) {
        warn!(method = error.method(), kind = error.kind(), %error, "echo call failed");
    }
}

/// Dispatch table for [`Echo`].
pub fn echo_table() -> Result<DispatchTable<Echo>, RegistrationError> {
    DispatchTable::builder(ECHO_INTERFACE)
        .method1("ping", |echo: &Echo, n: i64| {
            echo.caller.call("pong", &(n,))?;
            Ok(())
        })
        .method1("echo", |echo: &Echo, text: String| {
            echo.caller.call("echoed", &(text,))?;
            Ok(())
        })
        .default_path("/tandem")
        .build()
}
