//! Serve command handler

use anyhow::{Context, Result};

use worklog_core::{Config, Store};

use crate::output::Output;
use crate::server;

/// Run the board server until interrupted
pub async fn run(config: Config, bind: Option<String>, output: &Output) -> Result<()> {
    let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
    let store = Store::open_with_config(config.clone()).context("Failed to open item store")?;

    output.message(&format!(
        "Serving {} on http://{} (Ctrl-C to stop)",
        config.sqlite_path().display(),
        bind_addr
    ));
    server::serve(store, &config, &bind_addr).await
}
