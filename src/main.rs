//! ssr-host binary.
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!  Client Request  │  listener → request id / trace                   │
//!  ───────────────▶│     ├─ dev:  asset? → bridge → dev middleware    │
//!                  │     ├─ prod: ServeDir(dist/client)               │
//!                  │     └─ ssr_handler → render entry → HTML         │
//!                  │                                                  │
//!                  │  dev only: file watcher → HMR WebSocket          │
//!                  └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use ssr_host::config::{Cli, Mode};
use ssr_host::lifecycle::{signals, startup, Shutdown};
use ssr_host::net::bind_first_free;
use ssr_host::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(config.effective_log_level());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?config.mode,
        root = ?config.root,
        "ssr-host starting"
    );

    if config.mode == Mode::Test {
        tracing::info!("Test mode, not listening");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to install metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let app = startup::build(&config, &shutdown).await?;

    let listener = bind_first_free(&config.listener).await?;
    let port = listener.local_addr()?.port();
    println!("Client Server: http://localhost:{port}");

    tokio::spawn(signals::shutdown_signal(shutdown.clone()));

    app.server.run(listener, shutdown.subscribe()).await?;

    if let Some(hmr) = app.hmr {
        shutdown.trigger();
        match hmr.task.await {
            Ok(Err(e)) => tracing::warn!(error = %e, "HMR socket ended with error"),
            Err(e) => tracing::warn!(error = %e, "HMR task failed"),
            Ok(Ok(())) => {}
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
