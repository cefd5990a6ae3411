//! VBridge server: entry point.
//!
//! ```text
//! vbridge-server                  Serve with vbridge-server.toml or defaults
//! vbridge-server --config <path>  Load a custom config TOML
//! vbridge-server --listen <addr>  Override the listen address
//! vbridge-server --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vbridge_server::config::ServerFileConfig;
use vbridge_server::service::VbridgeService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vbridge-server", about = "VBridge remote-desktop server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vbridge-server.toml")]
    config: PathBuf,

    /// Address to listen on, overriding the configuration.
    #[arg(short, long)]
    listen: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerFileConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerFileConfig::load(&cli.config);
    if let Some(listen) = cli.listen {
        config.network.listen = listen;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vbridge-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "quality {}..{}, grab every {} ms, {} users",
        config.capture.quality_min,
        config.capture.quality_max,
        config.capture.grab_interval_ms,
        config.auth.users.len()
    );

    let service = VbridgeService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
