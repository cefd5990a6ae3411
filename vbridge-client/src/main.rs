//! VBridge client: entry point.
//!
//! ```text
//! vbridge-client                    Connect with defaults
//! vbridge-client --config <path>    Use custom config TOML
//! vbridge-client --connect <addr>   Server address (overrides config)
//! vbridge-client --frames <n>       Frames to decode (overrides config)
//! vbridge-client --gen-config       Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vbridge_client::config::ClientFileConfig;
use vbridge_client::connection::ServerConnection;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vbridge-client", about = "VBridge headless viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vbridge-client.toml")]
    config: PathBuf,

    /// Server address (overrides config). Example: 192.168.1.100:5000
    #[arg(long)]
    connect: Option<String>,

    /// Number of frames to decode before disconnecting.
    #[arg(short, long)]
    frames: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientFileConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientFileConfig::load(&cli.config);
    if let Some(addr) = cli.connect {
        config.network.server = addr;
    }
    if let Some(frames) = cli.frames {
        config.viewer.frames = frames;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vbridge-client v{}", env!("CARGO_PKG_VERSION"));

    if config.auth.name.is_empty() || config.auth.password.is_empty() {
        return Err("no credentials configured in [auth]".into());
    }

    let mut conn = ServerConnection::connect(&config).await?;
    let stats = conn.run(config.poll_interval()).await?;

    info!(
        frames = stats.frames,
        width = stats.width,
        height = stats.height,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "{:.1} frames/s",
        stats.fps()
    );

    Ok(())
}
