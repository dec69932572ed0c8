mod cli;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use homesentry_core::{EmailTransport, Engine, EngineTransports, PushTransport};

use crate::cli::{Cli, Command};
use crate::transport::{HttpPushTransport, NftSetBackend, SmtpEmailTransport};

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = homesentry_config::load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Command::CheckConfig) => {
            // engine_config() runs the same validation the daemon does
            let engine_config = config.engine_config()?;
            println!(
                "config ok: {} admin(s), email {}, push {}",
                engine_config.admins.len(),
                if config.email.usable() { "on" } else { "off" },
                if config.push.enabled { "on" } else { "off" },
            );
            Ok(())
        }
        Some(Command::Run) | None => serve(config).await,
    }
}

async fn serve(config: homesentry_config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine_config = config.engine_config()?;

    let push: Option<Arc<dyn PushTransport>> = if config.push.enabled {
        let transport = HttpPushTransport::new(Duration::from_secs(config.push.timeout_secs))?;
        Some(Arc::new(transport))
    } else {
        None
    };

    let email: Option<Arc<dyn EmailTransport>> = SmtpEmailTransport::from_settings(&config.email)?
        .map(|transport| Arc::new(transport) as Arc<dyn EmailTransport>);

    let transports = EngineTransports {
        firewall: Arc::new(NftSetBackend::new()),
        push,
        email,
    };

    let engine = Engine::new(engine_config, transports);
    engine.start().await;
    tracing::info!("homesentry running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    engine.shutdown().await;

    Ok(())
}
