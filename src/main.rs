mod domain;
mod error;
mod clients;
mod messages;

mod app_system;
mod actor_framework;
mod backend;
mod notifications;
mod realtime;
mod router;
mod session_store;
mod shell;
mod toast;
mod views;

#[cfg(test)]
mod mock_framework;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use crate::app_system::{setup_tracing, BackendKind, Config, OrderDeskSystem};
use crate::notifications::ConsoleNotifier;
use crate::router::Route;
use crate::shell::Shell;

/// Staff console for the grocery order desk.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Extra configuration file layered over order-desk.toml
    #[arg(long)]
    config: Option<String>,

    /// Override the configured backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Route to open first
    #[arg(long, default_value = "/")]
    start: String,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(kind) = cli.backend {
        config.backend.kind = kind;
    }

    info!(backend = ?config.backend.kind, start = %cli.start, "Starting order desk");

    let system = OrderDeskSystem::start(&config, Route::parse(&cli.start)).await?;

    let notifier = config.notifications.enabled.then(|| {
        Arc::new(ConsoleNotifier::new(
            config.notifications.permission,
            config.notifications.prompt_answer,
        ))
    });

    println!("{}", shell::HELP);
    let shell = Shell::new(system.ctx.clone(), notifier, config.notifications.icon.clone());
    let result = shell.run().await;
    if let Err(e) = &result {
        error!(error = %e, "Console failed");
    }

    system.shutdown().await?;
    info!("Order desk stopped");
    result
}
