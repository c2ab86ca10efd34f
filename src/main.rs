mod config_store;
mod endpoint;
mod firewall_backend;
mod program_config;
mod reconciler;
mod resolver;
mod sync_daemon;

use crate::config_store::ConfigStore;
use crate::firewall_backend::noop::NoopFirewallBackend;
use crate::firewall_backend::ufw::UfwFirewallBackend;
use crate::firewall_backend::FirewallBackend;
use crate::program_config::{FirewallKind, ProgramConfig};
use crate::reconciler::Reconciler;
use crate::resolver::SystemResolver;
use crate::sync_daemon::SyncDaemon;
use anyhow::Context;
use env_logger::Env;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};

const STATE_DIR_NAME: &str = ".ddns-allowlist";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse options
    let config = ProgramConfig::parse();

    // Set up logging
    env_logger::Builder::from_env(Env::default().default_filter_or(if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_module_path(false)
    .init();

    run(config).await
}

async fn run(config: ProgramConfig) -> anyhow::Result<()> {
    let state_dir = state_dir()?;

    let config_store = ConfigStore::open(&state_dir)
        .with_context(|| format!("Failed to open state directory '{}'", state_dir.display()))?;
    config_store
        .ensure_default()
        .context("Failed to write starter configuration")?;

    let firewall_backend: Box<dyn FirewallBackend> = match config.firewall.backend {
        FirewallKind::none => Box::new(NoopFirewallBackend::new()),
        FirewallKind::ufw => Box::new(
            UfwFirewallBackend::new(config.firewall.service_port)
                .context("Failed to initialize ufw firewall backend")?,
        ),
    };

    let daemon = SyncDaemon::new(
        config_store,
        Reconciler::new(Box::new(SystemResolver::new()), firewall_backend),
    );

    let mut sigint = signal(SignalKind::interrupt()).unwrap();
    let mut sigterm = signal(SignalKind::terminate()).unwrap();
    let mut sigquit = signal(SignalKind::quit()).unwrap();

    log::info!("Daemon started!");

    // Run until a fatal error is encountered or one of the specified signals are received
    (tokio::select! {
        r = daemon.run() => r,
        _ = sigint.recv() => Ok(()),
        _ = sigterm.recv() => Ok(()),
        _ = sigquit.recv() => Ok(()),
    })?;

    log::info!("Daemon stopped.");

    Ok(())
}

/// The state directory is fixed by convention: a dot-directory in the home
/// directory of the user running the daemon.
fn state_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set, cannot locate state directory")?;
    Ok(PathBuf::from(home).join(STATE_DIR_NAME))
}
