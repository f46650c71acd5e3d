use clap::Parser;

use nivo::cli::{Cli, Command, ServiceOpts};
use nivo::config::{Config, Service};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Command::Gateway { opts } => {
            rt.block_on(nivo::gateway::serve(config(Service::Gateway, &opts)?))
        }
        Command::Identity { opts } => {
            rt.block_on(nivo::identity::serve(config(Service::Identity, &opts)?))
        }
        Command::Ledger { opts } => {
            rt.block_on(nivo::ledger::serve(config(Service::Ledger, &opts)?))
        }
        Command::Wallet { opts } => {
            rt.block_on(nivo::wallet::serve(config(Service::Wallet, &opts)?))
        }
        Command::Transactions { opts } => rt.block_on(nivo::transaction::serve(config(
            Service::Transactions,
            &opts,
        )?)),
        Command::Risk { opts } => rt.block_on(nivo::risk::serve(config(Service::Risk, &opts)?)),
        Command::Notifications { opts } => rt.block_on(nivo::notification::serve(config(
            Service::Notifications,
            &opts,
        )?)),
        Command::All { opts } => rt.block_on(run_all(opts)),
    }
}

fn config(service: Service, opts: &ServiceOpts) -> anyhow::Result<Config> {
    let mut cfg = Config::from_env(service)?;
    if let Some(port) = opts.port {
        cfg.port = port;
    } else if let Some(port) = std::env::var("SERVICE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
    {
        cfg.port = port;
    }
    if let Some(dir) = &opts.data_dir {
        cfg.data_dir = dir.clone();
    }
    Ok(cfg)
}

/// Development runner: every service in one process, each on its
/// well-known port with its own database file.
async fn run_all(opts: ServiceOpts) -> anyhow::Result<()> {
    let mk = |service: Service| -> anyhow::Result<Config> {
        let mut cfg = Config::from_env(service)?;
        if let Some(dir) = &opts.data_dir {
            cfg.data_dir = dir.clone();
        }
        Ok(cfg)
    };

    tokio::try_join!(
        nivo::gateway::serve(mk(Service::Gateway)?),
        nivo::identity::serve(mk(Service::Identity)?),
        nivo::ledger::serve(mk(Service::Ledger)?),
        nivo::wallet::serve(mk(Service::Wallet)?),
        nivo::transaction::serve(mk(Service::Transactions)?),
        nivo::risk::serve(mk(Service::Risk)?),
        nivo::notification::serve(mk(Service::Notifications)?),
    )?;
    Ok(())
}
