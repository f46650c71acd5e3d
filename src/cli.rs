use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// nivo — neobank backend core: API gateway, double-entry ledger,
/// wallets, transaction orchestration, risk rules, and a simulated
/// notification fabric.
#[derive(Parser)]
#[command(name = "nivo", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct ServiceOpts {
    /// Port override (default: the service's well-known port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for per-service SQLite files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Public API gateway with the SSE event broker
    Gateway {
        #[command(flatten)]
        opts: ServiceOpts,
    },

    /// User registration, login, and token issuance
    Identity {
        #[command(flatten)]
        opts: ServiceOpts,
    },

    /// Chart of accounts and balanced journal entries
    Ledger {
        #[command(flatten)]
        opts: ServiceOpts,
    },

    /// Wallet lifecycle, limits, holds, and settlement
    Wallet {
        #[command(flatten)]
        opts: ServiceOpts,
    },

    /// Transaction orchestration: risk, settlement, ledger, events
    Transactions {
        #[command(flatten)]
        opts: ServiceOpts,
    },

    /// Risk rule evaluation and audit events
    Risk {
        #[command(flatten)]
        opts: ServiceOpts,
    },

    /// Notification queue with simulated delivery
    Notifications {
        #[command(flatten)]
        opts: ServiceOpts,
    },

    /// Run every service in one process (development)
    All {
        #[command(flatten)]
        opts: ServiceOpts,
    },
}
