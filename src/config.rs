use std::path::PathBuf;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Gateway,
    Identity,
    Ledger,
    Wallet,
    Transactions,
    Risk,
    Notifications,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Gateway => "gateway",
            Service::Identity => "identity",
            Service::Ledger => "ledger",
            Service::Wallet => "wallet",
            Service::Transactions => "transactions",
            Service::Risk => "risk",
            Service::Notifications => "notifications",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Service::Gateway => 8080,
            Service::Identity => 8081,
            Service::Ledger => 8082,
            Service::Wallet => 8083,
            Service::Transactions => 8084,
            Service::Risk => 8085,
            Service::Notifications => 8086,
        }
    }
}

/// Notification delivery simulator knobs (`SIM_*` environment variables).
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub demo: bool,
    pub delivery_delay_ms: u64,
    pub final_delay_ms: u64,
    pub failure_rate_percent: u32,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl SimConfig {
    pub fn from_env() -> Self {
        let demo = env_or("SIM_MODE", "realistic") == "demo";
        let mut sim = SimConfig {
            demo,
            delivery_delay_ms: env_parse("SIM_DELIVERY_DELAY_MS", 500),
            final_delay_ms: env_parse("SIM_FINAL_DELAY_MS", 1000),
            failure_rate_percent: env_parse("SIM_FAILURE_RATE_PERCENT", 10),
            max_retry_attempts: env_parse("SIM_MAX_RETRY_ATTEMPTS", 3),
            retry_delay_ms: env_parse("SIM_RETRY_DELAY_MS", 2000),
        };
        if demo {
            sim.failure_rate_percent = 0;
            sim.delivery_delay_ms = sim.delivery_delay_ms.min(50);
            sim.final_delay_ms = sim.final_delay_ms.min(100);
        }
        sim
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: Service,
    pub port: u16,
    pub data_dir: PathBuf,
    /// `DATABASE_URL` override; otherwise `<data_dir>/nivo-<service>.db`.
    pub database_url: Option<PathBuf>,
    pub jwt_secret: String,
    /// Shared token for service-to-service endpoints (broadcast ingress).
    pub internal_token: String,
    pub gateway_url: String,
    pub identity_url: String,
    pub ledger_url: String,
    pub wallet_url: String,
    pub transaction_url: String,
    pub risk_url: String,
    pub notification_url: String,
    /// When true, an unreachable risk service fails the transaction
    /// instead of letting it proceed.
    pub risk_fail_closed: bool,
    pub sim: SimConfig,
}

impl Config {
    pub fn from_env(service: Service) -> Result<Self> {
        let jwt_secret =
            std::env::var("JWT_SECRET").context("JWT_SECRET must be set (fatal at startup)")?;
        let internal_token = env_or("INTERNAL_TOKEN", &jwt_secret);

        Ok(Config {
            service,
            port: service.default_port(),
            data_dir: PathBuf::from(env_or("NIVO_DATA_DIR", "./data")),
            database_url: std::env::var("DATABASE_URL").ok().map(PathBuf::from),
            jwt_secret,
            internal_token,
            gateway_url: env_or("GATEWAY_URL", "http://127.0.0.1:8080"),
            identity_url: env_or("IDENTITY_SERVICE_URL", "http://127.0.0.1:8081"),
            ledger_url: env_or("LEDGER_SERVICE_URL", "http://127.0.0.1:8082"),
            wallet_url: env_or("WALLET_SERVICE_URL", "http://127.0.0.1:8083"),
            transaction_url: env_or("TRANSACTION_SERVICE_URL", "http://127.0.0.1:8084"),
            risk_url: env_or("RISK_SERVICE_URL", "http://127.0.0.1:8085"),
            notification_url: env_or("NOTIFICATION_SERVICE_URL", "http://127.0.0.1:8086"),
            risk_fail_closed: env_parse("RISK_FAIL_CLOSED", false),
            sim: SimConfig::from_env(),
        })
    }

    /// Path of this service's database file.
    pub fn database_path(&self) -> PathBuf {
        self.database_url.clone().unwrap_or_else(|| {
            self.data_dir
                .join(format!("nivo-{}.db", self.service.name()))
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
