//! Configuration module
//!
//! Environment-driven settings for the upload worker: database, logging, the claim
//! queue and the local storage transfer.

use std::env;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Output format of the tracing subscriber
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Settings shared by every foodshare process
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub log_format: LogFormat,
}

/// Upload worker configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub base: BaseConfig,
    pub database_url: String,
    /// Apply pending migrations on startup.
    pub run_migrations: bool,
    // Claim queue
    pub upload_max_workers: usize,
    pub upload_poll_interval_ms: u64,
    pub upload_transfer_timeout_secs: u64,
    /// Age after which a claim is considered abandoned.
    pub upload_lease_secs: u64,
    /// Interval between reconciliation sweeps. 0 = disabled.
    pub upload_lease_reap_interval_secs: u64,
    // Local transfer
    pub staging_path: String,
    pub storage_path: String,
    pub storage_base_url: String,
}

/// Application configuration (upload worker).
#[derive(Clone, Debug)]
pub struct Config(pub Box<WorkerConfig>);

impl Config {
    fn as_worker(&self) -> &WorkerConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.as_worker().base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn environment(&self) -> &str {
        &self.as_worker().base.environment
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = WorkerConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_worker().validate()
    }

    pub fn database_url(&self) -> &str {
        &self.as_worker().database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_worker().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_worker().base.db_timeout_seconds
    }

    pub fn log_format(&self) -> LogFormat {
        self.as_worker().base.log_format
    }

    pub fn run_migrations(&self) -> bool {
        self.as_worker().run_migrations
    }

    pub fn upload_max_workers(&self) -> usize {
        self.as_worker().upload_max_workers
    }

    pub fn upload_poll_interval_ms(&self) -> u64 {
        self.as_worker().upload_poll_interval_ms
    }

    pub fn upload_transfer_timeout_secs(&self) -> u64 {
        self.as_worker().upload_transfer_timeout_secs
    }

    pub fn upload_lease_secs(&self) -> u64 {
        self.as_worker().upload_lease_secs
    }

    pub fn upload_lease_reap_interval_secs(&self) -> u64 {
        self.as_worker().upload_lease_reap_interval_secs
    }

    pub fn staging_path(&self) -> &str {
        &self.as_worker().staging_path
    }

    pub fn storage_path(&self) -> &str {
        &self.as_worker().storage_path
    }

    pub fn storage_base_url(&self) -> &str {
        &self.as_worker().storage_base_url
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const UPLOAD_MAX_WORKERS: usize = 4;
        const UPLOAD_POLL_INTERVAL_MS: u64 = 1000;
        const UPLOAD_TRANSFER_TIMEOUT_SECS: u64 = 300;
        const UPLOAD_LEASE_SECS: u64 = 900;
        const UPLOAD_LEASE_REAP_INTERVAL_SECS: u64 = 60;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let base = BaseConfig {
            environment,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse()?,
        };

        let config = WorkerConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            run_migrations: env::var("RUN_MIGRATIONS")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(true),
            upload_max_workers: env::var("UPLOAD_MAX_WORKERS")
                .unwrap_or_else(|_| UPLOAD_MAX_WORKERS.to_string())
                .parse()
                .unwrap_or(UPLOAD_MAX_WORKERS),
            upload_poll_interval_ms: env::var("UPLOAD_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| UPLOAD_POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(UPLOAD_POLL_INTERVAL_MS),
            upload_transfer_timeout_secs: env::var("UPLOAD_TRANSFER_TIMEOUT_SECS")
                .unwrap_or_else(|_| UPLOAD_TRANSFER_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(UPLOAD_TRANSFER_TIMEOUT_SECS),
            upload_lease_secs: env::var("UPLOAD_LEASE_SECS")
                .unwrap_or_else(|_| UPLOAD_LEASE_SECS.to_string())
                .parse()
                .unwrap_or(UPLOAD_LEASE_SECS),
            upload_lease_reap_interval_secs: env::var("UPLOAD_LEASE_REAP_INTERVAL_SECS")
                .unwrap_or_else(|_| UPLOAD_LEASE_REAP_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(UPLOAD_LEASE_REAP_INTERVAL_SECS),
            staging_path: env::var("STAGING_PATH").unwrap_or_else(|_| "./staging".to_string()),
            storage_path: env::var("STORAGE_PATH").unwrap_or_else(|_| "./storage".to_string()),
            storage_base_url: env::var("STORAGE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/files".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.database_url.starts_with("postgresql://")
            || self.database_url.starts_with("postgres://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.upload_max_workers == 0 {
            return Err(anyhow::anyhow!("UPLOAD_MAX_WORKERS must be at least 1"));
        }

        if self.upload_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("UPLOAD_POLL_INTERVAL_MS must be positive"));
        }

        // A lease shorter than a transfer would let the sweep reclaim live work.
        if self.upload_lease_secs <= self.upload_transfer_timeout_secs {
            return Err(anyhow::anyhow!(
                "UPLOAD_LEASE_SECS ({}) must be greater than UPLOAD_TRANSFER_TIMEOUT_SECS ({})",
                self.upload_lease_secs,
                self.upload_transfer_timeout_secs
            ));
        }

        if self.storage_base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("STORAGE_BASE_URL must not be empty"));
        }

        Ok(())
    }
}
