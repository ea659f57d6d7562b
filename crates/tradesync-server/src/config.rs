//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tradesync_common::time::{
    BrokerClock, TimestampNormalizer, DEFAULT_BROKER_TIMEZONE, DEFAULT_SUMMER_OFFSET_HOURS,
    DEFAULT_TARGET_OFFSET_HOURS, DEFAULT_WINTER_OFFSET_HOURS,
};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default request body limit (16 MiB); history batches can be large.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/tradesync";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default directory for raw batch copies.
pub const DEFAULT_AUDIT_DIR: &str = "data";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub store: StoreBackend,
    pub audit: AuditConfig,
    pub time: TimeConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub max_body_bytes: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Which store backs the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid store backend: {}", s)),
        }
    }
}

/// Raw batch archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

/// DST rule used to read broker timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DstRule {
    #[default]
    LocalMonth,
    Zone,
}

impl std::str::FromStr for DstRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local-month" | "local_month" | "month" => Ok(DstRule::LocalMonth),
            "zone" | "tz" => Ok(DstRule::Zone),
            _ => Err(anyhow::anyhow!("Invalid broker DST rule: {}", s)),
        }
    }
}

/// Timestamp normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    pub dst_rule: DstRule,
    pub broker_timezone: String,
    pub summer_offset_hours: i32,
    pub winter_offset_hours: i32,
    pub target_offset_hours: i32,
}

impl TimeConfig {
    /// Build the normalizer this configuration describes
    pub fn normalizer(&self) -> anyhow::Result<TimestampNormalizer> {
        let clock = match self.dst_rule {
            DstRule::LocalMonth => {
                BrokerClock::local_month(self.summer_offset_hours, self.winter_offset_hours)?
            },
            DstRule::Zone => BrokerClock::zone(&self.broker_timezone)?,
        };
        Ok(TimestampNormalizer::new(clock, self.target_offset_hours)?)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let store = match std::env::var("TRADESYNC_STORE") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::default(),
        };

        let dst_rule = match std::env::var("BROKER_DST_RULE") {
            Ok(value) => value.parse()?,
            Err(_) => DstRule::default(),
        };

        let config = Config {
            server: ServerConfig {
                host: std::env::var("TRADESYNC_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("TRADESYNC_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "TRADESYNC_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
                max_body_bytes: env_or("TRADESYNC_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            store,
            audit: AuditConfig {
                enabled: env_or("AUDIT_ENABLED", true),
                dir: std::env::var("AUDIT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_AUDIT_DIR)),
            },
            time: TimeConfig {
                dst_rule,
                broker_timezone: std::env::var("BROKER_TIMEZONE")
                    .unwrap_or_else(|_| DEFAULT_BROKER_TIMEZONE.to_string()),
                summer_offset_hours: env_or(
                    "BROKER_SUMMER_OFFSET_HOURS",
                    DEFAULT_SUMMER_OFFSET_HOURS,
                ),
                winter_offset_hours: env_or(
                    "BROKER_WINTER_OFFSET_HOURS",
                    DEFAULT_WINTER_OFFSET_HOURS,
                ),
                target_offset_hours: env_or("TARGET_UTC_OFFSET_HOURS", DEFAULT_TARGET_OFFSET_HOURS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.server.max_body_bytes == 0 {
            anyhow::bail!("Request body limit must be greater than 0");
        }

        if self.store == StoreBackend::Postgres {
            if self.database.url.is_empty() {
                anyhow::bail!("Database URL cannot be empty");
            }

            if self.database.max_connections == 0 {
                anyhow::bail!("Database max_connections must be greater than 0");
            }

            if self.database.min_connections > self.database.max_connections {
                anyhow::bail!(
                    "Database min_connections ({}) cannot be greater than max_connections ({})",
                    self.database.min_connections,
                    self.database.max_connections
                );
            }
        }

        if self.audit.enabled && self.audit.dir.as_os_str().is_empty() {
            anyhow::bail!("Audit directory cannot be empty when auditing is enabled");
        }

        // Surfaces bad offsets or an unknown zone name at start-up.
        self.time.normalizer()?;

        if self.store == StoreBackend::Memory {
            tracing::warn!("In-memory store selected - ingested data is lost on restart");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            store: StoreBackend::default(),
            audit: AuditConfig {
                enabled: true,
                dir: PathBuf::from(DEFAULT_AUDIT_DIR),
            },
            time: TimeConfig {
                dst_rule: DstRule::default(),
                broker_timezone: DEFAULT_BROKER_TIMEZONE.to_string(),
                summer_offset_hours: DEFAULT_SUMMER_OFFSET_HOURS,
                winter_offset_hours: DEFAULT_WINTER_OFFSET_HOURS,
                target_offset_hours: DEFAULT_TARGET_OFFSET_HOURS,
            },
        }
    }
}
