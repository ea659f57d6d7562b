//! Tracing setup shared by the TradeSync binaries
//!
//! Events go to stdout, to a daily-rolled file under `log_dir`, or to both,
//! rendered as text or as JSON lines. Everything can be overridden through
//! `LOG_*` environment variables at start-up.
//!
//! Prefer structured fields over interpolated messages:
//!
//! ```rust,ignore
//! info!(kind = %kind, records = batch.len(), "Batch committed");
//! warn!(error = %err, "Audit copy not written");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tradesync_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("up");
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            other => return Err(anyhow!("unknown log level '{other}'")),
        })
    }
}

/// Where events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn to_stdout(self) -> bool {
        self != LogOutput::File
    }

    fn to_file(self) -> bool {
        self != LogOutput::Console
    }
}

impl FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "console" | "stdout" => Self::Console,
            "file" => Self::File,
            "both" | "all" => Self::Both,
            other => return Err(anyhow!("unknown log output '{other}'")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Self::Text,
            "json" => Self::Json,
            other => return Err(anyhow!("unknown log format '{other}'")),
        })
    }
}

/// Logging settings, usually built in `main` and then overlaid with
/// [`LogConfig::merge_env`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,
    pub log_dir: PathBuf,
    /// Rolled files are named `<prefix>.<date>`
    pub log_file_prefix: String,
    /// Comma separated `target=level` pairs, e.g. `sqlx=warn,tower_http=debug`
    pub filter_directives: Option<String>,
    pub include_location: bool,
    pub include_thread_ids: bool,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            output: LogOutput::default(),
            format: LogFormat::default(),
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "tradesync".into(),
            filter_directives: None,
            include_location: false,
            include_thread_ids: false,
            include_targets: true,
        }
    }
}

/// Overwrite `slot` when `key` is set; a malformed value is an error
fn env_override<T>(key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        *slot = raw.parse().map_err(|e| anyhow!("{key}={raw}: {e}"))?;
    }
    Ok(())
}

impl LogConfig {
    /// Defaults overlaid with the environment, see [`LogConfig::merge_env`]
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Apply `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`,
    /// `LOG_FILE_PREFIX`, `LOG_FILTER` and the `LOG_INCLUDE_*` switches on top
    /// of `self`
    pub fn merge_env(mut self) -> Result<Self> {
        env_override("LOG_LEVEL", &mut self.level)?;
        env_override("LOG_OUTPUT", &mut self.output)?;
        env_override("LOG_FORMAT", &mut self.format)?;
        env_override("LOG_DIR", &mut self.log_dir)?;
        env_override("LOG_FILE_PREFIX", &mut self.log_file_prefix)?;
        env_override("LOG_INCLUDE_LOCATION", &mut self.include_location)?;
        env_override("LOG_INCLUDE_THREAD_IDS", &mut self.include_thread_ids)?;
        env_override("LOG_INCLUDE_TARGETS", &mut self.include_targets)?;
        if let Ok(filter) = std::env::var("LOG_FILTER") {
            self.filter_directives = Some(filter);
        }
        Ok(self)
    }

    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder(Self::default())
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let base = EnvFilter::from_default_env().add_directive(Level::from(self.level).into());

        self.filter_directives
            .iter()
            .flat_map(|d| d.split(','))
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .try_fold(base, |filter, directive| -> Result<EnvFilter> {
                let parsed: Directive = directive
                    .parse()
                    .with_context(|| format!("bad filter directive '{directive}'"))?;
                Ok(filter.add_directive(parsed))
            })
    }
}

pub struct LogConfigBuilder(LogConfig);

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.0.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.0.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.0.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.0.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.0.log_file_prefix = prefix.into();
        self
    }

    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.0.filter_directives = Some(directives.into());
        self
    }

    pub fn build(self) -> LogConfig {
        self.0
    }
}

/// Flushes the file writer on drop; hold it for the life of the process.
#[must_use = "dropping the guard stops the file writer"]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let filter = config.env_filter()?;

    let stdout_layer = config
        .output
        .to_stdout()
        .then(|| fmt_layer(config, std::io::stdout, true));

    let mut file_writer = None;
    let file_layer = if config.output.to_file() {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("cannot create {}", config.log_dir.display()))?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_writer = Some(guard);
        Some(fmt_layer(config, writer, false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LoggingGuard {
        _file_writer: file_writer,
    })
}

fn fmt_layer<S, W>(config: &LogConfig, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(FmtSpan::CLOSE);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}
