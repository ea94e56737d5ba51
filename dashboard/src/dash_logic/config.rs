use clap::Args;
use lib_opsdash::core::SafeModeTimings;
use lib_opsdash::ingestors::ReconnectPolicy;
use lib_opsdash::{ConfigError, DashboardSettings, Endpoints};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config-path` is not given. Missing is fine.
const DEFAULT_CONFIG_FILE: &str = "opsdash.conf";

#[derive(Args, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "OPSDASH_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "OPSDASH_ORIGIN", help = "Origin the dashboard is served from, e.g. http://10.0.0.5:3001.")]
    pub origin: Option<String>,

    #[clap(long, env = "OPSDASH_API_BASE", help = "Base URL of the REST API. Empty means the origin.")]
    pub api_base: Option<String>,

    #[clap(long, env = "OPSDASH_WS_URL", help = "Realtime channel URL. Empty means <ws|wss>://<origin host>/ws.")]
    pub ws_url: Option<String>,

    #[clap(long, env = "OPSDASH_HISTORY_DAYS", help = "Days of history to request.")]
    pub history_days: Option<u32>,

    #[clap(long, env = "OPSDASH_HTTP_TIMEOUT_SECONDS", help = "Per-request HTTP timeout in seconds.")]
    pub http_timeout_seconds: Option<u64>,

    #[clap(long, env = "OPSDASH_HTTP_RETRIES", help = "Transient retries for polled requests. Actions never retry.")]
    pub http_retries: Option<u32>,

    #[clap(long, env = "OPSDASH_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for realtime reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "OPSDASH_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds between reconnect attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "OPSDASH_RECONNECT_MAX_ATTEMPTS", help = "Reconnect attempts before the realtime channel gives up.")]
    pub reconnect_max_attempts: Option<u32>,

    #[clap(long, env = "OPSDASH_BUFFER_CAPACITY", help = "Points kept in the rolling metrics buffer.")]
    pub buffer_capacity: Option<usize>,

    #[clap(long, env = "OPSDASH_READINESS_INTERVAL_MS", help = "Interval in milliseconds between safe-mode readiness checks.")]
    pub readiness_interval_ms: Option<u64>,

    #[clap(long, env = "OPSDASH_SERVICE_TIMEOUT_SECONDS", help = "Seconds a restarted service has to report running.")]
    pub service_timeout_seconds: Option<u64>,

    #[clap(long, env = "OPSDASH_CONTAINER_TIMEOUT_SECONDS", help = "Seconds a restarted container has to report running.")]
    pub container_timeout_seconds: Option<u64>,

    #[clap(long, env = "OPSDASH_SUMMARY_INTERVAL_SECONDS", help = "Seconds between summary lines of the headless dashboard.")]
    pub summary_interval_seconds: Option<u64>,

    #[clap(long, env = "OPSDASH_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "OPSDASH_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl Config {
    /// Built-in defaults, the bottom layer of every merge.
    pub fn defaults() -> Config {
        let reconnect = ReconnectPolicy::default();
        let timings = SafeModeTimings::default();
        Config {
            origin: Some(lib_opsdash::configs::config_dashboard::DEFAULT_ORIGIN.to_string()),
            api_base: Some(String::new()),
            ws_url: Some(String::new()),
            history_days: Some(1),
            http_timeout_seconds: Some(10),
            http_retries: Some(1),
            reconnect_base_delay_ms: Some(reconnect.base_delay.as_millis() as u64),
            reconnect_max_delay_ms: Some(reconnect.max_delay.as_millis() as u64),
            reconnect_max_attempts: Some(reconnect.max_attempts),
            buffer_capacity: Some(lib_opsdash::configs::config_dashboard::DEFAULT_BUFFER_CAPACITY),
            readiness_interval_ms: Some(timings.readiness_interval.as_millis() as u64),
            service_timeout_seconds: Some(timings.service_timeout.as_secs()),
            container_timeout_seconds: Some(timings.container_timeout.as_secs()),
            summary_interval_seconds: Some(15),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    // Merge two Config structs, where 'other' overrides 'self' for Some values
    pub fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            origin: other.origin.or(self.origin),
            api_base: other.api_base.or(self.api_base),
            ws_url: other.ws_url.or(self.ws_url),
            history_days: other.history_days.or(self.history_days),
            http_timeout_seconds: other.http_timeout_seconds.or(self.http_timeout_seconds),
            http_retries: other.http_retries.or(self.http_retries),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            reconnect_max_attempts: other.reconnect_max_attempts.or(self.reconnect_max_attempts),
            buffer_capacity: other.buffer_capacity.or(self.buffer_capacity),
            readiness_interval_ms: other.readiness_interval_ms.or(self.readiness_interval_ms),
            service_timeout_seconds: other.service_timeout_seconds.or(self.service_timeout_seconds),
            container_timeout_seconds: other.container_timeout_seconds.or(self.container_timeout_seconds),
            summary_interval_seconds: other.summary_interval_seconds.or(self.summary_interval_seconds),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// # Load
    ///
    /// Layers defaults < config file < environment/CLI. `cli` is the parsed
    /// command line (clap has already folded the environment into it).
    ///
    /// A missing default config file is skipped; an explicitly named one that
    /// cannot be read, or any file that does not parse, is an error.
    pub fn load(cli: Config) -> Result<Config, ConfigError> {
        let mut current = Config::defaults();

        let explicit = cli.config_path.is_some();
        let path = cli
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if explicit || path.exists() {
            current = current.merge(read_file(&path)?);
        }

        Ok(current.merge(cli))
    }

    /// Resolves the library settings. Fails on unusable endpoint URLs.
    pub fn resolve(&self) -> Result<DashboardSettings, ConfigError> {
        let defaults = Config::defaults();
        let pick = |value: Option<u64>, fallback: Option<u64>| value.or(fallback).unwrap_or_default();

        let endpoints = Endpoints::resolve(
            self.origin.as_deref().or(defaults.origin.as_deref()).unwrap_or_default(),
            self.api_base.as_deref().unwrap_or_default(),
            self.ws_url.as_deref().unwrap_or_default(),
        )?;

        let mut settings = DashboardSettings::with_endpoints(endpoints);
        if let Some(days) = self.history_days {
            settings.history_days = days.max(1);
        }
        settings.http_timeout =
            Duration::from_secs(pick(self.http_timeout_seconds, defaults.http_timeout_seconds).max(1));
        if let Some(retries) = self.http_retries {
            settings.http_retries = retries;
        }
        settings.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(pick(self.reconnect_base_delay_ms, defaults.reconnect_base_delay_ms)),
            max_delay: Duration::from_millis(pick(self.reconnect_max_delay_ms, defaults.reconnect_max_delay_ms)),
            max_attempts: self
                .reconnect_max_attempts
                .unwrap_or(settings.reconnect.max_attempts),
        };
        if let Some(capacity) = self.buffer_capacity {
            settings.buffer_capacity = capacity.max(1);
        }
        settings.safe_mode = SafeModeTimings {
            readiness_interval: Duration::from_millis(pick(self.readiness_interval_ms, defaults.readiness_interval_ms)),
            service_timeout: Duration::from_secs(pick(self.service_timeout_seconds, defaults.service_timeout_seconds)),
            container_timeout: Duration::from_secs(pick(self.container_timeout_seconds, defaults.container_timeout_seconds)),
        };

        Ok(settings)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_seconds.unwrap_or(15).max(1))
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path: display, source })
}
