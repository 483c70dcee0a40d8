use crate::error::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BridgeConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Wait hint reported with every status, in milliseconds. Tells the OS
    /// how long to wait before considering a pending transition hung.
    #[serde(default = "default_wait_hint_ms")]
    pub wait_hint_ms: u64,

    /// Emit the synthetic bootstrap probe when the run loop becomes ready
    #[serde(default = "default_probe_on_ready")]
    pub probe_on_ready: bool,

    /// Name of the dedicated run-loop thread
    #[serde(default = "default_run_loop_thread_name")]
    pub run_loop_thread_name: String,

    /// Name of the event dispatcher thread
    #[serde(default = "default_dispatch_thread_name")]
    pub dispatch_thread_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: pretty, compact, or json
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    /// File name prefix for rolling log files
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
}

fn default_wait_hint_ms() -> u64 {
    10_000
}

fn default_probe_on_ready() -> bool {
    true
}

fn default_run_loop_thread_name() -> String {
    "svc-run-loop".to_string()
}

fn default_dispatch_thread_name() -> String {
    "svc-dispatch".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_file_prefix() -> String {
    "svcbridge.log".to_string()
}

impl BridgeConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from_file("svcbridge.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("service.wait_hint_ms", default_wait_hint_ms() as i64)?
            .set_default("service.probe_on_ready", default_probe_on_ready())?
            .set_default(
                "service.run_loop_thread_name",
                default_run_loop_thread_name(),
            )?
            .set_default(
                "service.dispatch_thread_name",
                default_dispatch_thread_name(),
            )?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .set_default("logging.file_prefix", default_log_file_prefix())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with SVCBRIDGE_ prefix
            .add_source(Environment::with_prefix("SVCBRIDGE").separator("_"))
            .build()?;

        let config: BridgeConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.service.wait_hint_ms == 0 {
            return Err(ConfigError::Message(
                "Service wait_hint_ms must be greater than 0".to_string(),
            ));
        }

        if self.service.run_loop_thread_name.is_empty()
            || self.service.dispatch_thread_name.is_empty()
        {
            return Err(ConfigError::Message(
                "Service thread names must not be empty".to_string(),
            ));
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "Unknown log format '{}', expected pretty, compact or json",
                    other
                )));
            }
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "Unknown log level '{}'",
                    other
                )));
            }
        }

        Ok(())
    }

    /// Render the configuration as a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            wait_hint_ms: default_wait_hint_ms(),
            probe_on_ready: default_probe_on_ready(),
            run_loop_thread_name: default_run_loop_thread_name(),
            dispatch_thread_name: default_dispatch_thread_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
            file_prefix: default_log_file_prefix(),
        }
    }
}
