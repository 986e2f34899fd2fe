use crate::utils::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Warmup length as a proportion of the measurement duration
    #[serde(default = "default_warmup_prop")]
    pub warmup_prop: f64,
    /// Clients launched together before pausing `batch_delay_ms`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Mean of the exponential think time between requests (seconds)
    #[serde(default = "default_mean_think_secs")]
    pub mean_think_secs: f64,
    /// Upper bound on a single think time (seconds)
    #[serde(default = "default_max_think_secs")]
    pub max_think_secs: f64,
    /// Pause before reconnecting after a fault; 0 only yields to sibling clients
    #[serde(default)]
    pub reconnect_backoff_ms: u64,
    /// Used in place of the available parallelism when choosing the unit count
    #[serde(default)]
    pub max_units: Option<usize>,
    /// Read size for workloads without a fixed response length
    #[serde(default = "default_response_buffer")]
    pub response_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

// Default values
fn default_warmup_prop() -> f64 {
    0.2
}

fn default_batch_size() -> usize {
    250
}

fn default_batch_delay_ms() -> u64 {
    10
}

fn default_mean_think_secs() -> f64 {
    1.0
}

fn default_max_think_secs() -> f64 {
    10.0
}

fn default_response_buffer() -> usize {
    100
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results/raw_data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            warmup_prop: default_warmup_prop(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            mean_think_secs: default_mean_think_secs(),
            max_think_secs: default_max_think_secs(),
            reconnect_backoff_ms: 0,
            max_units: None,
            response_buffer: default_response_buffer(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            pretty: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BenchConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn mean_think(&self) -> Duration {
        Duration::from_secs_f64(self.mean_think_secs)
    }

    pub fn max_think(&self) -> Duration {
        Duration::from_secs_f64(self.max_think_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Warmup window derived from the measurement duration
    pub fn warmup_for(&self, duration: Duration) -> Duration {
        duration.mul_f64(self.warmup_prop)
    }

    /// Validate bench settings; also checked by `BenchmarkRun::new`
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.warmup_prop) {
            return Err(BenchError::Config(format!(
                "Invalid warmup_prop: {}. Must be within [0, 1]",
                self.warmup_prop
            )));
        }

        if self.batch_size == 0 {
            return Err(BenchError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if !self.mean_think_secs.is_finite() || self.mean_think_secs <= 0.0 {
            return Err(BenchError::Config(format!(
                "Invalid mean_think_secs: {}. Must be positive",
                self.mean_think_secs
            )));
        }

        if !self.max_think_secs.is_finite() || self.max_think_secs < self.mean_think_secs {
            return Err(BenchError::Config(format!(
                "Invalid max_think_secs: {}. Must be at least mean_think_secs ({})",
                self.max_think_secs, self.mean_think_secs
            )));
        }

        if self.max_units == Some(0) {
            return Err(BenchError::Config(
                "max_units must be greater than 0 when set".to_string(),
            ));
        }

        if self.response_buffer == 0 {
            return Err(BenchError::Config(
                "response_buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl TargetConfig {
    /// Parse `host:port`, tolerating a URL scheme and IPv6 brackets
    /// (`http://127.0.0.1:5050`, `[::1]:5050`).
    pub fn parse(target: &str) -> Result<Self> {
        let trimmed = target
            .split_once("://")
            .map_or(target, |(_, rest)| rest)
            .trim_end_matches('/');

        let (host, port) = trimmed.rsplit_once(':').ok_or_else(|| {
            BenchError::Config(format!("Invalid target '{}': expected host:port", target))
        })?;

        let port = port.parse::<u16>().map_err(|e| {
            BenchError::Config(format!("Invalid port in target '{}': {}", target, e))
        })?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(BenchError::Config(format!(
                "Invalid target '{}': empty host",
                target
            )));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| BenchError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| BenchError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.bench.validate()?;

        if self.target.host.trim().is_empty() {
            return Err(BenchError::Config("target host cannot be empty".to_string()));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(BenchError::Config(format!(
                "Invalid log format: {}. Must be 'pretty' or 'json'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = r#"[bench]
warmup_prop = 0.2          # Warmup length as a share of the measurement duration
batch_size = 250           # Clients started together per execution unit
batch_delay_ms = 10        # Pause between client batches
mean_think_secs = 1.0      # Mean exponential think time between requests
max_think_secs = 10.0      # Cap on a single think time
reconnect_backoff_ms = 0   # Pause before reconnecting after a fault
# max_units = 8            # Overrides the core count in the unit formula
response_buffer = 100      # Read size for unframed responses

[target]
host = "127.0.0.1"
port = 1234

[output]
dir = "results/raw_data"
pretty = false

[logging]
level = "info"  # Options: "trace", "debug", "info", "warn", "error"
format = "pretty"  # Options: "pretty", "json"
"#;

        std::fs::write(path.as_ref(), example).map_err(|e| {
            BenchError::Config(format!("Failed to write example config: {}", e))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.target.host, "127.0.0.1");
        assert_eq!(config.bench.batch_size, 250);
        assert_eq!(config.bench.batch_delay(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_warmup_is_proportional() {
        let bench = BenchConfig::default();
        assert_eq!(bench.warmup_for(Duration::from_secs(10)), Duration::from_secs(2));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.bench.warmup_prop = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bench.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bench.max_think_secs = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bench.max_units = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bench_validation_rejects_unconvertible_floats() {
        let bench = BenchConfig {
            mean_think_secs: -1.0,
            ..BenchConfig::default()
        };
        assert!(bench.validate().is_err());

        let bench = BenchConfig {
            warmup_prop: f64::NAN,
            ..BenchConfig::default()
        };
        assert!(bench.validate().is_err());

        let bench = BenchConfig {
            max_think_secs: f64::INFINITY,
            ..BenchConfig::default()
        };
        assert!(bench.validate().is_err());

        assert!(BenchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_target_parsing() {
        let target = TargetConfig::parse("127.0.0.1:5050").unwrap();
        assert_eq!((target.host.as_str(), target.port), ("127.0.0.1", 5050));

        let target = TargetConfig::parse("http://localhost:1234/").unwrap();
        assert_eq!((target.host.as_str(), target.port), ("localhost", 1234));

        let target = TargetConfig::parse("[::1]:80").unwrap();
        assert_eq!(target.host, "::1");

        assert!(TargetConfig::parse("localhost").is_err());
        assert!(TargetConfig::parse(":80").is_err());
        assert!(TargetConfig::parse("localhost:99999").is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[target]\nport = 5050\n").unwrap();
        assert_eq!(config.target.port, 5050);
        assert_eq!(config.target.host, "127.0.0.1");
        assert_eq!(config.bench.mean_think_secs, 1.0);
    }

    #[test]
    fn test_example_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        Config::create_example(&path).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.bench.batch_size, 250);
        assert_eq!(config.bench.max_units, None);
    }
}
