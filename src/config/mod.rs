//! Configuration module for the S3 file driver.
//!
//! The driver consumes a flat configuration bag: default bucket, endpoint,
//! region, static credentials, proxy and logging switches. It can be
//! deserialized from YAML (with `${VAR}` environment expansion) or picked up
//! directly from the environment with [`Config::from_env`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Log verbosity selected through configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    /// The `tracing` filter directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Driver configuration bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bucket used when a URI carries an empty bucket component.
    #[serde(default)]
    pub default_bucket: Option<String>,

    /// Endpoint URL override for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Static credentials; must be both present or both absent.
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Honor `http(s)_proxy` environment variables.
    #[serde(default)]
    pub allow_system_proxy: bool,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Enable SDK-level HTTP wire logging.
    #[serde(default)]
    pub http_debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_bucket: None,
            endpoint: None,
            region: default_region(),
            access_key: None,
            secret_key: None,
            allow_system_proxy: false,
            log_level: LogLevel::default(),
            http_debug: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Replace `${VAR_NAME}` placeholders with environment values.
///
/// Unset variables are left in place, so a missing secret surfaces as a
/// parse or validation failure instead of an empty credential.
fn expand_env_vars(content: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` placeholders are expanded from the environment before
    /// parsing, so keys and endpoints can stay out of the file itself.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&expand_env_vars(&content))?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from environment variables.
    ///
    /// Both the standard `AWS_*` variables and the legacy `S3_*` variables
    /// are recognized; when both are set, `AWS_*` wins.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let endpoint = env("AWS_ENDPOINT_URL").or_else(|| env("S3_ENDPOINT"));
        let region = env("AWS_DEFAULT_REGION").unwrap_or_else(default_region);
        let access_key = env("AWS_ACCESS_KEY_ID").or_else(|| env("S3_ACCESS_KEY"));
        let secret_key = env("AWS_SECRET_ACCESS_KEY").or_else(|| env("S3_SECRET_KEY"));

        let allow_system_proxy = ["http_proxy", "https_proxy", "HTTP_PROXY", "HTTPS_PROXY"]
            .iter()
            .any(|&v| env(v).is_some())
            || env("S3_ALLOW_SYSTEM_PROXY").is_some();

        let config = Config {
            default_bucket: env("S3_BUCKET_NAME"),
            endpoint,
            region,
            access_key,
            secret_key,
            allow_system_proxy,
            log_level: env("S3_DRIVER_LOGLEVEL")
                .map(|v| LogLevel::parse(&v))
                .unwrap_or_default(),
            http_debug: env("AWS_DEBUG_HTTP_LOGS").is_some(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(ConfigError::ValidationError(
                "access key and secret key must be provided together".into(),
            ));
        }
        if self.region.is_empty() {
            return Err(ConfigError::ValidationError(
                "region must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.default_bucket.is_none());
        assert!(!config.http_debug);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
default_bucket: "shared-data"
endpoint: "http://localhost:9000"
region: "eu-west-3"
access_key: "AKIA_TEST"
secret_key: "secret"
allow_system_proxy: true
log_level: debug
http_debug: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.default_bucket.as_deref(), Some("shared-data"));
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.region, "eu-west-3");
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.allow_system_proxy);
        assert!(config.http_debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_lone_access_key() {
        let config = Config {
            access_key: Some("AKIA_TEST".into()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_aws_precedence() {
        std::env::set_var("S3_ENDPOINT", "http://legacy:9000");
        std::env::set_var("AWS_ENDPOINT_URL", "http://standard:9000");
        std::env::set_var("S3_BUCKET_NAME", "env-bucket");
        std::env::remove_var("AWS_ACCESS_KEY_ID");
        std::env::remove_var("S3_ACCESS_KEY");
        std::env::remove_var("AWS_SECRET_ACCESS_KEY");
        std::env::remove_var("S3_SECRET_KEY");

        let config = Config::from_env().unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("http://standard:9000"));
        assert_eq!(config.default_bucket.as_deref(), Some("env-bucket"));

        std::env::remove_var("S3_ENDPOINT");
        std::env::remove_var("AWS_ENDPOINT_URL");
        std::env::remove_var("S3_BUCKET_NAME");
    }

    #[test]
    #[serial]
    fn test_from_env_log_level() {
        std::env::set_var("S3_DRIVER_LOGLEVEL", "trace");
        let config = Config::from_env().unwrap();
        assert_eq!(config.log_level, LogLevel::Trace);
        std::env::remove_var("S3_DRIVER_LOGLEVEL");
    }

    #[test]
    #[serial]
    fn test_load_expands_env_placeholders() {
        std::env::set_var("S3FD_TEST_BUCKET", "expanded-bucket");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driver.yaml");
        std::fs::write(
            &path,
            "default_bucket: ${S3FD_TEST_BUCKET}\nregion: eu-west-1\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.default_bucket.as_deref(), Some("expanded-bucket"));
        assert_eq!(config.region, "eu-west-1");
        std::env::remove_var("S3FD_TEST_BUCKET");
    }

    #[test]
    fn test_unset_placeholder_is_left_in_place() {
        let expanded = expand_env_vars("endpoint: ${S3FD_SURELY_UNSET_VAR}");
        assert_eq!(expanded, "endpoint: ${S3FD_SURELY_UNSET_VAR}");
    }
}
