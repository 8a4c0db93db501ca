use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use sms_core::{SmsError, SplitOptions, FALLBACK_MODEM};
use sms_teltonika::RouterSettings;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Router connection
    pub router: RouterConfig,
    /// Gateway listener
    pub server: ServerConfig,
    /// Message splitting
    pub messages: MessageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Router configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RouterConfig {
    /// Router address, e.g. `https://192.168.1.1`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Verify the router's TLS certificate (default: false)
    pub verify_tls: bool,
    /// Upgrade `http://` router URLs to `https://` (default: true)
    pub force_https: bool,
    /// Modem used when none can be discovered (default: 1-1.4)
    pub default_modem: String,
    /// Token cache directory (default: home directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Login and modem status timeout in seconds (default: 10)
    pub auth_timeout_secs: u64,
    /// Send timeout in seconds (default: 30)
    pub send_timeout_secs: u64,
}

/// Server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 8000)
    pub port: u16,
}

/// Message splitting configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MessageConfig {
    /// Characters per SMS including the `i/N: ` prefix (default: 160)
    pub max_length: usize,
    /// How far back a cut may move to reach whitespace (default: 20)
    pub whitespace_window: usize,
    /// How far back a cut may move to reach punctuation (default: 10)
    pub punctuation_window: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: json or pretty (default: pretty)
    pub format: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            verify_tls: false,
            force_https: true,
            default_modem: FALLBACK_MODEM.to_string(),
            cache_dir: None,
            auth_timeout_secs: 10,
            send_timeout_secs: 30,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_length: sms_core::split::DEFAULT_MAX_LENGTH,
            whitespace_window: sms_core::split::DEFAULT_WHITESPACE_WINDOW,
            punctuation_window: sms_core::split::DEFAULT_PUNCTUATION_WINDOW,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Values given on the command line; they win over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Explicit config file; must exist when set.
    pub config_path: Option<PathBuf>,
    pub router_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_length: Option<usize>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Pre-`SMSGATE__` variable names still honoured for the router.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TRB245_ROUTER", "router.url"),
    ("TRB245_USER", "router.username"),
    ("TRB245_PASSWORD", "router.password"),
];

impl AppConfig {
    /// Load configuration from the process environment, files and `overrides`
    pub fn load(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::load_from(overrides, std::env::vars().collect())
    }

    /// Like [`AppConfig::load`] with an explicit environment.
    pub fn load_from(
        overrides: &Overrides,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let file = match &overrides.config_path {
            Some(path) => File::from(path.as_path()).required(true),
            None => File::with_name("config").required(false),
        };

        let mut builder = Config::builder()
            // Start with default configuration
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            // Environment variables (SMSGATE__ROUTER__URL, ...)
            .add_source(
                Environment::with_prefix("SMSGATE")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            );

        for (var, key) in LEGACY_ENV {
            let value = env.get(*var).filter(|v| !v.is_empty()).cloned();
            builder = builder.set_override_option(*key, value)?;
        }

        builder = builder
            .set_override_option("router.url", overrides.router_url.clone())?
            .set_override_option("router.username", overrides.username.clone())?
            .set_override_option("router.password", overrides.password.clone())?
            .set_override_option("messages.max_length", overrides.max_length.map(|n| n as i64))?
            .set_override_option("server.host", overrides.host.clone())?
            .set_override_option("server.port", overrides.port.map(i64::from))?;

        builder.build()?.try_deserialize()
    }

    pub fn split_options(&self) -> SplitOptions {
        SplitOptions::new(self.messages.max_length).with_windows(
            self.messages.whitespace_window,
            self.messages.punctuation_window,
        )
    }
}

impl RouterConfig {
    /// Connection settings, or an error naming how to provide what is missing.
    pub fn settings(&self) -> Result<RouterSettings, SmsError> {
        let url = present(&self.url).ok_or_else(|| {
            SmsError::Config(
                "Router URL missing! specify --router, set TRB245_ROUTER or create config.yaml"
                    .into(),
            )
        })?;
        let username = present(&self.username).ok_or_else(|| {
            SmsError::Config(
                "Username missing! specify --user, set TRB245_USER or create config.yaml".into(),
            )
        })?;
        let password = present(&self.password).ok_or_else(|| {
            SmsError::Config(
                "Password missing! specify --password, set TRB245_PASSWORD or create config.yaml"
                    .into(),
            )
        })?;

        let mut settings = RouterSettings::new(url, username, password);
        settings.verify_tls = self.verify_tls;
        settings.force_https = self.force_https;
        settings.default_modem = self.default_modem.clone();
        settings.cache_dir = self.cache_dir.clone();
        settings.auth_timeout = Duration::from_secs(self.auth_timeout_secs);
        settings.send_timeout = Duration::from_secs(self.send_timeout_secs);
        Ok(settings)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
