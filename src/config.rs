// src/config.rs

use crate::delivery::DeliveryPolicy;
use crate::notifier::BatchPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const CONFIG_FILE: &str = "config.toml";
pub const CACHE_FILE: &str = "cache.json";

const TEMPLATE: &str = r#"# ceye configuration

# Watch targets. A domain matches a target when it contains the target
# text (case-insensitive). The first matching target in this list wins.
targets = [
    # "hackerone.com",
]

[webhook]
# Discord webhook URL. Leave empty to disable notifications.
url = ""
# secret = "adds an X-Ceye-Signature HMAC header"
# timeout_secs = 10

[certstream]
url = "ws://127.0.0.1:8080/"
reconnect_delay_secs = 5

[batching]
debounce_ms = 5000
max_batch_size = 25
rate_limit_wait_ms = 2000
max_retries = 3
max_concurrent_deliveries = 4

[logging]
level = "info"
"#;

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    pub secret: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CertstreamConfig {
    #[serde(default = "default_certstream_url")]
    pub url: String,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_certstream_url() -> String {
    "ws://127.0.0.1:8080/".to_string()
}
fn default_reconnect_delay() -> u64 { 5 }

impl Default for CertstreamConfig {
    fn default() -> Self {
        Self {
            url: default_certstream_url(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchingConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_rate_limit_wait_ms")]
    pub rate_limit_wait_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,
}

fn default_debounce_ms() -> u64 { 5000 }
fn default_max_batch_size() -> usize { 25 }
fn default_rate_limit_wait_ms() -> u64 { 2000 }
fn default_max_retries() -> u32 { 3 }
fn default_max_concurrent_deliveries() -> usize { 4 }

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_batch_size: default_max_batch_size(),
            rate_limit_wait_ms: default_rate_limit_wait_ms(),
            max_retries: default_max_retries(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
        }
    }
}

impl BatchingConfig {
    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            debounce: Duration::from_millis(self.debounce_ms),
            max_batch_size: self.max_batch_size,
            max_concurrent_deliveries: self.max_concurrent_deliveries,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// Defaults to `<config-dir>/cache.json`
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_stats_interval")]
    pub interval_secs: u64,
}

fn default_stats_interval() -> u64 { 300 }

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_stats_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub certstream: CertstreamConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

/// `$XDG_CONFIG_HOME/ceye`, falling back to `$HOME/.config/ceye`
/// Outcome of [`Config::load_or_init`]
#[derive(Debug)]
pub enum Startup {
    Ready(Config),
    /// First run: a template was written and needs editing
    TemplateCreated,
}

pub fn config_dir() -> Result<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("ceye"));
    }

    let home = std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .context("Neither XDG_CONFIG_HOME nor HOME is set")?;
    Ok(PathBuf::from(home).join(".config").join("ceye"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Write a commented starter config, creating the directory if needed.
    /// `webhook` fills in `[webhook].url`.
    pub fn write_template(path: &Path, webhook: Option<&str>) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {:?}", dir))?;
        }

        let contents = match webhook {
            Some(url) => TEMPLATE.replacen(
                "url = \"\"",
                &format!("url = {}", toml::Value::String(url.to_string())),
                1,
            ),
            None => TEMPLATE.to_string(),
        };
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config template {:?}", path))?;
        Ok(())
    }

    /// Resolve the config at startup.
    ///
    /// Without a file at `path` and without command line targets, a template
    /// is written and `Startup::TemplateCreated` returned. `save_webhook`
    /// is stored in the file (template or existing) before loading.
    pub fn load_or_init(
        path: &Path,
        save_webhook: Option<&str>,
        has_cli_targets: bool,
    ) -> Result<Startup> {
        if !path.exists() && !has_cli_targets {
            Self::write_template(path, save_webhook)?;
            return Ok(Startup::TemplateCreated);
        }

        if let Some(url) = save_webhook {
            Self::save_webhook(path, url)?;
        }

        if path.exists() {
            Ok(Startup::Ready(Self::from_file(path)?))
        } else {
            Ok(Startup::Ready(Self::default()))
        }
    }

    /// Set `[webhook].url` in the file at `path`, keeping every other key.
    /// The file is created if it does not exist yet.
    pub fn save_webhook(path: &Path, url: &str) -> Result<()> {
        let mut doc: toml::Table = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?
                .parse()
                .with_context(|| format!("Failed to parse config {:?}", path))?
        } else {
            toml::Table::new()
        };

        let webhook = doc
            .entry("webhook")
            .or_insert(toml::Value::Table(toml::Table::new()));
        let Some(webhook) = webhook.as_table_mut() else {
            anyhow::bail!("[webhook] in {:?} is not a table", path);
        };
        webhook.insert("url".to_string(), toml::Value::String(url.to_string()));

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {:?}", dir))?;
        }
        let contents = toml::to_string(&doc).context("Failed to serialize config")?;
        fs::write(path, contents).with_context(|| format!("Failed to write config {:?}", path))?;
        Ok(())
    }

    /// Configured webhook URL, if any. Empty and `""` count as unset.
    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook
            .as_ref()
            .map(|w| w.url.trim())
            .filter(|url| !url.is_empty() && *url != "\"\"")
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(config_dir()?.join(CACHE_FILE)),
        }
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        let timeout_secs = self
            .webhook
            .as_ref()
            .and_then(|w| w.timeout_secs)
            .unwrap_or(10);

        DeliveryPolicy {
            max_retries: self.batching.max_retries,
            rate_limit_wait: Duration::from_millis(self.batching.rate_limit_wait_ms),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.iter().all(|t| t.trim().is_empty()) {
            anyhow::bail!(
                "No targets configured. Add target domains to the config file or use --target"
            );
        }

        if self.batching.max_batch_size == 0 {
            anyhow::bail!("batching.max_batch_size must be at least 1");
        }
        if self.batching.max_retries == 0 {
            anyhow::bail!("batching.max_retries must be at least 1");
        }
        if self.batching.max_concurrent_deliveries == 0 {
            anyhow::bail!("batching.max_concurrent_deliveries must be at least 1");
        }

        if let Some(url) = self.webhook_url() {
            let parsed = Url::parse(url).with_context(|| format!("Invalid webhook URL {:?}", url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("Webhook URL must be http or https, got {:?}", url);
            }
        }

        let certstream = Url::parse(&self.certstream.url)
            .with_context(|| format!("Invalid certstream URL {:?}", self.certstream.url))?;
        if !matches!(certstream.scheme(), "ws" | "wss") {
            anyhow::bail!("Certstream URL must be ws or wss, got {:?}", self.certstream.url);
        }

        Ok(())
    }
}
