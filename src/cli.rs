// src/cli.rs
use crate::config::{Config, WebhookConfig};
use clap::Parser;

/// ceye: real-time subdomain discovery from Certificate Transparency
///
/// Watches a certstream feed for newly logged certificates naming your
/// targets and posts each new subdomain, batched, to a Discord webhook.
#[derive(Parser, Debug, Clone)]
#[command(name = "ceye")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to TOML config file [default: ~/.config/ceye/config.toml]
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Target to monitor (repeatable); replaces the configured targets
    #[arg(short = 't', long = "target")]
    pub targets: Vec<String>,

    /// Discord webhook URL; overrides the configured one
    #[arg(long = "webhook")]
    pub webhook: Option<String>,

    /// Store the --webhook URL in the config file
    #[arg(long = "save-webhook")]
    pub save_webhook: bool,

    /// Disable notifications for this run
    #[arg(long = "no-webhook")]
    pub no_webhook: bool,

    /// Path to the seen-domain cache file
    #[arg(long = "cache")]
    pub cache: Option<String>,

    /// Certstream websocket URL
    #[arg(long = "certstream-url")]
    pub certstream_url: Option<String>,

    /// Periodically log pipeline statistics
    #[arg(long = "stats")]
    pub stats: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet mode (warnings and errors only)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.verbose && self.quiet {
            anyhow::bail!("Cannot specify both --verbose and --quiet");
        }

        if self.save_webhook && self.webhook.is_none() {
            anyhow::bail!("--save-webhook requires --webhook <URL>");
        }

        if self.no_webhook && self.webhook.is_some() {
            anyhow::bail!("Cannot use --webhook with --no-webhook");
        }

        Ok(())
    }

    /// Log level forced by flags, if any
    pub fn log_level(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }

    /// Apply command line overrides on top of the loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if !self.targets.is_empty() {
            config.targets = self.targets.clone();
        }

        if let Some(url) = &self.webhook {
            match config.webhook.as_mut() {
                Some(webhook) => webhook.url = url.clone(),
                None => {
                    config.webhook = Some(WebhookConfig {
                        url: url.clone(),
                        secret: None,
                        timeout_secs: None,
                    });
                }
            }
        }

        if self.no_webhook {
            config.webhook = None;
        }

        if let Some(path) = &self.cache {
            config.cache.path = Some(path.clone());
        }

        if let Some(url) = &self.certstream_url {
            config.certstream.url = url.clone();
        }

        if self.stats {
            config.stats.enabled = true;
        }
    }
}
