// src/main.rs
use ceye::cache::DomainCache;
use ceye::certstream::CertStream;
use ceye::cli::Cli;
use ceye::config::{self, Config, Startup};
use ceye::delivery::WebhookClient;
use ceye::event_loop::{self, LoopExit};
use ceye::matcher::Matcher;
use ceye::notifier::NotificationBuffer;
use ceye::stats::StatsCollector;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    let config_path = match &cli.config {
        Some(path) => PathBuf::from(path),
        None => config::default_config_path()?,
    };

    let save_webhook = cli.webhook.as_deref().filter(|_| cli.save_webhook);
    let startup = Config::load_or_init(&config_path, save_webhook, !cli.targets.is_empty())?;
    let mut config = match startup {
        Startup::Ready(config) => config,
        Startup::TemplateCreated => {
            anyhow::bail!(
                "created config template at {}; add your targets and webhook, then run again",
                config_path.display()
            );
        }
    };
    if save_webhook.is_some() {
        eprintln!("updated webhook in {}", config_path.display());
    }

    cli.apply_overrides(&mut config);
    config.validate()?;

    // Initialize logging
    let log_level = cli.log_level().unwrap_or(config.logging.level.as_str());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    print_banner(&config.targets);

    let cache = DomainCache::open(config.cache_path()?).await?;
    let stats = StatsCollector::new();

    let webhook_url = config.webhook_url().map(str::to_string);
    if webhook_url.is_none() {
        tracing::warn!("no discord webhook provided. notifications disabled");
    }
    let secret = config.webhook.as_ref().and_then(|w| w.secret.clone());
    let client = WebhookClient::new(webhook_url, secret, config.delivery_policy())?;

    let buffer = NotificationBuffer::new(
        Arc::new(client),
        config.batching.batch_policy(),
        stats.clone(),
    );
    let matcher = Matcher::new(&config.targets, cache, buffer, stats.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutting down...");
        shutdown_tx.send(true).ok();
    });

    if config.stats.enabled {
        let stats = stats.clone();
        let interval_secs = config.stats.interval_secs.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                tracing::info!("{}", stats.format_stats());
            }
        });
    }

    tracing::info!("connecting to certstream at {}", config.certstream.url);
    let (channels, stream_handle) = CertStream::new(&config.certstream).spawn();

    let exit = event_loop::run(&matcher, channels, shutdown_rx).await;
    stream_handle.abort();

    tracing::info!("{}", stats.format_stats());

    if exit == LoopExit::StreamClosed {
        anyhow::bail!("certstream client stopped unexpectedly");
    }

    Ok(())
}

fn print_banner(targets: &[String]) {
    eprintln!(
        "\n  {} {}\n",
        "ceye".cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    for (i, target) in targets.iter().enumerate() {
        eprintln!("         {}. {}", i + 1, target.green());
    }
    eprintln!();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
