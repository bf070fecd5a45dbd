// src/delivery.rs
//! Webhook delivery with linear backoff on rate limiting

use crate::notifier::NotificationSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, warn};

type HmacSha256 = Hmac<Sha256>;

pub const EMBED_COLOR: u32 = 2829617;
pub const AUTHOR_NAME: &str = "1hehaq/ceye";
pub const AUTHOR_URL: &str = "https://github.com/1hehaq/ceye";
pub const SIGNATURE_HEADER: &str = "X-Ceye-Signature";

/// What happened to a single batch handed to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// No endpoint configured
    Skipped,
    Delivered { attempts: u32 },
    /// Every attempt was answered with 429
    Throttled { attempts: u32 },
    /// Endpoint answered with a non-success, non-429 status
    Rejected { status: u16 },
    /// Request never got a response
    Unreachable,
    Unserializable,
}

impl DeliveryOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Skipped | Self::Delivered { .. })
    }
}

/// Retry and timeout knobs for the webhook client
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub max_retries: u32,
    /// Multiplied by the attempt number after each 429
    pub rate_limit_wait: Duration,
    pub timeout: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_wait: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
pub struct WebhookPayload {
    pub tts: bool,
    pub embeds: [Embed; 1],
}

#[derive(Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub author: Author,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct Author {
    pub name: &'static str,
    pub url: &'static str,
}

impl WebhookPayload {
    /// One embed listing every domain of the batch
    pub fn for_batch(target: &str, domains: &[String]) -> Self {
        Self {
            tts: false,
            embeds: [Embed {
                title: format!("{}  [{}]", target, domains.len()),
                description: format!("```\n{}\n```", domains.join("\n")),
                color: EMBED_COLOR,
                author: Author {
                    name: AUTHOR_NAME,
                    url: AUTHOR_URL,
                },
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            }],
        }
    }
}

/// Posts batches to a Discord-compatible webhook
pub struct WebhookClient {
    client: Client,
    url: Option<String>,
    secret: Option<String>,
    policy: DeliveryPolicy,
}

impl WebhookClient {
    /// Create a client. With `url` set to `None` every send is a silent no-op.
    pub fn new(url: Option<String>, secret: Option<String>, policy: DeliveryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(policy.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url,
            secret,
            policy,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Deliver one batch, retrying only when the endpoint answers 429
    pub async fn send(&self, target: &str, domains: &[String]) -> DeliveryOutcome {
        let Some(url) = self.url.as_deref() else {
            return DeliveryOutcome::Skipped;
        };

        let payload = WebhookPayload::for_batch(target, domains);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                error!(watch_target = %target, "failed to marshal payload: {}", e);
                return DeliveryOutcome::Unserializable;
            }
        };

        let signature = match self.sign(&body) {
            Ok(sig) => sig,
            Err(e) => {
                error!(watch_target = %target, "failed to sign payload: {}", e);
                return DeliveryOutcome::Unserializable;
            }
        };

        for attempt in 1..=self.policy.max_retries {
            let mut req = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .body(body.clone());

            if let Some(sig) = &signature {
                req = req.header(SIGNATURE_HEADER, sig);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    error!(watch_target = %target, "failed to send notification: {}", e);
                    return DeliveryOutcome::Unreachable;
                }
            };

            match resp.status() {
                StatusCode::OK | StatusCode::NO_CONTENT => {
                    debug!(watch_target = %target, count = domains.len(), attempt, "notification delivered");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!(watch_target = %target, attempt, "rate limited, waiting");
                    if attempt < self.policy.max_retries {
                        tokio::time::sleep(self.policy.rate_limit_wait * attempt).await;
                    }
                }
                status => {
                    warn!(watch_target = %target, status = status.as_u16(), "webhook error");
                    return DeliveryOutcome::Rejected {
                        status: status.as_u16(),
                    };
                }
            }
        }

        error!(
            watch_target = %target,
            count = domains.len(),
            attempts = self.policy.max_retries,
            "failed to send after retries"
        );
        DeliveryOutcome::Throttled {
            attempts: self.policy.max_retries,
        }
    }

    /// Hex HMAC-SHA256 of the body when a secret is configured
    fn sign(&self, body: &[u8]) -> Result<Option<String>> {
        let Some(secret) = &self.secret else {
            return Ok(None);
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("HMAC init error: {:?}", e))?;
        mac.update(body);
        Ok(Some(hex::encode(mac.finalize().into_bytes())))
    }
}

#[async_trait]
impl NotificationSink for WebhookClient {
    async fn deliver(&self, target: &str, domains: &[String]) -> DeliveryOutcome {
        self.send(target, domains).await
    }
}
