// src/matcher.rs
//! Watch target matching and dedup

use crate::cache::DomainCache;
use crate::notifier::NotificationBuffer;
use crate::stats::StatsCollector;
use crate::types::CertificateUpdate;
use tracing::{error, info};

#[derive(Debug, Clone)]
struct WatchTarget {
    name: String,
    needle: String,
}

/// Attributes each domain of a certificate update to the first watch
/// target it contains, and forwards domains never seen before.
pub struct Matcher {
    targets: Vec<WatchTarget>,
    cache: DomainCache,
    buffer: NotificationBuffer,
    stats: StatsCollector,
}

impl Matcher {
    /// Targets keep their configured order and text; blank entries are skipped
    pub fn new(
        targets: &[String],
        cache: DomainCache,
        buffer: NotificationBuffer,
        stats: StatsCollector,
    ) -> Self {
        let targets = targets
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| WatchTarget {
                name: t.clone(),
                needle: t.to_lowercase(),
            })
            .collect();

        Self {
            targets,
            cache,
            buffer,
            stats,
        }
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// First target, in configured order, whose text appears anywhere in
    /// `domain`. Case-insensitive.
    pub fn match_target(&self, domain: &str) -> Option<&str> {
        let domain_lower = domain.to_lowercase();

        self.targets
            .iter()
            .find(|t| domain_lower.contains(&t.needle))
            .map(|t| t.name.as_str())
    }

    /// Decode a raw certstream frame and process it.
    ///
    /// Frames that are not certificate updates with a domain list are
    /// dropped without a trace.
    pub async fn process_raw(&self, raw: &str) -> usize {
        match CertificateUpdate::from_raw(raw) {
            Some(update) => self.process(&update).await,
            None => 0,
        }
    }

    /// Returns how many domains were forwarded for notification
    pub async fn process(&self, update: &CertificateUpdate) -> usize {
        self.stats.increment_processed();

        let mut forwarded = 0;

        for domain in &update.domains {
            let Some(target) = self.match_target(domain) else {
                continue;
            };

            if !self.cache.is_new(domain).await {
                continue;
            }

            info!(domain = %domain, watch_target = %target, "new subdomain");
            self.stats.increment_new_subdomains();

            // A failed save still counts as seen and is still notified
            if let Err(e) = self.cache.add(domain).await {
                error!(domain = %domain, "failed to cache domain: {:#}", e);
            }

            self.buffer.add(target, domain.clone());
            forwarded += 1;
        }

        forwarded
    }
}
