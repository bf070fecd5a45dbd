// src/cache.rs
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Persistent set of every domain that has already been notified.
///
/// The in-memory set is authoritative. The JSON file at `path` is a restart
/// checkpoint, rewritten in full after every insert.
#[derive(Clone)]
pub struct DomainCache {
    path: PathBuf,
    domains: Arc<RwLock<HashSet<String>>>,
    save_lock: Arc<Mutex<()>>,
}

impl DomainCache {
    /// Open the cache at `path`, loading any previously saved domains.
    ///
    /// A missing file yields an empty cache. A file that is not a JSON array
    /// of strings is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let domains = match fs::read_to_string(&path).await {
            Ok(contents) => {
                let list: Vec<String> = serde_json::from_str(&contents)
                    .with_context(|| format!("Malformed domain cache {:?}", path))?;
                info!("Loaded {} cached domains from {:?}", list.len(), path);
                list.into_iter().collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Domain cache {:?} does not exist, starting fresh", path);
                HashSet::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read domain cache {:?}", path));
            }
        };

        Ok(Self {
            path,
            domains: Arc::new(RwLock::new(domains)),
            save_lock: Arc::new(Mutex::new(())),
        })
    }

    /// True if `domain` has never been recorded. Exact, case-sensitive lookup.
    pub async fn is_new(&self, domain: &str) -> bool {
        !self.domains.read().await.contains(domain)
    }

    /// Record `domain` and rewrite the cache file.
    ///
    /// The domain stays recorded in memory even when the write fails.
    pub async fn add(&self, domain: &str) -> Result<()> {
        self.domains.write().await.insert(domain.to_string());
        self.save().await
    }

    /// Number of recorded domains
    pub async fn len(&self) -> usize {
        self.domains.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self) -> Result<()> {
        // One writer at a time; readers keep going while the file is written
        let _writer = self.save_lock.lock().await;

        let body = {
            let domains = self.domains.read().await;
            let mut list: Vec<&String> = domains.iter().collect();
            list.sort();
            serde_json::to_vec(&list).context("Failed to serialize domain cache")?
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create cache directory {:?}", dir))?;
        }

        let temp_path = self.path.with_extension("tmp");

        fs::write(&temp_path, body)
            .await
            .context("Failed to write domain cache to temporary file")?;

        fs::rename(&temp_path, &self.path)
            .await
            .context("Failed to rename temporary domain cache")?;

        debug!("Domain cache saved to {:?}", self.path);

        Ok(())
    }
}
