//! Pull and push passes.
//!
//! A pass enumerates candidates, diffs them against the [`ThemeCache`], fans
//! out one transfer per asset that needs it, and fans every result back in.
//! The cache is only written when every transfer in the pass succeeded; a
//! failed pass leaves the file on disk untouched so re-running it retries
//! exactly what was not confirmed.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use crate::api::{AssetSummary, ShopApi};
use crate::error::{Result, SyncError, TransferFailures};
use crate::sync::cache::ThemeCache;
use crate::sync::hash::ContentHash;
use crate::sync::local;

pub struct ThemeSync {
    api: ShopApi,
    theme_id: u64,
    root: PathBuf,
    cache: ThemeCache,
}

/// Content fetched and written locally.
struct Downloaded {
    hash: ContentHash,
    updated_at: DateTime<Utc>,
}

enum Upload {
    Skipped,
    Sent {
        hash: ContentHash,
        updated_at: DateTime<Utc>,
    },
}

impl ThemeSync {
    /// Bind a theme to a local root, loading its cache. A corrupt cache is fatal.
    pub fn open(api: ShopApi, root: impl Into<PathBuf>, theme_id: u64) -> Result<Self> {
        let root = root.into();
        let cache = ThemeCache::open(&root, theme_id)?;
        Ok(Self {
            api,
            theme_id,
            root,
            cache,
        })
    }

    pub fn theme_id(&self) -> u64 {
        self.theme_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &ThemeCache {
        &self.cache
    }

    pub async fn list_remote_assets(&self) -> Result<Vec<AssetSummary>> {
        self.api.list_assets(self.theme_id).await
    }

    pub fn list_local_files(&self) -> Result<Vec<String>> {
        local::list_local_files(&self.root)
    }

    /// Download every asset whose remote state differs from the cache.
    ///
    /// Returns the keys whose content actually changed, sorted. Assets whose
    /// timestamp moved but whose content hash did not are refreshed in the
    /// cache and left out of the result.
    pub async fn pull(&mut self) -> Result<Vec<String>> {
        debug!(theme_id = self.theme_id, "pull: enumerating remote assets");
        let remote = self.list_remote_assets().await?;

        let stale: Vec<AssetSummary> = remote
            .into_iter()
            .filter(|asset| !self.cache.is_current(&asset.key, asset.updated_at))
            .collect();
        let total = stale.len();
        debug!(stale = total, cached = self.cache.len(), "pull: diffed against cache");

        let api = &self.api;
        let root = self.root.as_path();
        let theme_id = self.theme_id;

        let mut transfers: FuturesUnordered<_> = stale
            .into_iter()
            .map(move |asset| async move {
                let result = download(api, root, theme_id, &asset.key).await;
                (asset.key, result)
            })
            .collect();

        let mut changed = Vec::new();
        let mut failures = TransferFailures::new();
        let mut done = 0usize;

        while let Some((key, result)) = transfers.next().await {
            done += 1;
            match result {
                Ok(downloaded) => {
                    let content_changed = self
                        .cache
                        .get(&key)
                        .map_or(true, |entry| entry.hash != downloaded.hash);
                    self.cache
                        .record(key.clone(), downloaded.hash, downloaded.updated_at);

                    if content_changed {
                        info!("({} of {}) {}", done, total, key);
                        changed.push(key);
                    } else {
                        debug!(key, "timestamp moved, content unchanged");
                    }
                }
                Err(err) => {
                    warn!(key, error = %err, "download failed");
                    failures.push(key, err);
                }
            }
        }

        self.finish_pass(failures)?;
        changed.sort();
        Ok(changed)
    }

    /// Upload every local theme file whose hash differs from the cache.
    ///
    /// Returns the uploaded keys, sorted. Files matching the cache cause no
    /// network call at all.
    pub async fn push(&mut self) -> Result<Vec<String>> {
        debug!(theme_id = self.theme_id, "push: enumerating local files");
        let files = self.list_local_files()?;
        let total = files.len();

        let api = &self.api;
        let root = self.root.as_path();
        let theme_id = self.theme_id;

        let candidates: Vec<(String, Option<ContentHash>)> = files
            .into_iter()
            .map(|key| {
                let cached = self.cache.get(&key).map(|entry| entry.hash.clone());
                (key, cached)
            })
            .collect();

        let mut transfers: FuturesUnordered<_> = candidates
            .into_iter()
            .map(move |(key, cached)| async move {
                let result = upload(api, root, theme_id, &key, cached).await;
                (key, result)
            })
            .collect();
        debug!(files = total, "push: hashing and uploading");

        let mut uploaded = Vec::new();
        let mut failures = TransferFailures::new();

        while let Some((key, result)) = transfers.next().await {
            match result {
                Ok(Upload::Skipped) => trace!(key, "unchanged"),
                Ok(Upload::Sent { hash, updated_at }) => {
                    info!("({} of {}) {}", uploaded.len() + 1, total, key);
                    self.cache.record(key.clone(), hash, updated_at);
                    uploaded.push(key);
                }
                Err(err) => {
                    warn!(key, error = %err, "upload failed");
                    failures.push(key, err);
                }
            }
        }

        self.finish_pass(failures)?;
        uploaded.sort();
        Ok(uploaded)
    }

    /// Persist the cache only if the whole pass succeeded.
    fn finish_pass(&self, failures: TransferFailures) -> Result<()> {
        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                "pass failed, theme cache not written"
            );
            return Err(SyncError::TransferFailed(failures.sorted()));
        }

        debug!(path = %self.cache.path().display(), "persisting theme cache");
        self.cache.save()
    }
}

async fn download(api: &ShopApi, root: &Path, theme_id: u64, key: &str) -> Result<Downloaded> {
    let path = local::asset_path(root, key)?;
    let asset = api.get_asset(theme_id, key).await?;
    let content = asset.content()?;

    local::write_asset(&path, &content).await?;

    Ok(Downloaded {
        hash: ContentHash::of(&content),
        updated_at: asset.updated_at,
    })
}

async fn upload(
    api: &ShopApi,
    root: &Path,
    theme_id: u64,
    key: &str,
    cached: Option<ContentHash>,
) -> Result<Upload> {
    let path = local::asset_path(root, key)?;
    let content = tokio::fs::read(&path).await?;
    let hash = ContentHash::of(&content);

    if cached.as_ref() == Some(&hash) {
        return Ok(Upload::Skipped);
    }

    let ack = api.put_asset(theme_id, key, &content).await?;
    Ok(Upload::Sent {
        hash,
        updated_at: ack.updated_at,
    })
}
