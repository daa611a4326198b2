//! Shop credentials and tool settings, stored as `.shopify-theme/config.json`
//! under the theme root.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::scheduler::{Scheduler, ThrottleConfig, DEFAULT_CEILING, DEFAULT_RECOVERY_INTERVAL};
use crate::sync::STATE_DIR;
use crate::transport::HttpTransport;

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Shop name, without `.myshopify.com`.
    pub shop: String,
    pub api_key: String,
    pub api_pass: String,

    /// Git branch -> theme id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub branches: BTreeMap<String, u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<ThrottleSettings>,

    /// Admin API root; defaults to `https://{shop}.myshopify.com/admin/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_budget: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_interval_ms: Option<u64>,
}

impl ThemeConfig {
    /// Build and validate a config from user-supplied values. `shop` may be
    /// the bare name or a `name.myshopify.com` URL.
    pub fn new(shop: &str, api_key: &str, api_pass: &str) -> Result<Self> {
        let shop = normalize_shop(shop).ok_or_else(|| {
            SyncError::Config(format!(
                "invalid shop {shop:?}: URL must be valid and must end with \".myshopify.com\""
            ))
        })?;

        let config = Self {
            shop,
            api_key: api_key.trim().to_string(),
            api_pass: api_pass.trim().to_string(),
            branches: BTreeMap::new(),
            throttle: None,
            api_base: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(CONFIG_FILE)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SyncError::Config(format!(
                    "no config at {}; run `theme-sync init` first",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = serde_json::from_str(&data).map_err(|e| {
            SyncError::Config(format!("could not parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::path(root);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("could not serialize config: {e}")))?;
        fs::write(&path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !is_shop_name(&self.shop) {
            return Err(SyncError::Config(format!("invalid shop name {:?}", self.shop)));
        }
        if !is_credential(&self.api_key) {
            return Err(SyncError::Config("invalid API key".to_string()));
        }
        if !is_credential(&self.api_pass) {
            return Err(SyncError::Config("invalid API password".to_string()));
        }
        if let Some(ThrottleSettings {
            ceiling: Some(0), ..
        }) = self.throttle
        {
            return Err(SyncError::Config("throttle ceiling must be positive".to_string()));
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        self.api_base
            .clone()
            .unwrap_or_else(|| HttpTransport::shop_url(&self.shop))
    }

    pub fn throttle_config(&self) -> ThrottleConfig {
        let settings = self.throttle.clone().unwrap_or_default();
        let ceiling = settings.ceiling.unwrap_or(DEFAULT_CEILING);
        ThrottleConfig {
            ceiling,
            initial_budget: settings.initial_budget.unwrap_or(ceiling).min(ceiling),
            recovery_interval: settings
                .recovery_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RECOVERY_INTERVAL),
        }
    }

    /// Scheduler over the HTTP transport, using the configured throttle.
    pub fn scheduler(&self) -> Result<Scheduler> {
        self.scheduler_with(self.throttle_config())
    }

    pub fn scheduler_with(&self, throttle: ThrottleConfig) -> Result<Scheduler> {
        let transport = HttpTransport::new(self.base_url(), &self.api_key, &self.api_pass)
            .map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(Scheduler::new(Arc::new(transport), throttle))
    }

    /// An explicit id wins; otherwise the id mapped to the current branch.
    pub fn resolve_theme(&self, explicit: Option<u64>, branch: Option<&str>) -> Result<u64> {
        explicit
            .or_else(|| branch.and_then(|b| self.branches.get(b).copied()))
            .ok_or(SyncError::MissingThemeId)
    }
}

/// `demo-store`, `demo-store.myshopify.com` and `https://demo-store.myshopify.com/`
/// all yield `demo-store`.
pub fn normalize_shop(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme.split('/').next().unwrap_or_default();

    let name = match host.split_once('.') {
        Some((name, "myshopify.com")) => name,
        Some(_) => return None,
        None => host,
    };

    is_shop_name(name).then(|| name.to_string())
}

fn is_shop_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_credential(value: &str) -> bool {
    value
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}
