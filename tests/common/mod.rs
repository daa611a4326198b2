//! In-memory shop used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use theme_sync::api::ShopApi;
use theme_sync::scheduler::{Scheduler, ThrottleConfig};
use theme_sync::sync::ThemeSync;
use theme_sync::transport::{ApiRequest, Method, Transport, TransportError, TransportResponse};

pub const THEME_ID: u64 = 828155753;

struct StoredAsset {
    content: Vec<u8>,
    updated_at: DateTime<Utc>,
}

pub struct FakeShop {
    assets: Mutex<BTreeMap<String, StoredAsset>>,
    failing: Mutex<HashSet<String>>,
    rate_limited: AtomicU32,
    clock_ms: AtomicI64,
    log: Mutex<Vec<ApiRequest>>,
}

impl FakeShop {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            assets: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(HashSet::new()),
            rate_limited: AtomicU32::new(0),
            clock_ms: AtomicI64::new(1_462_890_181_000),
            log: Mutex::new(Vec::new()),
        })
    }

    fn tick(&self) -> DateTime<Utc> {
        let ms = self.clock_ms.fetch_add(1_000, Ordering::SeqCst) + 1_000;
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    /// Create or replace an asset with a fresh timestamp.
    pub fn put(&self, key: &str, content: &[u8]) -> DateTime<Utc> {
        let updated_at = self.tick();
        self.assets.lock().unwrap().insert(
            key.to_string(),
            StoredAsset {
                content: content.to_vec(),
                updated_at,
            },
        );
        updated_at
    }

    /// Bump an asset's timestamp without changing its content.
    pub fn touch(&self, key: &str) -> DateTime<Utc> {
        let updated_at = self.tick();
        self.assets
            .lock()
            .unwrap()
            .get_mut(key)
            .expect("touch of unknown asset")
            .updated_at = updated_at;
        updated_at
    }

    pub fn content(&self, key: &str) -> Option<Vec<u8>> {
        self.assets.lock().unwrap().get(key).map(|a| a.content.clone())
    }

    pub fn updated_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.assets.lock().unwrap().get(key).map(|a| a.updated_at)
    }

    pub fn fail(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self, key: &str) {
        self.failing.lock().unwrap().remove(key);
    }

    /// Reject the next `n` requests, whatever they are, with 429.
    pub fn rate_limit_next(&self, n: u32) {
        self.rate_limited.store(n, Ordering::SeqCst);
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    /// Keys of every asset content fetch seen so far.
    pub fn fetches(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Get)
            .filter_map(|r| r.query_value("asset[key]").map(str::to_owned))
            .collect()
    }

    /// Keys of every upload seen so far.
    pub fn uploads(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Put)
            .filter_map(|r| r.body.as_ref()?["asset"]["key"].as_str().map(str::to_owned))
            .collect()
    }

    fn assets_path(&self) -> String {
        format!("themes/{THEME_ID}/assets")
    }

    fn handle(&self, request: &ApiRequest) -> TransportResponse {
        let limited = self
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return TransportResponse::new(429, json!({ "errors": "Exceeded 2 calls per second for api client." }))
                .with_call_limit("40/40");
        }

        let assets_path = self.assets_path();
        match (request.method, request.path.as_str()) {
            (Method::Get, "themes") => TransportResponse::new(
                200,
                json!({ "themes": [{ "id": THEME_ID, "name": "Debut", "role": "main" }] }),
            ),
            (Method::Get, path) if path == assets_path => match request.query_value("asset[key]") {
                Some(key) => self.get_asset(key),
                None => self.list_assets(),
            },
            (Method::Put, path) if path == assets_path => self.put_asset(request.body.as_ref()),
            _ => TransportResponse::new(404, json!({ "errors": "Not Found" })),
        }
    }

    fn list_assets(&self) -> TransportResponse {
        let assets = self.assets.lock().unwrap();
        let list: Vec<Value> = assets
            .iter()
            .map(|(key, asset)| {
                json!({
                    "key": key,
                    "updated_at": asset.updated_at.to_rfc3339(),
                    "theme_id": THEME_ID,
                })
            })
            .collect();
        TransportResponse::new(200, json!({ "assets": list })).with_call_limit("1/40")
    }

    fn get_asset(&self, key: &str) -> TransportResponse {
        if self.failing.lock().unwrap().contains(key) {
            return TransportResponse::new(500, json!({ "errors": "Internal Server Error" }));
        }
        let assets = self.assets.lock().unwrap();
        match assets.get(key) {
            Some(asset) => TransportResponse::new(
                200,
                json!({
                    "asset": {
                        "key": key,
                        "attachment": BASE64.encode(&asset.content),
                        "updated_at": asset.updated_at.to_rfc3339(),
                        "theme_id": THEME_ID,
                    }
                }),
            ),
            None => TransportResponse::new(404, json!({ "errors": "Not Found" })),
        }
    }

    fn put_asset(&self, body: Option<&Value>) -> TransportResponse {
        let Some(asset) = body.map(|b| &b["asset"]) else {
            return TransportResponse::new(400, json!({ "errors": "missing body" }));
        };
        let (Some(key), Some(attachment)) = (asset["key"].as_str(), asset["attachment"].as_str())
        else {
            return TransportResponse::new(400, json!({ "errors": "missing key or attachment" }));
        };
        if self.failing.lock().unwrap().contains(key) {
            return TransportResponse::new(422, json!({ "errors": { "asset": ["is invalid"] } }));
        }
        let Ok(content) = BASE64.decode(attachment) else {
            return TransportResponse::new(400, json!({ "errors": "bad attachment" }));
        };

        let updated_at = self.put(key, &content);
        TransportResponse::new(
            200,
            json!({
                "asset": {
                    "key": key,
                    "updated_at": updated_at.to_rfc3339(),
                    "theme_id": THEME_ID,
                }
            }),
        )
    }
}

#[async_trait]
impl Transport for FakeShop {
    async fn send(&self, request: &ApiRequest) -> Result<TransportResponse, TransportError> {
        self.log.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;
        Ok(self.handle(request))
    }
}

pub fn scheduler(shop: &Arc<FakeShop>) -> Scheduler {
    Scheduler::new(
        shop.clone(),
        ThrottleConfig {
            ceiling: 40,
            initial_budget: 40,
            recovery_interval: Duration::from_millis(5),
        },
    )
}

pub fn theme_sync(shop: &Arc<FakeShop>, root: &Path) -> ThemeSync {
    ThemeSync::open(ShopApi::new(scheduler(shop)), root, THEME_ID).unwrap()
}
