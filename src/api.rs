//! Typed theme and asset endpoints on top of the scheduler.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, SyncError};
use crate::scheduler::{ApiError, Scheduler};
use crate::transport::ApiRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Asset metadata as returned by the asset listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub key: String,
    pub updated_at: DateTime<Utc>,
}

/// One asset with its content. Binary assets come back as base64 in
/// `attachment`, text assets as `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub key: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
}

impl Asset {
    pub fn content(&self) -> Result<Vec<u8>> {
        match (&self.attachment, &self.value) {
            (Some(encoded), _) => BASE64.decode(encoded).map_err(|e| {
                SyncError::InvalidResponse(format!("bad attachment for {}: {e}", self.key))
            }),
            (None, Some(text)) => Ok(text.as_bytes().to_vec()),
            (None, None) => Err(SyncError::InvalidResponse(format!(
                "asset {} has no content",
                self.key
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ThemesEnvelope {
    themes: Vec<Theme>,
}

#[derive(Debug, Deserialize)]
struct AssetsEnvelope {
    assets: Vec<AssetSummary>,
}

#[derive(Debug, Deserialize)]
struct AssetEnvelope<T> {
    asset: T,
}

/// Shop admin API client. Every call is queued on the shared scheduler.
#[derive(Clone)]
pub struct ShopApi {
    scheduler: Scheduler,
}

impl ShopApi {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub async fn list_themes(&self) -> Result<Vec<Theme>> {
        let envelope: ThemesEnvelope = self.call(ApiRequest::get("themes"), "themes").await?;
        Ok(envelope.themes)
    }

    pub async fn list_assets(&self, theme_id: u64) -> Result<Vec<AssetSummary>> {
        let envelope: AssetsEnvelope = self
            .call(ApiRequest::get(assets_path(theme_id)), "assets")
            .await?;
        Ok(envelope.assets)
    }

    pub async fn get_asset(&self, theme_id: u64, key: &str) -> Result<Asset> {
        let request = ApiRequest::get(assets_path(theme_id))
            .with_query("asset[key]", key)
            .with_query("theme_id", theme_id.to_string());
        let envelope: AssetEnvelope<Asset> = self.call(request, "asset").await?;
        Ok(envelope.asset)
    }

    /// Create or replace an asset. Content always travels base64 encoded.
    pub async fn put_asset(&self, theme_id: u64, key: &str, content: &[u8]) -> Result<AssetSummary> {
        let body = json!({
            "asset": {
                "key": key,
                "attachment": BASE64.encode(content),
            }
        });
        let envelope: AssetEnvelope<AssetSummary> = self
            .call(ApiRequest::put(assets_path(theme_id), body), "asset")
            .await?;
        Ok(envelope.asset)
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest, what: &str) -> Result<T> {
        let body = self.scheduler.enqueue(request).await?;
        decode(body, what)
    }
}

fn assets_path(theme_id: u64) -> String {
    format!("themes/{theme_id}/assets")
}

fn decode<T: DeserializeOwned>(body: Value, what: &str) -> Result<T> {
    if body.is_null() {
        return Err(SyncError::InvalidResponse(format!("empty {what} response")));
    }
    serde_json::from_value(body).map_err(|e| SyncError::Api(ApiError::Decode(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_listing_decodes_offset_timestamps() {
        let body = json!({
            "assets": [
                {
                    "key": "assets/theme.css",
                    "updated_at": "2016-05-10T14:23:01-04:00",
                    "content_type": "text/css",
                    "theme_id": 7
                }
            ]
        });
        let envelope: AssetsEnvelope = decode(body, "assets").unwrap();
        assert_eq!(envelope.assets.len(), 1);
        assert_eq!(
            envelope.assets[0].updated_at.to_rfc3339(),
            "2016-05-10T18:23:01+00:00"
        );
    }

    #[test]
    fn test_asset_content_prefers_attachment() {
        let asset = Asset {
            key: "assets/logo.png".into(),
            updated_at: Utc::now(),
            value: None,
            attachment: Some(BASE64.encode([0u8, 159, 146, 150])),
        };
        assert_eq!(asset.content().unwrap(), vec![0u8, 159, 146, 150]);

        let text = Asset {
            key: "layout/theme.liquid".into(),
            updated_at: Utc::now(),
            value: Some("{{ content_for_layout }}".into()),
            attachment: None,
        };
        assert_eq!(text.content().unwrap(), b"{{ content_for_layout }}");
    }

    #[test]
    fn test_asset_without_content_is_rejected() {
        let asset = Asset {
            key: "snippets/empty.liquid".into(),
            updated_at: Utc::now(),
            value: None,
            attachment: None,
        };
        assert!(matches!(asset.content(), Err(SyncError::InvalidResponse(_))));
    }

    #[test]
    fn test_missing_envelope_is_a_decode_error() {
        let err = decode::<ThemesEnvelope>(json!({ "nope": [] }), "themes").unwrap_err();
        assert!(matches!(err, SyncError::Api(ApiError::Decode(_))));

        let err = decode::<ThemesEnvelope>(Value::Null, "themes").unwrap_err();
        assert!(matches!(err, SyncError::InvalidResponse(_)));
    }
}
