//! reqwest-backed transport against `https://{shop}.myshopify.com/admin/`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{ApiRequest, Method, Transport, TransportError, TransportResponse, CALL_LIMIT_HEADER};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: String,
    api_pass: String,
}

impl HttpTransport {
    /// `base_url` is the admin root; request paths are appended with a `.json` suffix.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_pass: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("theme-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::new(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_pass: api_pass.into(),
        })
    }

    /// Admin root for a `*.myshopify.com` shop name.
    pub fn shop_url(shop: &str) -> String {
        format!("https://{shop}.myshopify.com/admin/")
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<TransportResponse, TransportError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        }
        .basic_auth(&self.api_key, Some(&self.api_pass));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::new(format!("{} {}: {e}", request.method, url)))?;

        let status = response.status();
        let call_limit = response
            .headers()
            .get(CALL_LIMIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("{} {}: {e}", request.method, url)))?;

        // Error pages are not always JSON; keep the text so the status message survives.
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        let mut resp = TransportResponse::new(status.as_u16(), body);
        resp.call_limit = call_limit;
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let transport =
            HttpTransport::new(HttpTransport::shop_url("demo-store"), "key", "pass").unwrap();
        assert_eq!(
            transport.url("themes/42/assets"),
            "https://demo-store.myshopify.com/admin/themes/42/assets.json"
        );
        assert_eq!(
            transport.url("/themes"),
            "https://demo-store.myshopify.com/admin/themes.json"
        );
    }
}
