//! Wire seam between the scheduler and the shop's admin API.
//!
//! The scheduler only ever talks to a [`Transport`]: production uses
//! [`HttpTransport`], tests plug in an in-memory shop.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Header carrying the shop's `used/ceiling` call accounting.
pub const CALL_LIMIT_HEADER: &str = "x-shopify-shop-api-call-limit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One admin API call. `path` is relative to the admin root and carries no
/// `.json` suffix (e.g. `themes/12/assets`).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a query parameter by name.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parsed `used/ceiling` call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallLimit {
    pub used: u32,
    pub ceiling: u32,
}

impl CallLimit {
    /// Parse a header value such as `32/40`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (used, ceiling) = raw.trim().split_once('/')?;
        Some(Self {
            used: used.trim().parse().ok()?,
            ceiling: ceiling.trim().parse().ok()?,
        })
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.used)
    }
}

/// A response as seen by the scheduler: status, raw call-limit header, and the
/// decoded JSON body (`Value::Null` when the body was empty).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub call_limit: Option<String>,
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            call_limit: None,
            body,
        }
    }

    pub fn with_call_limit(mut self, raw: impl Into<String>) -> Self {
        self.call_limit = Some(raw.into());
        self
    }
}

/// The request never produced an HTTP response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: &ApiRequest) -> Result<TransportResponse, TransportError>;
}
