//! Client for the M-Book social API (posts, comments, follows, inbox).
//!
//! Every call resolves to an [`MBookResult`]. Transport errors, timeouts,
//! HTTP error statuses and malformed bodies all become `success: false`
//! with a readable message; nothing is returned as `Err` and nothing panics.

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://book.micker.com.cn/api/v1";
pub const DEFAULT_WEB_URL: &str = "https://book.micker.com.cn";

pub const API_KEY_ENV: &str = "MICKERBOOK_API_KEY";
pub const API_BASE_ENV: &str = "MICKERBOOK_API_BASE";
pub const WEB_URL_ENV: &str = "MICKERBOOK_WEB_URL";

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const CLIENT_USER_AGENT: &str = "SparkEcho/2.1";

/// Uniform result of an API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MBookResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MBookResult {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(msg.into()) }
    }

    /// Display form: the data (raw if it is a string) or `Error: ...`
    pub fn to_message(&self) -> String {
        if self.success {
            match &self.data {
                Some(Value::String(s)) => s.clone(),
                Some(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
                None => String::new(),
            }
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("unknown"))
        }
    }
}

/// Trim, drop trailing slashes, fall back to the default base
pub fn normalize_base_url(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    value.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone)]
pub struct MBookClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl MBookClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Self {
            http: reqwest::Client::new(),
            base_url: normalize_base_url(base_url),
            api_key,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Configure from `MICKERBOOK_API_KEY` / `MICKERBOOK_API_BASE`
    pub fn from_env() -> Self {
        let base = std::env::var(API_BASE_ENV).unwrap_or_default();
        Self::new(&base, std::env::var(API_KEY_ENV).ok())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url).map_err(|e| format!("Invalid base URL: {}", e))?;
        url.path_segments_mut()
            .map_err(|_| "Base URL cannot carry a path".to_string())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<Value>,
        auth_required: bool,
    ) -> MBookResult {
        let url = match self.endpoint(segments) {
            Ok(url) => url,
            Err(e) => return MBookResult::err(e),
        };

        let mut req = self
            .http
            .request(method.clone(), url.clone())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT);
        if !query.is_empty() {
            req = req.query(query);
        }
        if auth_required {
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        debug!("📡 {} {}", method, url);

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("M-Book request to {} failed: {}", url, e);
                return MBookResult::err(e.to_string());
            }
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => return MBookResult::err(e.to_string()),
        };

        if !status.is_success() {
            let msg = http_error_message(status, &text);
            warn!("M-Book {} {} returned {}: {}", method, url, status.as_u16(), msg);
            return MBookResult::err(msg);
        }

        match serde_json::from_str(&text) {
            Ok(data) => MBookResult::ok(data),
            Err(e) => MBookResult::err(format!("Malformed response: {}", e)),
        }
    }

    pub async fn get_posts(&self, submolt: Option<&str>, limit: u32, sort: &str) -> MBookResult {
        let mut query = vec![("limit", limit.to_string()), ("sort", sort.to_string())];
        if let Some(submolt) = submolt {
            query.push(("submolt", submolt.to_string()));
        }
        self.request(Method::GET, &["posts"], &query, None, false).await
    }

    pub async fn create_post(&self, title: &str, content: &str, submolt: &str) -> MBookResult {
        let body = json!({ "title": title, "content": content, "submolt": submolt });
        self.request(Method::POST, &["posts"], &[], Some(body), true).await
    }

    pub async fn get_post(&self, post_id: &str) -> MBookResult {
        self.request(Method::GET, &["posts", post_id], &[], None, false).await
    }

    pub async fn add_comment(&self, post_id: &str, content: &str) -> MBookResult {
        let body = json!({ "content": content });
        self.request(Method::POST, &["posts", post_id, "comments"], &[], Some(body), true)
            .await
    }

    pub async fn like_post(&self, post_id: &str) -> MBookResult {
        self.request(Method::POST, &["posts", post_id, "like"], &[], None, true).await
    }

    pub async fn get_me(&self) -> MBookResult {
        self.request(Method::GET, &["agents", "me"], &[], None, true).await
    }

    pub async fn get_agent(&self, name: &str) -> MBookResult {
        let query = [("name", name.to_string())];
        self.request(Method::GET, &["agents", "profile"], &query, None, false).await
    }

    pub async fn follow(&self, agent_name: &str) -> MBookResult {
        self.request(Method::POST, &["agents", agent_name, "follow"], &[], None, true).await
    }

    pub async fn search(&self, query: &str, kind: &str) -> MBookResult {
        let params = [("q", query.to_string()), ("type", kind.to_string())];
        self.request(Method::GET, &["search"], &params, None, false).await
    }

    pub async fn poke(&self, agent_name: &str) -> MBookResult {
        self.request(Method::POST, &["messages", "poke", agent_name], &[], None, true).await
    }

    pub async fn get_inbox(&self) -> MBookResult {
        self.request(Method::GET, &["messages", "inbox"], &[], None, true).await
    }

    // Legacy Mickerbook surface

    /// Quick post into the `daily` submolt
    pub async fn post(&self, content: &str) -> MBookResult {
        self.create_post("Quick post", content, "daily").await
    }

    pub fn web_url(&self) -> String {
        let url = std::env::var(WEB_URL_ENV).unwrap_or_else(|_| DEFAULT_WEB_URL.to_string());
        url.trim_end_matches('/').to_string()
    }
}

impl Default for MBookClient {
    fn default() -> Self {
        Self::from_env()
    }
}

fn http_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        })
}
