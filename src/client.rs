use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use crate::config::Config;
use crate::errors::ScreenError;
use crate::gate::RequestGate;

pub const CATEGORIES_ENDPOINT: &str = "/api/kyt/v2/categories";
pub const ENTITIES_ENDPOINT: &str = "/api/risk/v2/entities";

/// Client for the risk-intelligence API.
///
/// Every request goes through the shared [`RequestGate`], so the rate and
/// concurrency limits hold across all callers of one client.
pub struct RiskApiClient {
    client: reqwest::Client,
    base_url: Url,
    gate: RequestGate,
}

impl RiskApiClient {
    /// Creates a new `RiskApiClient`.
    ///
    /// The API key is sent in the `Token` header of every request.
    pub fn new(config: &Config) -> Result<Self, ScreenError> {
        let mut token = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ScreenError::Config("API key is not a valid header value".to_string()))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("token", token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ScreenError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| ScreenError::Config(format!("Invalid base URL: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            gate: RequestGate::from_config(config)?,
        })
    }

    /// Builds the URL for `endpoint`, whose path segments are appended to
    /// the base URL path.
    pub fn endpoint_url(&self, segments: &[&str]) -> Result<Url, ScreenError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ScreenError::Config("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// URL of the per-address risk endpoint; the address is percent-encoded
    /// as a single path segment.
    pub fn entity_url(&self, address: &str) -> Result<Url, ScreenError> {
        let mut segments: Vec<&str> = path_segments(ENTITIES_ENDPOINT).collect();
        segments.push(address);
        self.endpoint_url(&segments)
    }

    /// GETs `endpoint` with `params` through the gate and decodes the JSON
    /// body.
    pub async fn execute(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, ScreenError> {
        let segments: Vec<&str> = path_segments(endpoint).collect();
        let url = self.endpoint_url(&segments)?;
        self.execute_url(url, params).await
    }

    /// Same as [`execute`](Self::execute) for an already-built URL.
    pub async fn execute_url(&self, url: Url, params: &[(&str, &str)]) -> Result<Value, ScreenError> {
        self.gate.run(|| self.send(url.clone(), params)).await
    }

    /// One attempt, no retry.
    async fn send(&self, url: Url, params: &[(&str, &str)]) -> Result<Value, ScreenError> {
        tracing::debug!("GET {}", url.path());

        let response = self.client.get(url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown error");
            let body = response.text().await.unwrap_or_default();
            if !body.trim().is_empty() {
                tracing::debug!("Risk API returned {}: {}", status, body);
            }
            return Err(ScreenError::from_status(status, reason));
        }

        let data = response.json::<Value>().await?;
        Ok(data)
    }
}

fn path_segments(endpoint: &str) -> impl Iterator<Item = &str> {
    endpoint.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RiskApiClient::new(&Config::new("token", "https://example.com"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_header_key_rejected() {
        let client = RiskApiClient::new(&Config::new("bad\nkey", "https://example.com"));
        assert!(matches!(client, Err(ScreenError::Config(_))));
    }

    #[test]
    fn test_endpoint_urls() {
        let client = RiskApiClient::new(&Config::new("token", "https://example.com/")).unwrap();

        let url = client.endpoint_url(&["api", "kyt", "v2", "categories"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/kyt/v2/categories");

        let url = client.entity_url("bc1q/../x y").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/api/risk/v2/entities/bc1q%2F..%2Fx%20y"
        );
    }

    #[test]
    fn test_base_url_path_prefix_kept() {
        let client = RiskApiClient::new(&Config::new("token", "https://example.com/proxy")).unwrap();
        let url = client.entity_url("0xabc").unwrap();
        assert_eq!(url.as_str(), "https://example.com/proxy/api/risk/v2/entities/0xabc");
    }
}
