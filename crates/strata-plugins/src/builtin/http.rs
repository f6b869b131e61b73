//! HTTP fetch primitive.

use crate::{Plugin, PluginCall, PluginOutput, config_error, require_object, require_str};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::time::Duration;
use strata_core::{Error, Result};
use tracing::debug;

const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// Client settings shared by HTTP plugins.
#[derive(Debug, Clone)]
pub struct HttpPluginConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpPluginConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("strata/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// `http/fetch`: performs one request and returns `{status, headers, body}`.
///
/// Config: `url` (required), `method` (default GET), `headers` (object of
/// strings), `body` (sent as JSON), `fail_on_status` (default true, fails the
/// step on a 4xx or 5xx response).
pub struct HttpFetchPlugin {
    client: reqwest::Client,
}

impl HttpFetchPlugin {
    pub fn new(config: HttpPluginConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Plugin for HttpFetchPlugin {
    fn plugin_type(&self) -> &str {
        "http"
    }

    fn name(&self) -> &str {
        "fetch"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        require_object(self, config)?;
        let raw = require_str(self, config, "url")?;
        let url = url::Url::parse(raw)
            .map_err(|e| config_error(self, format!("invalid url '{raw}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(config_error(
                self,
                format!("unsupported url scheme '{}'", url.scheme()),
            ));
        }

        if let Some(method) = config.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| config_error(self, "'method' must be a string"))?;
            if !METHODS.contains(&method.to_ascii_uppercase().as_str()) {
                return Err(config_error(self, format!("unsupported method '{method}'")));
            }
        }

        if let Some(headers) = config.get("headers") {
            let ok = headers
                .as_object()
                .is_some_and(|h| h.values().all(Value::is_string));
            if !ok {
                return Err(config_error(self, "'headers' must be an object of strings"));
            }
        }
        Ok(())
    }

    async fn execute(&self, call: PluginCall<'_>) -> Result<PluginOutput> {
        let url = require_str(self, call.config, "url")?;
        let method = call
            .config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| config_error(self, e.to_string()))?;

        let mut request = self.client.request(method.clone(), url);
        if let Some(headers) = call.config.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }
        if let Some(body) = call.config.get("body") {
            request = request.json(body);
        }

        debug!(step = %call.step_name, %method, url, "Sending HTTP request");
        let response = request
            .send()
            .await
            .map_err(|e| Error::PluginFailed(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let headers: serde_json::Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| Error::PluginFailed(format!("reading response from {url}: {e}")))?;

        let fail_on_status = call
            .config
            .get("fail_on_status")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if fail_on_status && (status.is_client_error() || status.is_server_error()) {
            return Err(Error::PluginFailed(format!(
                "{url} responded with status {}",
                status.as_u16()
            )));
        }

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(PluginOutput::value(json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
        })))
    }
}
