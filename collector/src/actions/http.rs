//! `http` action
//!
//! Sends the context input (or a fixed body) to an HTTP endpoint and
//! returns the response body as the action result. Transport failures
//! and non-success statuses are distinguished so callers can tell a
//! down endpoint from a rejected request.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::Value;
use virta_core::{PluginConfig, PluginError};

use super::{Action, ActionContext};

/// Registry type name
pub const ACTION_TYPE: &str = "http";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Config {
    /// Instance name, required
    name: String,
    /// Request method, defaults to POST
    method: String,
    /// Target URL, required
    url: String,
    /// Extra request headers
    headers: HashMap<String, String>,
    /// Fixed request body; when empty the context input is sent as JSON
    body: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::new(),
            method: "POST".to_string(),
            url: String::new(),
            headers: HashMap::new(),
            body: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// HTTP request action, see the module docs
#[derive(Debug, Default)]
pub struct HttpAction {
    name: String,
    method: Method,
    url: String,
    headers: HashMap<String, String>,
    body: String,
    client: Option<Client>,
}

#[async_trait::async_trait]
impl Action for HttpAction {
    fn init(&mut self, cfg: &PluginConfig) -> Result<(), PluginError> {
        let cfg: Config = virta_core::decode_config(cfg)?;
        if cfg.name.is_empty() {
            return Err(PluginError::Config(
                "http action requires a name".to_string(),
            ));
        }
        if cfg.url.is_empty() {
            return Err(PluginError::Config("http action requires a url".to_string()));
        }
        self.method = Method::from_bytes(cfg.method.to_uppercase().as_bytes())
            .map_err(|_| PluginError::Config(format!("invalid HTTP method {:?}", cfg.method)))?;
        self.client = Some(
            Client::builder()
                .timeout(cfg.timeout)
                .build()
                .map_err(|e| PluginError::Config(e.to_string()))?,
        );
        self.name = cfg.name;
        self.url = cfg.url;
        self.headers = cfg.headers;
        self.body = cfg.body;
        Ok(())
    }

    async fn run(&self, ctx: &ActionContext) -> Result<Value, PluginError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| PluginError::Config("http action is not initialized".to_string()))?;

        let mut req = client.request(self.method.clone(), &self.url);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        req = if self.body.is_empty() {
            req.json(&ctx.input)
        } else {
            req.body(self.body.clone())
        };

        tracing::debug!(action = %self.name, method = %self.method, url = %self.url, "sending request");
        let resp = req
            .send()
            .await
            .map_err(|e| PluginError::Connection(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PluginError::Connection(e.to_string()))?;
        if !status.is_success() {
            return Err(PluginError::Write(format!(
                "{} returned {status}: {body}",
                self.url
            )));
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
