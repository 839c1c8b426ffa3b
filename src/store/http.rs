use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::RemoteStore;
use crate::config::RemoteConfig;
use crate::error::StoreError;

/// REST transport for a Firebase-style realtime database
/// (`{database_url}/{path}.json?auth=<token>`).
pub struct HttpStore {
    client: Client,
    database_url: Url,
    auth_token: Option<String>,
    timeout_ms: u64,
}

impl HttpStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, StoreError> {
        let raw = config.database_url.trim().trim_end_matches('/');
        if raw.is_empty() {
            return Err(StoreError::NotConfigured);
        }

        // Bare hosts like "demo.firebaseio.com" are served over https
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        let database_url = Url::parse(&with_scheme).map_err(|e| StoreError::Malformed {
            path: raw.to_string(),
            details: format!("invalid database_url: {}", e),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| StoreError::Transport {
                method: "INIT",
                path: database_url.to_string(),
                details: e.to_string(),
            })?;

        info!("Remote store: {}", database_url);

        Ok(Self {
            client,
            auth_token: Some(config.auth_token.trim().to_string()).filter(|t| !t.is_empty()),
            database_url,
            timeout_ms: config.timeout_ms,
        })
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.database_url.clone();
        let full_path = format!(
            "{}/{}.json",
            self.database_url.path().trim_end_matches('/'),
            path.trim_matches('/')
        );
        url.set_path(&full_path);
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        url
    }

    async fn send(
        &self,
        method: Method,
        label: &'static str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, StoreError> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(label, path, e))?;

        let status = response.status();
        debug!("{} {} -> {}", label, path, status);

        if !status.is_success() {
            return Err(StoreError::Status {
                method: label,
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(label, path, e))?;

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| StoreError::Malformed {
            path: path.to_string(),
            details: e.to_string(),
        })
    }

    fn transport_error(&self, method: &'static str, path: &str, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout {
                method,
                path: path.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            StoreError::Transport {
                method,
                path: path.to_string(),
                details: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let value = self.send(Method::GET, "GET", path, None).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn put(&self, path: &str, doc: &Value) -> Result<(), StoreError> {
        self.send(Method::PUT, "PUT", path, Some(doc)).await?;
        Ok(())
    }

    async fn post(&self, path: &str, doc: &Value) -> Result<String, StoreError> {
        let reply = self.send(Method::POST, "POST", path, Some(doc)).await?;
        // Firebase answers {"name": "<push id>"}
        Ok(reply
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn patch(&self, path: &str, doc: &Value) -> Result<(), StoreError> {
        self.send(Method::PATCH, "PATCH", path, Some(doc)).await?;
        Ok(())
    }
}
