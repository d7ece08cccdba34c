use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;

/// Thin JSON wrapper over the dashboard API. Any non-2xx response becomes an
/// error carrying the server's `error` message.
pub struct HalcyonClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    api_key: Option<String>,
}

impl HalcyonClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::new();
        Ok(HalcyonClient {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A session token wins over the service key.
    fn add_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        if let Some(ref token) = self.token {
            builder.bearer_auth(token)
        } else if let Some(ref key) = self.api_key {
            builder.header("X-Api-Key", key)
        } else {
            builder
        }
    }

    async fn handle_error(resp: Response) -> anyhow::Error {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if let Ok(err) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(msg) = err.get("error").and_then(|e| e.as_str()) {
                return anyhow::anyhow!("API error ({}): {}", status, msg);
            }
        }
        anyhow::anyhow!("API error ({}): {}", status, body)
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let mut builder = self.add_auth(self.client.request(method, self.url(path)));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder.send().await.context("Failed to connect to API")?;
        if !resp.status().is_success() {
            return Err(Self::handle_error(resp).await);
        }
        Ok(resp)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        self.send(method, path, body)
            .await?
            .json::<T>()
            .await
            .context("Failed to parse response")
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json::<(), T>(Method::GET, path, None).await
    }

    /// GET with `query` encoded as the query string; `None` values are left out.
    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, Option<String>)],
    ) -> Result<T> {
        let params: Vec<(&str, &str)> = query
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (*k, v)))
            .collect();
        let resp = self
            .add_auth(self.client.get(self.url(path)).query(&params))
            .send()
            .await
            .context("Failed to connect to API")?;
        if !resp.status().is_success() {
            return Err(Self::handle_error(resp).await);
        }
        resp.json::<T>().await.context("Failed to parse response")
    }

    pub async fn get_text(&self, path: &str) -> Result<String> {
        self.send::<()>(Method::GET, path, None)
            .await?
            .text()
            .await
            .context("Failed to read response body")
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(Method::POST, path, Some(body)).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json::<(), T>(Method::POST, path, None).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json::<(), T>(Method::DELETE, path, None).await
    }

    /// DELETE carrying a JSON body, used where the API wants a reason.
    pub async fn delete_with<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(Method::DELETE, path, Some(body)).await
    }
}
