use std::collections::HashMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::cache::entry::{all_key_hash, CacheEntry};
use crate::error::CacheRemoteError;

/// HTTP client for the remote cache protocol described in specification §6:
/// `GET /items/all`, `POST /items/batch`, `GET /compare_hash/{hash}`.
pub struct RemoteCacheClient {
    base_url: String,
    api_key: Option<SecretString>,
    http: reqwest::Client,
}

impl RemoteCacheClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds"),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    /// `GET /items/all` -> `{fingerprint: entry}`.
    pub async fn get_all(&self) -> Result<HashMap<String, CacheEntry>, CacheRemoteError> {
        let url = format!("{}/items/all", self.base_url);
        let resp = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| CacheRemoteError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CacheRemoteError::Status { status, body });
        }
        resp.json()
            .await
            .map_err(|e| CacheRemoteError::Request(e.to_string()))
    }

    /// `POST /items/batch` with body `[{"key": fingerprint, "item": entry}, ...]`.
    pub async fn post_batch(
        &self,
        entries: &HashMap<String, CacheEntry>,
    ) -> Result<(), CacheRemoteError> {
        if entries.is_empty() {
            return Ok(());
        }
        let body: Vec<serde_json::Value> = entries
            .iter()
            .map(|(key, item)| {
                serde_json::json!({
                    "key": key,
                    "item": item,
                })
            })
            .collect();
        let url = format!("{}/items/batch", self.base_url);
        let resp = self
            .authed(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CacheRemoteError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CacheRemoteError::Status { status, body });
        }
        Ok(())
    }

    /// `GET /compare_hash/{md5_of_sorted_concatenated_keys}` -> `{"match": bool}`.
    pub async fn compare_hash<I, S>(&self, keys: I) -> Result<bool, CacheRemoteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hash = all_key_hash(keys);
        let url = format!("{}/compare_hash/{hash}", self.base_url);
        let resp = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| CacheRemoteError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CacheRemoteError::Status { status, body });
        }
        #[derive(serde::Deserialize)]
        struct CompareResponse {
            #[serde(rename = "match")]
            matches: bool,
        }
        let parsed: CompareResponse = resp
            .json()
            .await
            .map_err(|e| CacheRemoteError::Request(e.to_string()))?;
        Ok(parsed.matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_without_api_key_builds() {
        let _client = RemoteCacheClient::new("https://example.com", None);
    }
}
