use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{Map, Value};
use tokio::time::Duration;
use url::Url;

use super::{DocumentBackend, StorePath};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};

/// Realtime Database REST transport: `{database_url}/{path}.json`.
pub struct FirebaseBackend {
    client: Client,
    base: Url,
    auth: Option<String>,
}

impl FirebaseBackend {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut raw = cfg.database_url.clone();
        if raw.is_empty() {
            return Err(anyhow!("DATABASE_URL is not set"));
        }
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|e| anyhow!("invalid DATABASE_URL {}: {}", raw, e))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base,
            auth: cfg.auth_token.clone(),
        })
    }

    fn url_for(&self, path: &StorePath) -> CoreResult<Url> {
        let mut url = self
            .base
            .join(&format!("{}.json", path))
            .map_err(|e| CoreError::invalid(format!("bad store path {}: {}", path, e)))?;
        if let Some(auth) = &self.auth {
            url.query_pairs_mut().append_pair("auth", auth);
        }
        Ok(url)
    }

    fn request(&self, method: Method, path: &StorePath) -> CoreResult<RequestBuilder> {
        Ok(self.client.request(method, self.url_for(path)?))
    }

    /// Send and turn any transport failure or non-success status into `StoreUnavailable`.
    async fn send(&self, op: &str, path: &StorePath, req: RequestBuilder) -> CoreResult<String> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(CoreError::unavailable(format!(
                "{} {} failed: {} {}",
                op,
                path,
                status.as_u16(),
                body
            )));
        }
        Ok(body)
    }
}

fn parse_body(path: &StorePath, body: &str) -> CoreResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body)
        .map_err(|e| CoreError::unavailable(format!("undecodable response for {}: {}", path, e)))
}

#[async_trait]
impl DocumentBackend for FirebaseBackend {
    async fn get(&self, path: &StorePath) -> CoreResult<Option<Value>> {
        let body = self.send("GET", path, self.request(Method::GET, path)?).await?;
        match parse_body(path, &body)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    async fn put(&self, path: &StorePath, value: &Value) -> CoreResult<()> {
        let req = self.request(Method::PUT, path)?.json(value);
        self.send("PUT", path, req).await.map(|_| ())
    }

    async fn patch(&self, path: &StorePath, value: &Map<String, Value>) -> CoreResult<()> {
        let req = self.request(Method::PATCH, path)?.json(value);
        self.send("PATCH", path, req).await.map(|_| ())
    }

    async fn delete(&self, path: &StorePath) -> CoreResult<()> {
        self.send("DELETE", path, self.request(Method::DELETE, path)?)
            .await
            .map(|_| ())
    }

    async fn ping(&self) -> CoreResult<()> {
        let root = StorePath::root();
        let mut url = self.url_for(&root)?;
        url.query_pairs_mut().append_pair("shallow", "true");
        self.send("GET", &root, self.client.get(url)).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(url: &str, auth: Option<&str>) -> Config {
        Config {
            database_url: url.to_string(),
            auth_token: auth.map(str::to_string),
            ..Config::default()
        }
    }

    #[test]
    fn test_url_for_appends_json_and_auth() {
        let backend = FirebaseBackend::new(&cfg("https://db.example.com", Some("t0k"))).unwrap();
        let url = backend.url_for(&StorePath::parse("communities/1/users").unwrap()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://db.example.com/communities/1/users.json?auth=t0k"
        );
    }

    #[test]
    fn test_root_url() {
        let backend = FirebaseBackend::new(&cfg("https://db.example.com/", None)).unwrap();
        let url = backend.url_for(&StorePath::root()).unwrap();
        assert_eq!(url.as_str(), "https://db.example.com/.json");
    }

    #[test]
    fn test_missing_url_rejected() {
        assert!(FirebaseBackend::new(&cfg("", None)).is_err());
    }

    #[test]
    fn test_parse_body_null_and_empty() {
        let path = StorePath::root();
        assert_eq!(parse_body(&path, "null").unwrap(), Value::Null);
        assert_eq!(parse_body(&path, "").unwrap(), Value::Null);
        assert!(parse_body(&path, "{oops").is_err());
    }
}
