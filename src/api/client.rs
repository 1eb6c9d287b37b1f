//! Authenticated HTTP client for the messaging API
//!
//! Wraps reqwest::Client with base URL resolution and bearer token injection.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use url::Url;

use crate::config::{Config, Session};

/// Client for the messaging REST endpoints.
#[derive(Clone)]
pub struct MessagingClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MessagingClient {
    pub fn new(session: &Session) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: session.api_url.trim_end_matches('/').to_string(),
            token: session.token.clone(),
        }
    }

    /// Load config and build a client for the configured session.
    pub fn from_config() -> Result<Self> {
        let config = Config::load()?;
        let session = config.require_session()?;
        Ok(Self::new(&session))
    }

    /// Append path segments to the base URL. Each segment is percent-encoded,
    /// so ids cannot change the route.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid API URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL {} cannot have a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub async fn get(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let url = self.url(segments, query)?;
        tracing::debug!("GET {}", url);

        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        check_response(resp, url.as_str()).await
    }

    pub async fn post(&self, segments: &[&str], body: &Value) -> Result<reqwest::Response> {
        let url = self.url(segments, &[])?;
        tracing::debug!("POST {}", url);

        let resp = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        check_response(resp, url.as_str()).await
    }

    pub async fn put(&self, segments: &[&str], body: &Value) -> Result<reqwest::Response> {
        let url = self.url(segments, &[])?;
        tracing::debug!("PUT {}", url);

        let resp = self
            .http
            .put(url.clone())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("PUT {} failed", url))?;

        check_response(resp, url.as_str()).await
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<reqwest::Response> {
        let url = self.url(segments, &[])?;
        tracing::debug!("DELETE {}", url);

        let resp = self
            .http
            .delete(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("DELETE {} failed", url))?;

        check_response(resp, url.as_str()).await
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Token may be invalid -- run 'club-chat configure'.",
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}

/// Strip the `{ "data": ... }` envelope some endpoints use.
pub fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => data,
            None => Value::Object(map),
        },
        other => other,
    }
}

/// Pull a list out of a bare array or an object holding it under `key`.
pub fn unwrap_list(body: Value, key: &str) -> Result<Vec<Value>> {
    match unwrap_data(body) {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            _ => bail!("Expected a list of {} in response", key),
        },
        other => bail!("Expected a list of {}, got {}", key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_unwrap_data() {
        assert_eq!(unwrap_data(json!({"data": {"id": 1}})), json!({"id": 1}));
        assert_eq!(unwrap_data(json!({"id": 1})), json!({"id": 1}));
        assert_eq!(unwrap_data(json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_unwrap_list_shapes() {
        assert_eq!(assert_ok!(unwrap_list(json!([1]), "messages")), vec![json!(1)]);
        assert_eq!(
            unwrap_list(json!({"data": [1, 2]}), "messages").unwrap().len(),
            2
        );
        assert_eq!(
            unwrap_list(json!({"data": {"messages": [1], "hasMore": false}}), "messages")
                .unwrap()
                .len(),
            1
        );
        assert_err!(unwrap_list(json!({"data": {"items": []}}), "messages"));
        assert_err!(unwrap_list(json!("nope"), "messages"));
    }

    fn client(api_url: &str) -> MessagingClient {
        MessagingClient::new(&Session {
            api_url: api_url.to_string(),
            socket_url: "https://api.example.org".to_string(),
            token: "t".to_string(),
            user_id: "me".to_string(),
            user_name: "Me".to_string(),
            user_name_ar: None,
        })
    }

    #[test]
    fn test_url_joins_base_and_segments() {
        let client = client("https://api.example.org/api/");
        assert_eq!(
            assert_ok!(client.url(&["messages", "c1"], &[])).as_str(),
            "https://api.example.org/api/messages/c1"
        );
        assert_eq!(
            assert_ok!(client.url(&["messages", "c1"], &[("limit", "50")])).as_str(),
            "https://api.example.org/api/messages/c1?limit=50"
        );
        assert_eq!(
            assert_ok!(self::client("https://api.example.org").url(&["conversations"], &[])).as_str(),
            "https://api.example.org/conversations"
        );
    }

    #[test]
    fn test_url_escapes_ids() {
        let client = client("https://api.example.org/api");
        assert_eq!(
            assert_ok!(client.url(&["messages", "../c1/read", "reactions"], &[])).as_str(),
            "https://api.example.org/api/messages/..%2Fc1%2Fread/reactions"
        );
        assert_eq!(
            assert_ok!(client.url(&["messages", "a b?x"], &[])).as_str(),
            "https://api.example.org/api/messages/a%20b%3Fx"
        );
    }

    #[test]
    fn test_url_rejects_bad_base() {
        assert_err!(client("not a url").url(&["conversations"], &[]));
        assert_err!(client("mailto:someone@example.org").url(&["conversations"], &[]));
    }
}
