use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use ureq::typestate::WithBody;
use ureq::{Agent, RequestBuilder};

use super::RemoteStore;
use crate::error::RemoteError;

/// PostgREST table (e.g. a Supabase project) reached over HTTPS.
///
/// ureq is blocking, so every request runs on the blocking thread pool.
#[derive(Clone)]
pub struct RestStore {
    agent: Agent,
    endpoint: String,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, table: &str, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            endpoint: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            api_key: api_key.to_string(),
        }
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(RestStore) -> Result<T, RemoteError> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?
    }

    fn get(&self, query: &str) -> Result<String, RemoteError> {
        let url = format!("{}?{}", self.endpoint, query);
        let mut resp = self
            .agent
            .get(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", &self.auth())
            .call()
            .map_err(transport)?;
        read_body(resp.status().as_u16(), resp.body_mut())
    }

    fn post(&self, body: &Value) -> Result<(), RemoteError> {
        self.send(self.agent.post(&self.endpoint), body)
    }

    fn patch(&self, query: &str, body: &Value) -> Result<(), RemoteError> {
        let url = format!("{}?{}", self.endpoint, query);
        self.send(self.agent.patch(&url), body)
    }

    fn send(&self, request: RequestBuilder<WithBody>, body: &Value) -> Result<(), RemoteError> {
        let payload = body.to_string();
        let mut resp = request
            .header("apikey", &self.api_key)
            .header("Authorization", &self.auth())
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .send(payload.as_str())
            .map_err(transport)?;
        read_body(resp.status().as_u16(), resp.body_mut()).map(|_| ())
    }
}

fn transport(e: ureq::Error) -> RemoteError {
    RemoteError::Transport(e.to_string())
}

fn read_body(status: u16, body: &mut ureq::Body) -> Result<String, RemoteError> {
    let text = body
        .read_to_string()
        .map_err(|e| RemoteError::Decode(e.to_string()))?;
    if (200..300).contains(&status) {
        Ok(text)
    } else {
        Err(RemoteError::Status { status, body: text })
    }
}

fn discriminator(data_type: &str) -> String {
    format!("data_type=eq.{data_type}")
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn probe(&self) -> Result<(), RemoteError> {
        self.blocking(|s| s.get("select=id&limit=1").map(|_| ())).await
    }

    async fn select(&self, data_type: &str) -> Result<Option<Value>, RemoteError> {
        let query = format!("{}&select=data&limit=1", discriminator(data_type));
        let text = self.blocking(move |s| s.get(&query)).await?;
        let rows: Vec<Value> =
            serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(rows.into_iter().next().and_then(|mut row| match row.get_mut("data") {
            Some(data) if !data.is_null() => Some(data.take()),
            _ => None,
        }))
    }

    async fn insert(&self, data_type: &str, data: Value) -> Result<(), RemoteError> {
        let body = json!({ "data_type": data_type, "data": data });
        self.blocking(move |s| s.post(&body)).await
    }

    async fn update(&self, data_type: &str, data: Value) -> Result<(), RemoteError> {
        let query = discriminator(data_type);
        let body = json!({ "data": data, "updated_at": chrono::Utc::now().to_rfc3339() });
        self.blocking(move |s| s.patch(&query, &body)).await
    }
}
