//! HTTP client for a running sortilege server.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::api::{ErrorBody, PlayBody, PlayResponse, VoiceChannelsResponse};

pub struct Client {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl Client {
    pub fn new(base: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        if !base.starts_with("http://") && !base.starts_with("https://") {
            bail!(
                "Invalid server URL: '{}'\n\n\
                 Expected something like:\n  \
                 http://localhost:3001",
                base
            );
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// `GET /health` as raw JSON.
    pub async fn health(&self) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}/health", self.base))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base))?;
        decode(response).await
    }

    pub async fn play(&self, body: &PlayBody) -> Result<PlayResponse> {
        let response = self
            .authed(self.http.post(format!("{}/play", self.base)))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base))?;
        decode(response).await
    }

    pub async fn voice_channels(&self, guild: Option<&str>) -> Result<VoiceChannelsResponse> {
        let mut req = self.http.get(format!("{}/voice-channels", self.base));
        if let Some(guild) = guild {
            req = req.query(&[("guildId", guild)]);
        }
        let response = self
            .authed(req)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base))?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(err) => bail!("{} ({}): {}", status, err.kind, err.error),
            Err(_) => bail!("{}: {}", status, text),
        }
    }
    response
        .json()
        .await
        .context("Failed to decode server response")
}
