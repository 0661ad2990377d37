use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use shared::{error::ApiError, protocol::DocumentSnapshot};
use url::Url;

use crate::error::ResolutionError;

/// Boundary to the external processing service.
#[async_trait]
pub trait SceneSource: Send + Sync {
    async fn fetch_scene(&self) -> Result<DocumentSnapshot, ResolutionError>;
}

pub struct MissingSceneSource;

#[async_trait]
impl SceneSource for MissingSceneSource {
    async fn fetch_scene(&self) -> Result<DocumentSnapshot, ResolutionError> {
        Err(ResolutionError::Network(
            "processing service is not configured".to_string(),
        ))
    }
}

/// Fetches the processed scene with `GET {service_url}/scene`.
pub struct HttpSceneSource {
    http: Client,
    scene_url: Url,
}

impl HttpSceneSource {
    pub fn new(service_url: &str) -> anyhow::Result<Self> {
        Self::with_client(Client::new(), service_url)
    }

    pub fn with_client(http: Client, service_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            scene_url: scene_url_for(service_url)?,
        })
    }

    pub fn scene_url(&self) -> &Url {
        &self.scene_url
    }
}

fn scene_url_for(service_url: &str) -> anyhow::Result<Url> {
    let mut base = Url::parse(service_url.trim())
        .with_context(|| format!("invalid scene service url '{service_url}'"))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(anyhow!(
            "scene service url must start with http:// or https://, got '{service_url}'"
        ));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("scene")
        .with_context(|| format!("cannot build scene url from '{service_url}'"))
}

#[async_trait]
impl SceneSource for HttpSceneSource {
    async fn fetch_scene(&self) -> Result<DocumentSnapshot, ResolutionError> {
        let response = self
            .http
            .get(self.scene_url.clone())
            .send()
            .await
            .map_err(|err| ResolutionError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiError>().await {
                Ok(detail) => format!("scene service returned {status}: {detail}"),
                Err(_) => format!("scene service returned {status}"),
            };
            return Err(ResolutionError::Network(message));
        }

        let body = response
            .text()
            .await
            .map_err(|err| ResolutionError::Network(err.to_string()))?;
        DocumentSnapshot::from_json_str(&body)
            .map_err(|err| ResolutionError::ResultParse(err.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/scene_source_tests.rs"]
mod tests;
