use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::plan::Feature;
use crate::domain::DomainError;
use crate::infrastructure::observability::record_upstream_request;

#[cfg(test)]
use mockall::automock;

/// Body field that carries the caller's key; never forwarded
const API_KEY_FIELD: &str = "apiKey";

/// Forwards a metered call to the service that implements the feature
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(
        &self,
        feature: Feature,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, DomainError>;
}

/// Upstream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Target URL per feature
    #[serde(default)]
    pub routes: BTreeMap<Feature, String>,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            routes: BTreeMap::new(),
        }
    }
}

/// Upstream client using reqwest
#[derive(Debug, Clone)]
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    routes: BTreeMap<Feature, String>,
}

impl HttpUpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        for feature in Feature::ALL {
            if !config.routes.contains_key(&feature) {
                warn!(feature = %feature, "No upstream configured; calls will fail");
            }
        }

        Ok(Self {
            client,
            routes: config.routes.clone(),
        })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn forward(
        &self,
        feature: Feature,
        mut body: serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        let url = self.routes.get(&feature).ok_or_else(|| {
            DomainError::upstream(feature.as_str(), "no upstream service configured")
        })?;

        if let Some(object) = body.as_object_mut() {
            object.remove(API_KEY_FIELD);
        }

        debug!(feature = %feature, url = %url, "Forwarding request upstream");
        let started = Instant::now();

        let result = async {
            let response = self
                .client
                .post(url)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    DomainError::upstream(feature.as_str(), format!("Request failed: {}", e))
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let error_body = response.text().await.unwrap_or_default();
                return Err(DomainError::upstream(
                    feature.as_str(),
                    format!("HTTP {}: {}", status, error_body),
                ));
            }

            response.json::<serde_json::Value>().await.map_err(|e| {
                DomainError::upstream(
                    feature.as_str(),
                    format!("Failed to parse response: {}", e),
                )
            })
        }
        .await;

        record_upstream_request(feature, result.is_ok(), started.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, feature: Feature, route: &str) -> HttpUpstreamClient {
        let mut routes = BTreeMap::new();
        routes.insert(feature, format!("{}{}", server.uri(), route));
        HttpUpstreamClient::new(&UpstreamConfig {
            timeout_secs: 5,
            routes,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_forward_strips_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/lyrics"))
            .and(body_json(json!({"prompt": "rain"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"lyrics": "la la"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Feature::LyricGenerations, "/lyrics");
        let response = client
            .forward(
                Feature::LyricGenerations,
                json!({"prompt": "rain", "apiKey": "cs_free_secret"}),
            )
            .await
            .unwrap();

        assert_eq!(response, json!({"lyrics": "la la"}));
    }

    #[tokio::test]
    async fn test_forward_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/music"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = client_for(&server, Feature::MusicGenerations, "/music");
        let result = client.forward(Feature::MusicGenerations, json!({})).await;

        match result {
            Err(DomainError::Upstream { service, message }) => {
                assert_eq!(service, "music_generations");
                assert!(message.contains("502"));
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forward_without_route() {
        let client = HttpUpstreamClient::new(&UpstreamConfig::default()).unwrap();

        let result = client.forward(Feature::TextGenerations, json!({})).await;
        assert!(matches!(result, Err(DomainError::Upstream { .. })));
    }

    #[test]
    fn test_config_defaults() {
        let config: UpstreamConfig = serde_json::from_str(
            r#"{"routes": {"code_translations": "http://translator:8000/translate"}}"#,
        )
        .unwrap();

        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.routes.len(), 1);
    }
}
