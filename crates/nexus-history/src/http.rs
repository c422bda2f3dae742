use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use nexus_core::config::ClientConfig;
use nexus_core::error::{PersistenceError, Result};
use nexus_core::turn::ChatTurn;

use crate::store::HistoryGateway;

/// History gateway backed by the chat backend's REST API.
///
/// `GET` loads, `POST` saves (JSON array of turns), `DELETE` clears, all
/// on `{base_url}/api/history/{session_id}`.
pub struct HttpHistoryGateway {
    client: Client,
    url: String,
}

impl HttpHistoryGateway {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| PersistenceError::Load(format!("HTTP client setup failed: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Share an existing client (and its connection pool).
    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            url: config.history_url(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HistoryGateway for HttpHistoryGateway {
    async fn load(&self) -> Result<Vec<ChatTurn>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PersistenceError::Load(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url = %self.url, "No stored history");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(PersistenceError::Status {
                status: status.as_u16(),
            }
            .into());
        }

        let body = resp
            .text()
            .await
            .map_err(|e| PersistenceError::Load(e.to_string()))?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(Vec::new());
        }
        let turns: Vec<ChatTurn> = serde_json::from_str(&body)?;
        Ok(turns)
    }

    async fn save(&self, turns: &[ChatTurn]) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(turns)
            .send()
            .await
            .map_err(|e| PersistenceError::Save(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PersistenceError::Status {
                status: resp.status().as_u16(),
            }
            .into());
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let resp = self
            .client
            .delete(&self.url)
            .send()
            .await
            .map_err(|e| PersistenceError::Clear(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(PersistenceError::Status {
                status: status.as_u16(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::error::NexusError;

    #[test]
    fn url_from_config() {
        let config = ClientConfig::new()
            .with_base_url("http://127.0.0.1:9")
            .with_session_id("abc");
        let gateway = HttpHistoryGateway::new(&config).unwrap();
        assert_eq!(gateway.url(), "http://127.0.0.1:9/api/history/abc");
    }

    #[tokio::test]
    async fn unreachable_backend_is_persistence_error() {
        // Port 9 (discard) is not expected to be listening.
        let config = ClientConfig::new()
            .with_base_url("http://127.0.0.1:9")
            .with_connect_timeout(std::time::Duration::from_millis(500));
        let gateway = HttpHistoryGateway::new(&config).unwrap();

        let err = gateway.load().await.unwrap_err();
        assert!(matches!(err, NexusError::Persistence(PersistenceError::Load(_))));
        let err = gateway.save(&[ChatTurn::user("q")]).await.unwrap_err();
        assert!(matches!(err, NexusError::Persistence(PersistenceError::Save(_))));
        let err = gateway.clear().await.unwrap_err();
        assert!(matches!(err, NexusError::Persistence(PersistenceError::Clear(_))));
    }
}
