//! reqwest-backed [`RemoteGateway`].

use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use async_trait::async_trait;
use reqwest::Client;
use sgc_sync::{GatewayAck, GatewayError, GatewayRequest, RemoteGateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Header the backend deduplicates deliveries on.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// HTTP client for the vendedor sync endpoints.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    config: CloudConfig,
    access_token: Arc<RwLock<Option<String>>>,
}

impl HttpGateway {
    pub fn new(config: CloudConfig) -> CloudResult<Self> {
        if config.api_base_url.trim().is_empty() {
            return Err(CloudError::Config("api_base_url is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            config,
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Sets the session token sent as `Authorization: Bearer`.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.access_token.write().await = Some(token.into());
    }

    pub async fn clear_token(&self) {
        *self.access_token.write().await = None;
    }

    pub fn endpoint(&self, request: &GatewayRequest) -> String {
        format!(
            "{}/api/vendedor/sync/{}",
            self.config.api_base_url.trim_end_matches('/'),
            request.kind
        )
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn submit(&self, request: GatewayRequest) -> Result<GatewayAck, GatewayError> {
        let url = self.endpoint(&request);
        let mut builder = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
            .json(&request);
        if let Some(token) = self.access_token.read().await.as_deref() {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await.map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = GatewayError::from_status(status.as_u16(), body);
            warn!("POST {url} failed: {err}");
            return Err(err);
        }

        let ack: GatewayAck = resp
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(format!("invalid acknowledgement: {e}")))?;
        if ack.entity_id != request.entity_id {
            return Err(GatewayError::Protocol(format!(
                "acknowledgement for entity {} does not match {}",
                ack.entity_id, request.entity_id
            )));
        }
        debug!("{} item for entity {} accepted at v{}", request.kind, ack.entity_id, ack.version);
        Ok(ack)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network(e.to_string())
    }
}
