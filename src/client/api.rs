//! Reconciliation API Client
//!
//! This module provides the async transport the sync engine uses to deliver
//! queued operations to `/api/sync` and to query whether a token has already
//! been processed.

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use crate::client::error::DeliveryError;
use crate::shared::sync::{SyncErrorBody, SyncRequest, SyncResponse, SyncStatusResponse};

/// Delivery seam between the sync engine and the remote endpoint
#[async_trait]
pub trait ReconciliationTransport: Send + Sync {
    /// Send one operation; `Ok` means the server confirmed persistence
    async fn deliver(&self, request: &SyncRequest) -> Result<SyncResponse, DeliveryError>;

    /// Ask whether an operation token has been processed
    async fn check(&self, client_uuid: &str) -> Result<SyncStatusResponse, DeliveryError>;
}

/// HTTP client for the reconciliation endpoint
#[derive(Debug, Clone)]
pub struct ReconciliationClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ReconciliationClient {
    /// Create a client with a per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeliveryError::from)?;
        Ok(Self::with_client(client, base_url, token))
    }

    /// Reuse an existing reqwest client
    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn health_url(&self) -> String {
        self.api_url("/health")
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turn a non-2xx response into a classified error
    async fn failure(response: Response) -> DeliveryError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<SyncErrorBody>(&text) {
            Ok(body) => body.describe(),
            Err(_) if text.trim().is_empty() => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            Err(_) => text,
        };
        DeliveryError::from_status(status.as_u16(), message)
    }
}

#[async_trait]
impl ReconciliationTransport for ReconciliationClient {
    async fn deliver(&self, request: &SyncRequest) -> Result<SyncResponse, DeliveryError> {
        let url = self.api_url("/api/sync");
        debug!(
            "POST {} table={} op={} client_uuid={}",
            url,
            request.table_name,
            request.operation.as_str(),
            request.client_uuid
        );

        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let status = response.status().as_u16();
        let body: SyncResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::transport(format!("Failed to parse response: {}", e)))?;

        if !body.success {
            return Err(DeliveryError::Validation {
                status,
                message: body
                    .message
                    .unwrap_or_else(|| "Server reported failure".to_string()),
            });
        }
        Ok(body)
    }

    async fn check(&self, client_uuid: &str) -> Result<SyncStatusResponse, DeliveryError> {
        let response = self
            .authorize(self.client.get(self.api_url("/api/sync")))
            .query(&[("client_uuid", client_uuid)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| DeliveryError::transport(format!("Failed to parse response: {}", e)))
    }
}
