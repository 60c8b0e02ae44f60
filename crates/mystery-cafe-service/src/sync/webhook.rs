//! Outbound reservation webhook.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use mystery_cafe_core::{ReservationChange, ReservationId, SyncSource};

use crate::crypto::hmac_sha256_hex;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Value of the payload's `type` field.
pub const PAYLOAD_TYPE: &str = "reservation_change";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Endpoint receiving the POST.
    pub url: String,
    /// Bearer token, if the endpoint requires one.
    pub token: Option<String>,
    /// Secret for the signature header, if signing is enabled.
    pub signing_secret: Option<String>,
}

/// Error type for webhook delivery.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("webhook rejected: {status} - {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The payload could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The body could not be signed.
    #[error("signing error: {0}")]
    Signing(String),
}

/// Body of a webhook call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Always [`PAYLOAD_TYPE`].
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// What happened to the reservation.
    pub change_type: ReservationChange,
    /// Affected reservation.
    pub reservation_id: ReservationId,
    /// Reservation snapshot.
    pub data: Value,
    /// When the notification was built.
    pub timestamp: DateTime<Utc>,
    /// Deployment sending it.
    pub source: SyncSource,
}

/// Webhook client.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    token: Option<String>,
    signing_secret: Option<String>,
    source: SyncSource,
}

impl WebhookNotifier {
    /// Create a notifier for `config`, labelling payloads with `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: WebhookConfig, source: SyncSource) -> Result<Self, WebhookError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: config.url,
            token: config.token,
            signing_secret: config.signing_secret,
            source,
        })
    }

    /// Build the payload for a reservation change.
    #[must_use]
    pub fn payload(
        &self,
        change: ReservationChange,
        reservation_id: ReservationId,
        data: Value,
    ) -> WebhookPayload {
        WebhookPayload {
            kind: PAYLOAD_TYPE,
            change_type: change,
            reservation_id,
            data,
            timestamp: Utc::now(),
            source: self.source,
        }
    }

    /// POST a payload and report the outcome.
    pub async fn deliver(&self, payload: &WebhookPayload) -> Result<(), WebhookError> {
        let body = serde_json::to_vec(payload)?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");

        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        if let Some(secret) = &self.signing_secret {
            let signature = hmac_sha256_hex(secret, &body)
                .map_err(|e| WebhookError::Signing(e.to_string()))?;
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            reservation_id = %payload.reservation_id,
            change = %payload.change_type,
            "Webhook delivered"
        );
        Ok(())
    }

    /// Best-effort delivery: failures are logged, never returned.
    pub async fn notify(
        &self,
        change: ReservationChange,
        reservation_id: ReservationId,
        data: Value,
    ) {
        let payload = self.payload(change, reservation_id, data);
        if let Err(e) = self.deliver(&payload).await {
            tracing::warn!(
                reservation_id = %reservation_id,
                change = %change,
                error = %e,
                "webhook delivery failed"
            );
        }
    }
}
