//! Payment gateway adapter: hosted-payment session creation, status
//! polling, the gateway-status-to-core mapping, and webhook signature
//! verification.
//!
//! The gateway vocabulary (`capture`, `settlement`, `deny`, `expire`,
//! fraud status `challenge`) is the seam between the external provider and
//! the transaction state machine; the mapping here is exhaustive and must
//! stay stable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use strum::{Display, EnumString};
use tracing::instrument;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::models::PaymentStatus;

/// Raw transaction status values the gateway reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GatewayTransactionStatus {
    Capture,
    Settlement,
    Pending,
    Authorize,
    Deny,
    Cancel,
    Expire,
}

/// Maps the gateway's vocabulary onto the core's payment status. Pure and
/// exhaustive; `deny`/`cancel` collapse to failed, `expire` stands alone so
/// the ledger can distinguish abandonment from rejection.
pub fn map_gateway_status(status: GatewayTransactionStatus) -> PaymentStatus {
    match status {
        GatewayTransactionStatus::Capture | GatewayTransactionStatus::Settlement => {
            PaymentStatus::Paid
        }
        GatewayTransactionStatus::Pending | GatewayTransactionStatus::Authorize => {
            PaymentStatus::Pending
        }
        GatewayTransactionStatus::Deny | GatewayTransactionStatus::Cancel => PaymentStatus::Failed,
        GatewayTransactionStatus::Expire => PaymentStatus::Expired,
    }
}

/// Customer details forwarded to the hosted payment page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CustomerDetails {
    pub first_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Request to open a hosted-payment session.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub order_id: String,
    pub gross_amount: i64,
    pub customer: CustomerDetails,
    pub enabled_payments: Vec<String>,
}

/// Hosted-payment-page handle issued by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewaySession {
    pub token: String,
    pub redirect_url: String,
}

/// Status report for an order, from a poll or a webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStatusReport {
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub transaction_status: GatewayTransactionStatus,
    pub fraud_status: Option<String>,
    pub payment_type: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted-payment session for the given order.
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError>;

    /// Polls the gateway for the current status of an order.
    async fn fetch_status(&self, order_id: &str) -> Result<GatewayStatusReport, ServiceError>;
}

/// HTTP client for a Snap-style gateway API. The server key doubles as the
/// Basic auth username and the webhook signature secret.
#[derive(Debug, Clone)]
pub struct SnapGateway {
    http: reqwest::Client,
    base_url: String,
    server_key: String,
}

#[derive(Debug, Deserialize)]
struct SnapSessionResponse {
    token: String,
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct SnapStatusResponse {
    order_id: String,
    transaction_id: Option<String>,
    transaction_status: GatewayTransactionStatus,
    fraud_status: Option<String>,
    payment_type: Option<String>,
}

impl SnapGateway {
    pub fn new(base_url: String, server_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            server_key,
        }
    }
}

#[async_trait]
impl PaymentGateway for SnapGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let body = serde_json::json!({
            "transaction_details": {
                "order_id": request.order_id,
                "gross_amount": request.gross_amount,
            },
            "customer_details": request.customer,
            "enabled_payments": request.enabled_payments,
        });

        let response = self
            .http
            .post(format!("{}/snap/v1/transactions", self.base_url))
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GatewaySessionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewaySessionError(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        let session: SnapSessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewaySessionError(e.to_string()))?;

        Ok(GatewaySession {
            token: session.token,
            redirect_url: session.redirect_url,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_status(&self, order_id: &str) -> Result<GatewayStatusReport, ServiceError> {
        let response = self
            .http
            .get(format!("{}/v2/{}/status", self.base_url, order_id))
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(|e| ServiceError::GatewaySessionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewaySessionError(format!(
                "gateway status query returned {}",
                response.status()
            )));
        }

        let status: SnapStatusResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewaySessionError(e.to_string()))?;

        Ok(GatewayStatusReport {
            order_id: status.order_id,
            transaction_id: status.transaction_id,
            transaction_status: status.transaction_status,
            fraud_status: status.fraud_status,
            payment_type: status.payment_type,
        })
    }
}

/// Verifies a webhook signature: SHA-512 over
/// `order_id + status_code + gross_amount + server_key`, hex-encoded.
pub fn verify_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    signature_key: &str,
    server_key: &str,
) -> bool {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    let expected = hex::encode(hasher.finalize());
    constant_time_eq(&expected, signature_key)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Computes the signature a well-behaved gateway would attach. Exposed for
/// the test harness.
pub fn compute_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}
