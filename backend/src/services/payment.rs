//! Payment webhook processing for Xendit, Maya and Stripe
//!
//! Providers are told `{"ok": true}` for anything we cannot match to an
//! order; only authentication failures are surfaced as errors.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::PaymentsConfig;
use crate::error::{AppError, AppResult};
use shared::{maya_payment_status, parse_order_reference, xendit_payment_status, PaymentStatus};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct PaymentService {
    db: PgPool,
    config: PaymentsConfig,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub ok: bool,
}

impl WebhookAck {
    fn ok() -> Self {
        Self { ok: true }
    }
}

/// Payment change extracted from a provider payload
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub order_id: Uuid,
    pub status: PaymentStatus,
    pub transaction_ref: Option<String>,
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
}

fn order_id_from(metadata_id: Option<&str>, reference: Option<&str>) -> Option<Uuid> {
    metadata_id
        .and_then(|id| Uuid::parse_str(id).ok())
        .or_else(|| reference.and_then(parse_order_reference))
}

/// Read a Xendit callback body
pub fn parse_xendit(payload: &Value) -> Option<PaymentUpdate> {
    let data = payload.get("data").unwrap_or(payload);
    let status = xendit_payment_status(str_at(data, &["status"])?)?;
    let order_id = order_id_from(
        str_at(data, &["metadata", "order_id"]),
        str_at(data, &["reference_id"]).or_else(|| str_at(data, &["external_id"])),
    )?;
    Some(PaymentUpdate {
        order_id,
        status,
        transaction_ref: str_at(data, &["id"]).map(str::to_string),
    })
}

/// Read a Maya callback body
pub fn parse_maya(payload: &Value) -> Option<PaymentUpdate> {
    let raw_status = str_at(payload, &["paymentStatus"]).or_else(|| str_at(payload, &["status"]))?;
    let status = maya_payment_status(raw_status)?;
    let order_id = order_id_from(
        str_at(payload, &["metadata", "order_id"]),
        str_at(payload, &["requestReferenceNumber"]),
    )?;
    Some(PaymentUpdate {
        order_id,
        status,
        transaction_ref: str_at(payload, &["id"]).map(str::to_string),
    })
}

/// Read a Stripe event; only completed checkout sessions matter
pub fn parse_stripe(payload: &Value) -> Option<PaymentUpdate> {
    if str_at(payload, &["type"])? != "checkout.session.completed" {
        return None;
    }
    let session = payload.get("data")?.get("object")?;
    let order_id = order_id_from(
        str_at(session, &["metadata", "order_id"]),
        str_at(session, &["client_reference_id"]),
    )?;
    Some(PaymentUpdate {
        order_id,
        status: PaymentStatus::Paid,
        transaction_ref: str_at(session, &["id"]).map(str::to_string),
    })
}

fn stripe_mac(secret: &str, timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(mac)
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`)
pub fn verify_stripe_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now_unix: i64,
) -> bool {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    let Ok(issued) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now_unix - issued).abs() > tolerance_secs {
        return false;
    }

    let Some(mac) = stripe_mac(secret, timestamp, body) else {
        return false;
    };
    signatures
        .iter()
        .filter_map(|s| hex::decode(s).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok())
}

impl PaymentService {
    pub fn new(db: PgPool, config: PaymentsConfig) -> Self {
        Self { db, config }
    }

    async fn apply(&self, provider: &str, update: PaymentUpdate) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2,
                transaction_ref = COALESCE($3, transaction_ref),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(update.order_id)
        .bind(update.status.as_str())
        .bind(&update.transaction_ref)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(provider, order_id = %update.order_id, "Webhook for unknown order ignored");
        } else {
            tracing::info!(
                provider,
                order_id = %update.order_id,
                status = update.status.as_str(),
                "Payment status updated"
            );
        }
        Ok(())
    }

    pub async fn handle_xendit(&self, callback_token: Option<&str>, body: &[u8]) -> AppResult<WebhookAck> {
        if let Some(expected) = self.config.xendit_webhook_token.as_deref() {
            if callback_token != Some(expected) {
                return Err(AppError::Forbidden("Invalid callback token".to_string()));
            }
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::ValidationError(format!("Invalid JSON payload: {}", e)))?;
        match parse_xendit(&payload) {
            Some(update) => self.apply("xendit", update).await?,
            None => tracing::debug!("Xendit webhook without a usable status or order"),
        }
        Ok(WebhookAck::ok())
    }

    pub async fn handle_maya(&self, token: Option<&str>, body: &[u8]) -> AppResult<WebhookAck> {
        if let (Some(expected), Some(given)) = (self.config.maya_webhook_token.as_deref(), token) {
            if expected != given {
                return Err(AppError::Forbidden("Invalid webhook token".to_string()));
            }
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::ValidationError(format!("Invalid JSON payload: {}", e)))?;
        match parse_maya(&payload) {
            Some(update) => self.apply("maya", update).await?,
            None => tracing::debug!("Maya webhook without a usable status or order"),
        }
        Ok(WebhookAck::ok())
    }

    pub async fn handle_stripe(&self, signature: Option<&str>, body: &[u8]) -> AppResult<WebhookAck> {
        if let Some(secret) = self.config.stripe_webhook_secret.as_deref() {
            let valid = signature
                .map(|header| {
                    verify_stripe_signature(
                        header,
                        body,
                        secret,
                        self.config.stripe_tolerance_secs,
                        Utc::now().timestamp(),
                    )
                })
                .unwrap_or(false);
            if !valid {
                tracing::warn!("Stripe webhook signature rejected");
                return Err(AppError::InvalidSignature);
            }
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::ValidationError(format!("Invalid JSON payload: {}", e)))?;
        if let Some(update) = parse_stripe(&payload) {
            self.apply("stripe", update).await?;
        }
        Ok(WebhookAck::ok())
    }
}
