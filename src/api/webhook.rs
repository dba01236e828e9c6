//! Processor webhook handler
//!
//! POST /webhooks/processor — raw body for HMAC signature verification.
//!
//! The notification body is never trusted beyond the payment id it carries:
//! reconciliation re-fetches the authoritative payment from the processor.
//! Delivery is at-least-once; the conditional terminal transition makes
//! replays and webhook/poll races converge on one recorded transition.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;
use crate::reconcile;
use crate::state::AppState;

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let sig_header = match headers.get("x-signature").and_then(|v| v.to_str().ok()) {
        Some(s) => s,
        None => {
            tracing::warn!("Missing x-signature header");
            return StatusCode::BAD_REQUEST;
        }
    };

    if let Err(e) = verify_webhook_signature(&body, sig_header, &state.config.webhook_secret) {
        tracing::warn!(error = e, "Webhook signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%e, "Failed to parse webhook JSON");
            return StatusCode::BAD_REQUEST;
        }
    };

    if event["type"].as_str() != Some("payment") {
        tracing::debug!(
            notification_type = event["type"].as_str().unwrap_or(""),
            "Ignoring non-payment notification"
        );
        return StatusCode::OK;
    }

    // The processor sends the id as a string or a number depending on the
    // notification version.
    let payment_id = match &event["data"]["id"] {
        serde_json::Value::String(s) if !s.is_empty() => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => {
            tracing::warn!("Payment notification missing data.id");
            return StatusCode::BAD_REQUEST;
        }
    };

    match reconcile::sync_by_payment(&state, &payment_id).await {
        Ok(outcome) => {
            tracing::info!(payment_id = %payment_id, ?outcome, "Webhook reconciled");
            StatusCode::OK
        }
        // Unknown payment or order: acknowledge so the processor stops
        // retrying a notification we can never act on.
        Err(AppError::NotFound(msg)) => {
            tracing::warn!(payment_id = %payment_id, %msg, "Webhook for unknown payment");
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(payment_id = %payment_id, error = %e, "Webhook reconciliation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Verify the webhook HMAC-SHA256 signature.
///
/// Header format: `ts=<unix seconds>,v1=<hex hmac>` where the MAC covers
/// `"{ts}.{body}"`. Events older than 5 minutes are rejected.
fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        if let Some(t) = part.trim().strip_prefix("ts=") {
            timestamp = t;
        } else if let Some(v) = part.trim().strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err("Invalid x-signature header");
    }

    let body = std::str::from_utf8(payload).map_err(|_| "Body is not valid UTF-8")?;
    let signed_payload = format!("{timestamp}.{body}");
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(signed_payload.as_bytes());

    let sig_bytes = hex::decode(signature).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Webhook signature mismatch")?;

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts).abs() > 300 {
        return Err("Webhook timestamp too old");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn sign(body: &str, ts: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{ts}.{body}").as_bytes());
        format!("ts={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let body = r#"{"type":"payment","data":{"id":"123"}}"#;
        let header = sign(body, chrono::Utc::now().timestamp());

        assert!(verify_webhook_signature(body.as_bytes(), &header, SECRET).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let header = sign(r#"{"a":1}"#, chrono::Utc::now().timestamp());

        assert!(verify_webhook_signature(br#"{"a":2}"#, &header, SECRET).is_err());
    }

    #[test]
    fn wrong_secret_fails() {
        let body = r#"{"a":1}"#;
        let header = sign(body, chrono::Utc::now().timestamp());

        assert!(verify_webhook_signature(body.as_bytes(), &header, "other").is_err());
    }

    #[test]
    fn stale_timestamp_fails() {
        let body = r#"{"a":1}"#;
        let header = sign(body, chrono::Utc::now().timestamp() - 600);

        assert_eq!(
            verify_webhook_signature(body.as_bytes(), &header, SECRET),
            Err("Webhook timestamp too old")
        );
    }

    #[test]
    fn non_utf8_body_is_rejected() {
        // A signature over the empty string must never validate a body that
        // is not valid UTF-8.
        let header = sign("", chrono::Utc::now().timestamp());

        assert_eq!(
            verify_webhook_signature(&[0xff, 0xfe], &header, SECRET),
            Err("Body is not valid UTF-8")
        );
    }

    #[test]
    fn malformed_header_fails() {
        assert!(verify_webhook_signature(b"{}", "v1=abc", SECRET).is_err());
        assert!(verify_webhook_signature(b"{}", "ts=123", SECRET).is_err());
        assert!(verify_webhook_signature(b"{}", "", SECRET).is_err());
    }
}
