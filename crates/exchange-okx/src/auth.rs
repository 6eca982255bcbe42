//! Request signing for the OKX v5 API.
//!
//! Both the websocket login and signed REST calls use
//! `base64(HMAC-SHA256(secret, timestamp + method + request_path + body))`.
//! The websocket login signs the fixed path `GET /users/self/verify` with a
//! unix-seconds timestamp; REST calls use an ISO-8601 millisecond timestamp.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use position_guard_core::ApiCredentials;
use serde_json::{json, Value};
use sha2::Sha256;

use crate::error::OkxError;

type HmacSha256 = Hmac<Sha256>;

const VERIFY_PATH: &str = "/users/self/verify";

/// Signs an arbitrary prehash string.
///
/// # Errors
/// Returns an error if the HMAC key cannot be initialised.
pub fn sign(secret: &str, prehash: &str) -> Result<String, OkxError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| OkxError::Signing(format!("invalid key length: {e}")))?;
    mac.update(prehash.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// Signature for the websocket login frame.
///
/// # Errors
/// Returns an error if signing fails.
pub fn login_signature(secret: &str, timestamp: &str) -> Result<String, OkxError> {
    sign(secret, &format!("{timestamp}GET{VERIFY_PATH}"))
}

/// Signature for a REST request. `request_path` includes the query string.
///
/// # Errors
/// Returns an error if signing fails.
pub fn rest_signature(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, OkxError> {
    sign(secret, &format!("{timestamp}{method}{request_path}{body}"))
}

#[must_use]
pub fn ws_timestamp(now: DateTime<Utc>) -> String {
    now.timestamp().to_string()
}

#[must_use]
pub fn rest_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Builds `{"op":"login","args":[{apiKey, passphrase, timestamp, sign}]}`.
///
/// # Errors
/// Returns an error if signing fails.
pub fn login_frame(credentials: &ApiCredentials, now: DateTime<Utc>) -> Result<Value, OkxError> {
    let timestamp = ws_timestamp(now);
    let signature = login_signature(credentials.secret(), &timestamp)?;
    Ok(json!({
        "op": "login",
        "args": [{
            "apiKey": credentials.api_key,
            "passphrase": credentials.passphrase(),
            "timestamp": timestamp,
            "sign": signature,
        }]
    }))
}
