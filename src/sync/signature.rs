// Request signing for the desktop channel
//
// signature = hex(HMAC-SHA256(key = token || timestamp || nonce, message = raw body))
//
// Inbound requests are checked in a fixed order and rejected at the first
// failing check: headers, token, timestamp drift, nonce replay, signature.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use axum::http::HeaderMap;

use super::nonce::{MemoryNonceStore, NonceStore, NONCE_TTL};
use crate::config::DesktopConfig;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_HEADER: &str = "x-spectra-token";
pub const TIMESTAMP_HEADER: &str = "x-spectra-timestamp";
pub const NONCE_HEADER: &str = "x-spectra-nonce";
pub const SIGNATURE_HEADER: &str = "x-spectra-signature";

/// Which check family rejected a signed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureRejection {
    #[error("missing signature headers")]
    MissingHeaders,
    #[error("invalid token")]
    InvalidToken,
    #[error("timestamp outside allowed drift")]
    StaleTimestamp,
    #[error("nonce already used")]
    ReplayedNonce,
    #[error("invalid signature")]
    InvalidSignature,
}

fn keyed_mac(token: &str, timestamp: &str, nonce: &str) -> HmacSha256 {
    let key = format!("{}{}{}", token, timestamp, nonce);
    HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length")
}

/// Hex signature of `body`
pub fn sign(token: &str, timestamp: &str, nonce: &str, body: &[u8]) -> String {
    let mut mac = keyed_mac(token, timestamp, nonce);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// 16 random bytes, hex encoded
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The four signing headers for one outbound request
pub fn signed_headers(token: &str, body: &[u8]) -> [(&'static str, String); 4] {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let nonce = generate_nonce();
    let signature = sign(token, &timestamp, &nonce, body);
    [
        (TOKEN_HEADER, token.to_string()),
        (TIMESTAMP_HEADER, timestamp),
        (NONCE_HEADER, nonce),
        (SIGNATURE_HEADER, signature),
    ]
}

/// Verifies inbound desktop requests
pub struct SignatureVerifier {
    public_key: String,
    max_drift: i64,
    nonces: Arc<dyn NonceStore>,
    nonce_ttl: Duration,
}

impl SignatureVerifier {
    pub fn new(public_key: impl Into<String>, max_drift: i64) -> Self {
        Self {
            public_key: public_key.into(),
            max_drift,
            nonces: Arc::new(MemoryNonceStore::new()),
            nonce_ttl: NONCE_TTL,
        }
    }

    pub fn from_config(config: &DesktopConfig) -> Self {
        Self::new(config.public_key.clone(), config.max_drift)
    }

    pub fn with_nonce_store(mut self, nonces: Arc<dyn NonceStore>) -> Self {
        self.nonces = nonces;
        self
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureRejection> {
        self.verify_at(headers, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<(), SignatureRejection> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        };
        let (token, timestamp, nonce, signature) = match (
            header(TOKEN_HEADER),
            header(TIMESTAMP_HEADER),
            header(NONCE_HEADER),
            header(SIGNATURE_HEADER),
        ) {
            (Some(t), Some(ts), Some(n), Some(s)) => (t, ts, n, s),
            _ => return Err(SignatureRejection::MissingHeaders),
        };

        if self.public_key.is_empty() || token != self.public_key {
            return Err(SignatureRejection::InvalidToken);
        }

        let sent_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureRejection::StaleTimestamp)?;
        if now.abs_diff(sent_at) > self.max_drift.max(0) as u64 {
            return Err(SignatureRejection::StaleTimestamp);
        }

        if self.nonces.seen(nonce) {
            return Err(SignatureRejection::ReplayedNonce);
        }
        self.nonces.remember(nonce, self.nonce_ttl);

        let expected = hex::decode(signature).map_err(|_| SignatureRejection::InvalidSignature)?;
        let mut mac = keyed_mac(token, timestamp, nonce);
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureRejection::InvalidSignature)
    }
}
