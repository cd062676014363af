// Desktop synchronization
//
// Pushes a fingerprinted snapshot of the route and model graph to the desktop
// tool, and verifies requests coming back from it.
//
// - signature:  HMAC signing and inbound verification
// - nonce:      replay protection store
// - store:      last-synced fingerprint persistence
// - payload:    staged payload assembly
// - collectors: model discovery

pub mod collectors;
pub mod nonce;
pub mod payload;
pub mod signature;
pub mod store;

pub use collectors::{collect_models, ModelDescriptor, ModelField};
pub use nonce::{MemoryNonceStore, NonceStore, NONCE_TTL};
pub use payload::{assemble, PayloadContext, PayloadDraft, SyncPayload, SyncRoute, SyncStats};
pub use signature::{sign, SignatureRejection, SignatureVerifier};
pub use store::{FileFingerprintStore, FingerprintStore, MemoryFingerprintStore};

use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DesktopConfig;
use crate::error::ConsoleError;

pub const MAX_ATTEMPTS: u32 = 3;
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    /// Desktop sync switched off
    Disabled,
    /// Fingerprint matches the last successful sync
    Unchanged,
    Synced,
    /// Every attempt failed; nothing persisted
    Failed,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Disabled => write!(f, "disabled"),
            SyncOutcome::Unchanged => write!(f, "unchanged"),
            SyncOutcome::Synced => write!(f, "synced"),
            SyncOutcome::Failed => write!(f, "failed"),
        }
    }
}

pub struct SyncChannel {
    config: DesktopConfig,
    client: Client,
    store: Arc<dyn FingerprintStore>,
}

impl SyncChannel {
    pub fn new(config: &DesktopConfig) -> Result<Self, ConsoleError> {
        let client = Client::builder()
            .timeout(SYNC_TIMEOUT)
            .pool_max_idle_per_host(2)
            .build()?;
        Ok(Self {
            config: config.clone(),
            client,
            store: Arc::new(FileFingerprintStore::new(config.fingerprint_path.clone())),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn FingerprintStore>) -> Self {
        self.store = store;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Push `payload` unless it matches what the desktop already has
    pub async fn sync(&self, payload: &SyncPayload) -> SyncOutcome {
        if !self.config.enabled {
            return SyncOutcome::Disabled;
        }
        if self.store.load().as_deref() == Some(payload.fingerprint.as_str()) {
            tracing::debug!(fingerprint = %payload.fingerprint, "desktop already up to date");
            return SyncOutcome::Unchanged;
        }
        self.transmit(payload).await
    }

    /// Push `payload` even when the fingerprint is unchanged
    pub async fn force_sync(&self, payload: &SyncPayload) -> SyncOutcome {
        if !self.config.enabled {
            return SyncOutcome::Disabled;
        }
        self.transmit(payload).await
    }

    async fn transmit(&self, payload: &SyncPayload) -> SyncOutcome {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize sync payload");
                return SyncOutcome::Failed;
            }
        };
        let url = format!("{}/ingest", self.config.url.trim_end_matches('/'));

        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self
                .client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
            // fresh timestamp and nonce per attempt
            for (name, value) in signature::signed_headers(&self.config.public_key, &body) {
                request = request.header(name, value);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    if let Err(e) = self.store.save(&payload.fingerprint) {
                        tracing::warn!(error = %e, "failed to persist sync fingerprint");
                    }
                    tracing::info!(attempt, routes = payload.routes.len(), fingerprint = %payload.fingerprint, "synced with desktop");
                    return SyncOutcome::Synced;
                }
                Ok(response) => {
                    tracing::warn!(attempt, status = response.status().as_u16(), url = %url, "desktop rejected sync");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, url = %url, "desktop sync request failed");
                }
            }
        }

        tracing::warn!(attempts = MAX_ATTEMPTS, "giving up on desktop sync");
        SyncOutcome::Failed
    }
}
