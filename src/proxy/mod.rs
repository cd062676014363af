// In-process request proxy
//
// Executes operator commands against the host's own router, under a resolved
// identity, and captures the response.
//
// - rate_limit: fixed-window limiter keyed by caller address
// - target:     URI template substitution and query encoding
// - sanitize:   header stripping and response masking

pub mod rate_limit;
pub mod sanitize;
pub mod target;

pub use rate_limit::RateLimiter;
pub use sanitize::{mask_fields, strip_headers, MASK};
pub use target::build_target;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;
use tower::ServiceExt;

use crate::auth::{AuthMode, IdentityBroker, Principal};
use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use crate::host::HostApp;
use crate::models::{ExecutionCommand, ExecutionResult, HeaderValues};

/// Responses larger than this are rejected instead of buffered
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Marker extension carried by every synthetic request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxiedRequest;

/// Who is asking the console to execute a request
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub peer: Option<SocketAddr>,
    pub principal: Option<Principal>,
}

impl CallerContext {
    /// Rate-limit key: the caller's IP address
    pub fn address(&self) -> String {
        self.peer
            .map(|peer| peer.ip().to_string())
            .unwrap_or_else(|| "local".to_string())
    }
}

impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            peer: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
            principal: parts.extensions.get::<Principal>().cloned(),
        })
    }
}

pub struct RequestProxy {
    host: HostApp,
    broker: IdentityBroker,
    limiter: RateLimiter,
    strip_headers: Vec<String>,
    mask_fields: Vec<String>,
}

impl RequestProxy {
    pub fn new(host: HostApp, broker: IdentityBroker, config: &ConsoleConfig) -> Self {
        Self {
            host,
            broker,
            limiter: RateLimiter::from_config(&config.rate_limit),
            strip_headers: config.strip_headers.clone(),
            mask_fields: config.mask_fields.clone(),
        }
    }

    pub async fn execute(
        &self,
        cmd: &ExecutionCommand,
        caller: &CallerContext,
    ) -> Result<ExecutionResult, ConsoleError> {
        self.limiter
            .hit(&caller.address())
            .map_err(|retry_after| ConsoleError::RateLimited { retry_after })?;

        let mode = AuthMode::from(cmd);
        let principal = self.broker.authenticate(&mode, caller.principal.as_ref());
        if principal.is_none() && !matches!(mode, AuthMode::Current) {
            tracing::debug!(mode = ?cmd.auth_mode, "identity not resolved, dispatching unauthenticated");
        }

        let target = build_target(&cmd.endpoint, cmd.method, &cmd.path_params, &cmd.query)?;
        let request = self.synthesize(cmd, &target, principal, caller.peer)?;

        let started = Instant::now();
        let router = self.host.router();
        let dispatched = tokio::spawn(async move {
            let response = match router.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            let (parts, body) = response.into_parts();
            let bytes = axum::body::to_bytes(body, MAX_RESPONSE_BYTES).await;
            (parts, bytes)
        })
        .await;

        let (parts, bytes) = match dispatched {
            Ok((parts, Ok(bytes))) => (parts, bytes),
            Ok((_, Err(e))) => {
                return Err(ConsoleError::Dispatch(format!("failed to read response body: {}", e)))
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::warn!(method = %cmd.method, target = %target, %message, "handler panicked");
                return Err(ConsoleError::Dispatch(message));
            }
            Err(e) => return Err(ConsoleError::Dispatch(e.to_string())),
        };
        let time_ms = (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;

        let mut body = decode_body(&bytes);
        mask_fields(&mut body, &self.mask_fields);

        tracing::info!(
            method = %cmd.method,
            target = %target,
            status = parts.status.as_u16(),
            elapsed_ms = time_ms,
            "executed request"
        );

        Ok(ExecutionResult {
            status: parts.status.as_u16(),
            time_ms,
            size_bytes: bytes.len(),
            headers: self.collect_headers(&parts.headers),
            body,
        })
    }

    fn synthesize(
        &self,
        cmd: &ExecutionCommand,
        target: &str,
        principal: Option<Principal>,
        peer: Option<SocketAddr>,
    ) -> Result<Request, ConsoleError> {
        let headers = strip_headers(&cmd.headers, &self.strip_headers);
        let has = |name: &str| headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name));

        let mut builder = axum::http::Request::builder().method(cmd.method.to_http()).uri(target);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !has("accept") {
            builder = builder.header(header::ACCEPT, "application/json");
        }

        let body = match (&cmd.body, cmd.method.is_safe()) {
            (_, true) | (None, false) | (Some(Value::Null), false) => Body::empty(),
            (Some(Value::String(raw)), false) => Body::from(raw.clone()),
            (Some(json), false) => {
                if !has("content-type") {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                }
                Body::from(serde_json::to_vec(json)?)
            }
        };

        let mut request = builder
            .body(body)
            .map_err(|e| ConsoleError::InvalidRequest(e.to_string()))?;
        let extensions = request.extensions_mut();
        extensions.insert(ProxiedRequest);
        if let Some(principal) = principal {
            extensions.insert(principal);
        }
        if let Some(peer) = peer {
            extensions.insert(ConnectInfo(peer));
        }
        Ok(request)
    }

    fn collect_headers(&self, headers: &HeaderMap) -> BTreeMap<String, HeaderValues> {
        let mut collected = BTreeMap::new();
        for name in headers.keys() {
            let masked = sanitize::is_listed(name.as_str(), &self.mask_fields);
            let mut values: Vec<String> = headers
                .get_all(name)
                .iter()
                .map(|v| {
                    if masked {
                        MASK.to_string()
                    } else {
                        String::from_utf8_lossy(v.as_bytes()).into_owned()
                    }
                })
                .collect();
            let entry = if values.len() == 1 {
                HeaderValues::One(values.remove(0))
            } else {
                HeaderValues::Many(values)
            };
            collected.insert(name.as_str().to_string(), entry);
        }
        collected
    }
}

/// JSON when it parses, text when it is UTF-8, base64 otherwise
pub fn decode_body(bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    if let Ok(json) = serde_json::from_slice::<Value>(bytes) {
        return json;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => json!({
            "encoding": "base64",
            "data": general_purpose::STANDARD.encode(bytes),
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_decoding_fallbacks() {
        assert_eq!(decode_body(&Bytes::from_static(b"")), Value::Null);
        assert_eq!(decode_body(&Bytes::from_static(br#"{"ok":true}"#)), json!({ "ok": true }));
        assert_eq!(decode_body(&Bytes::from_static(b"plain text")), json!("plain text"));
        assert_eq!(
            decode_body(&Bytes::from_static(&[0xff, 0xfe, 0x00])),
            json!({ "encoding": "base64", "data": "//4A" })
        );
    }

    #[test]
    fn caller_without_peer_is_local() {
        assert_eq!(CallerContext::default().address(), "local");
    }
}
