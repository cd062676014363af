// Console HTTP layer
//
// Wires discovery, execution, cookie listing and the desktop endpoints into an
// axum router mounted under the configured prefix:
//
//   GET  {prefix}/api/discover
//   POST {prefix}/api/execute
//   GET  {prefix}/api/cookies
//   POST {prefix}/api/desktop/ping     (signed)
//   GET  {prefix}/api/desktop/export   (signed)
//   POST {prefix}/api/desktop/sync     (signed)

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::{CurrentPrincipal, Gate, IdentityBroker, IdentityProvider};
use crate::catalog::RouteCatalog;
use crate::config::ConsoleConfig;
use crate::cookies::{list_cookies, CookieEntry};
use crate::error::ConsoleError;
use crate::host::HostApp;
use crate::models::{ExecutionCommand, ExecutionResult, RouteDescriptor};
use crate::proxy::{CallerContext, RequestProxy};
use crate::rules::{LexicalRules, ReflectedRules, RuleExtractor};
use crate::schema::{SchemaEntry, SchemaSynthesizer};
use crate::sync::payload::{assemble, PayloadContext};
use crate::sync::{FingerprintStore, NonceStore, SignatureVerifier, SyncChannel, SyncOutcome, SyncPayload};

/// Signed desktop requests larger than this are refused
const MAX_SIGNED_BODY: usize = 2 * 1024 * 1024;

/// Discovery response
#[derive(Debug, Clone, Serialize)]
pub struct Discovery {
    pub routes: Vec<RouteDescriptor>,
    pub schemas: Vec<SchemaEntry>,
}

pub struct Console {
    config: ConsoleConfig,
    host: HostApp,
    catalog: RouteCatalog,
    synthesizer: SchemaSynthesizer,
    proxy: RequestProxy,
    verifier: SignatureVerifier,
    channel: SyncChannel,
    gate: Arc<dyn Gate>,
}

impl Console {
    pub fn new(
        config: ConsoleConfig,
        host: HostApp,
        provider: Arc<dyn IdentityProvider>,
        gate: Arc<dyn Gate>,
    ) -> Result<Self, ConsoleError> {
        let broker = IdentityBroker::new(provider, Arc::clone(&gate), config.gate.clone());
        let catalog = RouteCatalog::new(&config.prefix())
            .include(&config.include_routes)
            .exclude(&config.exclude_routes);
        let synthesizer = SchemaSynthesizer::new(RuleExtractor::new(vec![
            Box::new(ReflectedRules),
            Box::new(LexicalRules::new(config.project_path.clone())),
        ]));

        Ok(Self {
            proxy: RequestProxy::new(host.clone(), broker, &config),
            verifier: SignatureVerifier::from_config(&config.desktop),
            channel: SyncChannel::new(&config.desktop)?,
            catalog,
            synthesizer,
            host,
            gate,
            config,
        })
    }

    pub fn with_synthesizer(mut self, synthesizer: SchemaSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn with_fingerprint_store(mut self, store: Arc<dyn FingerprintStore>) -> Self {
        self.channel = self.channel.with_store(store);
        self
    }

    pub fn with_nonce_store(mut self, store: Arc<dyn NonceStore>) -> Self {
        self.verifier = self.verifier.with_nonce_store(store);
        self
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn discover(&self) -> Discovery {
        let routes = self.catalog.scan(&self.host);
        let schemas = self.synthesizer.entries(&self.host, &routes);
        Discovery { routes, schemas }
    }

    pub fn assemble_payload(&self) -> Result<SyncPayload, ConsoleError> {
        let ctx = PayloadContext {
            host: &self.host,
            catalog: &self.catalog,
            synthesizer: &self.synthesizer,
            config: &self.config,
        };
        Ok(assemble(&ctx)?)
    }

    pub async fn execute(
        &self,
        cmd: &ExecutionCommand,
        caller: &CallerContext,
    ) -> Result<ExecutionResult, ConsoleError> {
        self.proxy.execute(cmd, caller).await
    }

    pub async fn sync(&self) -> Result<SyncOutcome, ConsoleError> {
        if !self.channel.is_enabled() {
            return Ok(SyncOutcome::Disabled);
        }
        let payload = self.assemble_payload()?;
        Ok(self.channel.sync(&payload).await)
    }

    pub async fn force_sync(&self) -> Result<SyncOutcome, ConsoleError> {
        if !self.channel.is_enabled() {
            return Ok(SyncOutcome::Disabled);
        }
        let payload = self.assemble_payload()?;
        Ok(self.channel.force_sync(&payload).await)
    }

    /// The console's own routes under its prefix
    pub fn router(self: Arc<Self>) -> Router {
        let console = Router::new()
            .route("/api/discover", get(discover))
            .route("/api/execute", post(execute))
            .route("/api/cookies", get(cookies))
            .route_layer(middleware::from_fn_with_state(Arc::clone(&self), guard));

        let desktop = Router::new()
            .route("/api/desktop/ping", post(ping))
            .route("/api/desktop/export", get(export))
            .route("/api/desktop/sync", post(desktop_sync))
            .route_layer(middleware::from_fn_with_state(Arc::clone(&self), verify_signature))
            .route_layer(middleware::from_fn_with_state(Arc::clone(&self), desktop_enabled));

        let routes = console.merge(desktop);
        let prefix = self.config.prefix();
        let router = if prefix == "/" {
            routes
        } else {
            Router::new().nest(&prefix, routes)
        };
        router.with_state(self)
    }

    /// Host router with the console merged in
    pub fn mount(self: Arc<Self>) -> Router {
        let host = self.host.router();
        host.merge(self.router())
    }
}

/// Enable/environment gate, then the configured ability on the current principal
async fn guard(
    State(console): State<Arc<Console>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    request: Request,
    next: Next,
) -> Result<Response, ConsoleError> {
    if !console.config.is_active() {
        return Err(ConsoleError::NotFound);
    }
    if console.config.require_authorization {
        let allowed = principal
            .as_ref()
            .map(|p| console.gate.allows(p, &console.config.gate))
            .unwrap_or(false);
        if !allowed {
            tracing::debug!(principal = ?principal.map(|p| p.id), gate = %console.config.gate, "console access denied");
            return Err(ConsoleError::Forbidden(format!(
                "ability '{}' required",
                console.config.gate
            )));
        }
    }
    Ok(next.run(request).await)
}

async fn desktop_enabled(
    State(console): State<Arc<Console>>,
    request: Request,
    next: Next,
) -> Result<Response, ConsoleError> {
    if !console.config.desktop.enabled {
        return Err(ConsoleError::NotFound);
    }
    Ok(next.run(request).await)
}

/// Buffers the body, verifies it, and hands the same bytes on
async fn verify_signature(
    State(console): State<Arc<Console>>,
    request: Request,
    next: Next,
) -> Result<Response, ConsoleError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_SIGNED_BODY)
        .await
        .map_err(|e| ConsoleError::InvalidRequest(e.to_string()))?;

    if let Err(rejection) = console.verifier.verify(&parts.headers, &bytes) {
        tracing::warn!(path = %parts.uri.path(), %rejection, "rejected desktop request");
        return Err(rejection.into());
    }
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

async fn discover(State(console): State<Arc<Console>>) -> Json<Discovery> {
    Json(console.discover())
}

async fn execute(
    State(console): State<Arc<Console>>,
    caller: CallerContext,
    payload: Result<Json<ExecutionCommand>, JsonRejection>,
) -> Result<Json<ExecutionResult>, ConsoleError> {
    let Json(cmd) = payload.map_err(|e| ConsoleError::InvalidRequest(e.body_text()))?;
    if cmd.endpoint.trim().is_empty() {
        return Err(ConsoleError::InvalidRequest("endpoint is required".to_string()));
    }

    let started = Instant::now();
    match console.execute(&cmd, &caller).await {
        Ok(result) => Ok(Json(result)),
        Err(ConsoleError::Dispatch(message)) => {
            let time_ms = started.elapsed().as_secs_f64() * 1000.0;
            Ok(Json(ExecutionResult::failure(500, &message, time_ms)))
        }
        Err(e) => Err(e),
    }
}

async fn cookies(headers: HeaderMap) -> Json<Vec<CookieEntry>> {
    Json(list_cookies(&headers))
}

async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn export(State(console): State<Arc<Console>>) -> Result<Json<SyncPayload>, ConsoleError> {
    Ok(Json(console.assemble_payload()?))
}

async fn desktop_sync(State(console): State<Arc<Console>>) -> Result<Json<Value>, ConsoleError> {
    let outcome = console.force_sync().await?;
    Ok(Json(json!({ "status": outcome })))
}
