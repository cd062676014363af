// Sync payload assembly
//
// The payload is built by running a fixed list of stages over a draft, then
// sealing it with a fingerprint of its routes and models:
//
//   draft -> with_routes -> with_models -> with_stats -> with_version -> seal
//
// Stats carry a generation timestamp and are left out of the fingerprint.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use super::collectors::{collect_models, ModelDescriptor};
use crate::catalog::RouteCatalog;
use crate::config::ConsoleConfig;
use crate::fingerprint::fingerprint_of;
use crate::host::HostApp;
use crate::models::{Method, ParameterDescriptor, RouteDescriptor, RouteSchemas};
use crate::schema::SchemaSynthesizer;

/// A route as shipped to the desktop tool, with its schemas keyed by method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRoute {
    pub uri: String,
    pub methods: Vec<Method>,
    pub name: Option<String>,
    pub handler_ref: String,
    pub middleware: Vec<String>,
    pub path_parameters: Vec<ParameterDescriptor>,
    pub schemas: BTreeMap<String, RouteSchemas>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub routes: usize,
    pub methods: usize,
    pub schemas: usize,
    pub models: usize,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub routes: Vec<SyncRoute>,
    pub models: Vec<ModelDescriptor>,
    pub stats: SyncStats,
    pub version: String,
    pub project_path: String,
    pub fingerprint: String,
}

/// Payload under construction
#[derive(Debug, Clone, Default)]
pub struct PayloadDraft {
    pub routes: Vec<SyncRoute>,
    pub models: Vec<ModelDescriptor>,
    pub stats: Option<SyncStats>,
    pub version: String,
    pub project_path: String,
}

/// Everything the stages read from
pub struct PayloadContext<'a> {
    pub host: &'a HostApp,
    pub catalog: &'a RouteCatalog,
    pub synthesizer: &'a SchemaSynthesizer,
    pub config: &'a ConsoleConfig,
}

pub type Stage = fn(PayloadDraft, &PayloadContext<'_>) -> PayloadDraft;

pub const STAGES: [Stage; 4] = [with_routes, with_models, with_stats, with_version];

pub fn assemble(ctx: &PayloadContext<'_>) -> Result<SyncPayload, serde_json::Error> {
    let draft = STAGES
        .iter()
        .fold(PayloadDraft::default(), |draft, stage| stage(draft, ctx));
    seal(draft)
}

pub fn with_routes(mut draft: PayloadDraft, ctx: &PayloadContext<'_>) -> PayloadDraft {
    let descriptors = ctx.catalog.scan(ctx.host);
    let entries = ctx.synthesizer.entries(ctx.host, &descriptors);

    draft.routes = descriptors
        .into_iter()
        .map(|route| {
            let schemas = entries
                .iter()
                .filter(|e| e.route == route.identifier() && route.methods.contains(&e.method))
                .map(|e| (e.method.to_string(), e.schemas.clone()))
                .collect();
            sync_route(route, schemas)
        })
        .collect();
    draft
}

pub fn with_models(mut draft: PayloadDraft, ctx: &PayloadContext<'_>) -> PayloadDraft {
    draft.models = collect_models(&ctx.config.models_root());
    draft
}

pub fn with_stats(mut draft: PayloadDraft, _ctx: &PayloadContext<'_>) -> PayloadDraft {
    draft.stats = Some(SyncStats {
        routes: draft.routes.len(),
        methods: draft.routes.iter().map(|r| r.methods.len()).sum(),
        schemas: draft.routes.iter().map(|r| r.schemas.len()).sum(),
        models: draft.models.len(),
        generated_at: chrono::Utc::now().to_rfc3339(),
    });
    draft
}

pub fn with_version(mut draft: PayloadDraft, ctx: &PayloadContext<'_>) -> PayloadDraft {
    draft.version = env!("CARGO_PKG_VERSION").to_string();
    draft.project_path = ctx.config.project_path.display().to_string();
    draft
}

pub fn seal(draft: PayloadDraft) -> Result<SyncPayload, serde_json::Error> {
    let fingerprint = fingerprint_of(&json!({
        "routes": draft.routes,
        "models": draft.models,
    }))?;
    let stats = match draft.stats {
        Some(stats) => stats,
        None => SyncStats {
            routes: draft.routes.len(),
            methods: 0,
            schemas: 0,
            models: draft.models.len(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        },
    };
    Ok(SyncPayload {
        routes: draft.routes,
        models: draft.models,
        stats,
        version: draft.version,
        project_path: draft.project_path,
        fingerprint,
    })
}

fn sync_route(route: RouteDescriptor, schemas: BTreeMap<String, RouteSchemas>) -> SyncRoute {
    SyncRoute {
        uri: route.uri,
        methods: route.methods.into_iter().collect(),
        name: route.name,
        handler_ref: route.handler_ref,
        middleware: route.middleware,
        path_parameters: route.path_parameters,
        schemas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(uri: &str) -> SyncRoute {
        SyncRoute {
            uri: uri.to_string(),
            methods: vec![Method::GET],
            name: None,
            handler_ref: "app::index".to_string(),
            middleware: Vec::new(),
            path_parameters: Vec::new(),
            schemas: BTreeMap::new(),
        }
    }

    #[test]
    fn fingerprint_ignores_stats_and_version() {
        let mut a = PayloadDraft {
            routes: vec![route("/a")],
            ..Default::default()
        };
        let mut b = a.clone();
        a.version = "1.0.0".to_string();
        b.version = "2.0.0".to_string();
        b.stats = Some(SyncStats {
            routes: 1,
            methods: 1,
            schemas: 0,
            models: 0,
            generated_at: "2001-01-01T00:00:00Z".to_string(),
        });
        assert_eq!(seal(a).unwrap().fingerprint, seal(b).unwrap().fingerprint);
    }

    #[test]
    fn fingerprint_follows_routes() {
        let a = PayloadDraft {
            routes: vec![route("/a")],
            ..Default::default()
        };
        let b = PayloadDraft {
            routes: vec![route("/b")],
            ..Default::default()
        };
        assert_ne!(seal(a).unwrap().fingerprint, seal(b).unwrap().fingerprint);
    }
}
