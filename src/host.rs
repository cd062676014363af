// Host application registry for Spectra
// Records route metadata next to the axum router that serves real traffic.
//
// axum does not expose its route table, so the host registers routes here:
//
//   let host = HostBuilder::new()
//       .route(Route::get("/api/items", list_items).name("api.items.index"))
//       .route(Route::post("/api/items", store_item).validated_by::<StoreItem>())
//       .build();
//
// `host.router()` is the exact router the host serves; the console proxies
// synthetic requests through a clone of it.

use axum::extract::{RawPathParams, Request};
use axum::handler::Handler;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::models::{Method, RouteDescriptor};
use crate::rules::reflect::DeclaresFieldRules;
use crate::rules::RawRules;

/// Declared rule list of a structured validator type
pub type RuleFn = fn() -> RawRules;

/// Where the lexical rule scanner finds a handler's source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerSource {
    /// Inclusive, 1-based line range
    Lines {
        file: PathBuf,
        start_line: usize,
        end_line: usize,
    },
    /// The body of `fn <name>` in `file`
    Function { file: PathBuf, name: String },
}

impl HandlerSource {
    pub fn file(&self) -> &PathBuf {
        match self {
            HandlerSource::Lines { file, .. } | HandlerSource::Function { file, .. } => file,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandlerInfo {
    pub handler_ref: String,
    pub validator: Option<RuleFn>,
    pub source: Option<HandlerSource>,
}

/// Metadata of one registered route
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub uri: String,
    pub methods: BTreeSet<Method>,
    pub name: Option<String>,
    pub middleware: Vec<String>,
    /// Per-parameter regex constraints, matched against the whole segment
    pub constraints: Vec<(String, String)>,
    pub handler: HandlerInfo,
}

/// A route under construction
pub struct Route {
    entry: RouteEntry,
    router: MethodRouter,
}

impl Route {
    /// GET route; axum also answers HEAD with it
    pub fn get<H, T>(uri: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::on(uri, &[Method::GET, Method::HEAD], handler)
    }

    pub fn post<H, T>(uri: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::on(uri, &[Method::POST], handler)
    }

    pub fn put<H, T>(uri: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::on(uri, &[Method::PUT], handler)
    }

    pub fn patch<H, T>(uri: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::on(uri, &[Method::PATCH], handler)
    }

    pub fn delete<H, T>(uri: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::on(uri, &[Method::DELETE], handler)
    }

    /// Route answering every method in `methods` (GET when empty)
    pub fn on<H, T>(uri: &str, methods: &[Method], handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let mut set: BTreeSet<Method> = methods.iter().copied().collect();
        if set.is_empty() {
            set.insert(Method::GET);
        }
        if set.contains(&Method::GET) {
            set.insert(Method::HEAD);
        }
        let filter = set
            .iter()
            .map(|m| method_filter(*m))
            .reduce(MethodFilter::or)
            .unwrap_or(MethodFilter::GET);

        Self {
            entry: RouteEntry {
                uri: normalize_uri(uri),
                methods: set,
                name: None,
                middleware: Vec::new(),
                constraints: Vec::new(),
                handler: HandlerInfo {
                    handler_ref: std::any::type_name::<H>().to_string(),
                    validator: None,
                    source: None,
                },
            },
            router: on(filter, handler),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.entry.name = Some(name.to_string());
        self
    }

    /// Override the handler reference derived from the handler's type name
    pub fn handler_ref(mut self, handler_ref: &str) -> Self {
        self.entry.handler.handler_ref = handler_ref.to_string();
        self
    }

    /// Record a middleware name for discovery; attach the layer itself with [`Route::map_router`]
    pub fn middleware(mut self, name: &str) -> Self {
        self.entry.middleware.push(name.to_string());
        self
    }

    pub fn where_param(mut self, param: &str, pattern: &str) -> Self {
        self.entry.constraints.push((param.to_string(), pattern.to_string()));
        self
    }

    pub fn validated_by<V: DeclaresFieldRules>(mut self) -> Self {
        self.entry.handler.validator = Some(V::field_rules);
        self
    }

    pub fn source_lines(mut self, file: &str, start_line: usize, end_line: usize) -> Self {
        self.entry.handler.source = Some(HandlerSource::Lines {
            file: PathBuf::from(file),
            start_line,
            end_line,
        });
        self
    }

    /// Let the lexical scanner locate `fn <handler name>` in `file`
    pub fn source_fn(mut self, file: &str) -> Self {
        let name = function_name(&self.entry.handler.handler_ref).to_string();
        self.entry.handler.source = Some(HandlerSource::Function {
            file: PathBuf::from(file),
            name,
        });
        self
    }

    pub fn map_router(mut self, f: impl FnOnce(MethodRouter) -> MethodRouter) -> Self {
        self.router = f(self.router);
        self
    }
}

/// Collects routes and builds the host application
#[derive(Default)]
pub struct HostBuilder {
    routes: Vec<Route>,
    wrappers: Vec<Box<dyn FnOnce(Router) -> Router>>,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Apply a transformation (usually global layers) after all routes are added
    pub fn map_router(mut self, f: impl FnOnce(Router) -> Router + 'static) -> Self {
        self.wrappers.push(Box::new(f));
        self
    }

    pub fn build(self) -> HostApp {
        let mut router = Router::new();
        let mut entries = Vec::with_capacity(self.routes.len());

        for Route { entry, router: method_router } in self.routes {
            let method_router = constrain(method_router, &entry.constraints);
            for path in axum_paths(&entry.uri) {
                router = router.route(&path, method_router.clone());
            }
            entries.push(entry);
        }
        for wrap in self.wrappers {
            router = wrap(router);
        }

        HostApp {
            routes: Arc::new(entries),
            router,
        }
    }
}

/// The host's route table and the router serving it
#[derive(Clone)]
pub struct HostApp {
    routes: Arc<Vec<RouteEntry>>,
    router: Router,
}

impl HostApp {
    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Handler of the registered route a descriptor was taken from.
    ///
    /// Matched on URI and method set: axum refuses overlapping methods on one
    /// path, so the pair is unique where handler names are not.
    pub fn handler_for(&self, route: &RouteDescriptor) -> Option<&HandlerInfo> {
        self.routes
            .iter()
            .find(|r| r.uri == route.uri && r.methods == route.methods)
            .map(|r| &r.handler)
    }
}

fn method_filter(method: Method) -> MethodFilter {
    match method {
        Method::GET => MethodFilter::GET,
        Method::POST => MethodFilter::POST,
        Method::PUT => MethodFilter::PUT,
        Method::DELETE => MethodFilter::DELETE,
        Method::PATCH => MethodFilter::PATCH,
        Method::OPTIONS => MethodFilter::OPTIONS,
        Method::HEAD => MethodFilter::HEAD,
    }
}

fn normalize_uri(uri: &str) -> String {
    let trimmed = uri.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Last path segment of a type name, e.g. `demo::update_item` -> `update_item`
fn function_name(handler_ref: &str) -> &str {
    handler_ref.rsplit("::").next().unwrap_or(handler_ref)
}

/// axum paths serving one URI template.
///
/// `{name?}` placeholders are optional: `/posts/{id?}` is served at both
/// `/posts` and `/posts/{id}`.
pub fn axum_paths(uri: &str) -> Vec<String> {
    let segments: Vec<&str> = uri.split('/').filter(|s| !s.is_empty()).collect();
    let mut paths = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        if segment.ends_with("?}") {
            paths.push(join_segments(&segments[..i]));
        }
    }
    paths.push(join_segments(&segments));
    paths.dedup();
    paths
}

fn join_segments(segments: &[&str]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let joined: Vec<String> = segments.iter().map(|s| s.replace("?}", "}")).collect();
    format!("/{}", joined.join("/"))
}

fn constrain(router: MethodRouter, constraints: &[(String, String)]) -> MethodRouter {
    let checks: Vec<(String, Regex)> = constraints
        .iter()
        .filter_map(|(param, pattern)| match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(re) => Some((param.clone(), re)),
            Err(e) => {
                tracing::warn!(param = %param, pattern = %pattern, error = %e, "ignoring invalid route constraint");
                None
            }
        })
        .collect();
    if checks.is_empty() {
        return router;
    }

    let checks = Arc::new(checks);
    router.route_layer(middleware::from_fn(
        move |params: RawPathParams, request: Request, next: Next| {
            let checks = Arc::clone(&checks);
            async move {
                if satisfies(&params, &checks) {
                    next.run(request).await
                } else {
                    StatusCode::NOT_FOUND.into_response()
                }
            }
        },
    ))
}

fn satisfies(params: &RawPathParams, checks: &[(String, Regex)]) -> bool {
    params.iter().all(|(key, value)| {
        checks
            .iter()
            .filter(|(param, _)| param == key)
            .all(|(_, re)| re.is_match(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_segments_expand() {
        assert_eq!(axum_paths("/posts/{id?}"), vec!["/posts", "/posts/{id}"]);
        assert_eq!(axum_paths("/{slug?}"), vec!["/", "/{slug}"]);
        assert_eq!(axum_paths("/api/items/{item}"), vec!["/api/items/{item}"]);
    }

    #[test]
    fn get_routes_also_answer_head() {
        async fn handler() -> &'static str {
            "ok"
        }
        let route = Route::get("api/items/", handler);
        assert_eq!(route.entry.uri, "/api/items");
        assert!(route.entry.methods.contains(&Method::HEAD));
        assert!(route.entry.handler.handler_ref.ends_with("handler"));
    }

    #[test]
    fn function_name_is_last_segment() {
        assert_eq!(function_name("spectra::demo::update_item"), "update_item");
        assert_eq!(function_name("plain"), "plain");
    }
}
