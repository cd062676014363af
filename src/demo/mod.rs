// Demo host application
//
// A small items API the `serve` command embeds the console into. It shows the
// three ways a route exposes its rules: a validator type, an inline
// `field_rules!` list found by source scanning, and no rules at all.

pub mod models;

pub use models::{Item, User};

use axum::extract::{Extension, Json, Path, Query, Request};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::auth::{CurrentPrincipal, Gate, IdentityProvider, Principal};
use crate::field_rules;
use crate::host::{HostApp, HostBuilder, Route};
use crate::rules::parse::rule_args;
use crate::rules::{is_required, DeclaresFieldRules, RawRules};

/// Ability the demo gate grants to administrators
pub const CONSOLE_ABILITY: &str = "use-spectra";

struct Account {
    user: User,
    password: &'static str,
    admin: bool,
}

fn accounts() -> Vec<Account> {
    vec![
        Account {
            user: User {
                id: "1".to_string(),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                api_token: "ada-token".to_string(),
            },
            password: "correct-horse",
            admin: true,
        },
        Account {
            user: User {
                id: "2".to_string(),
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                api_token: "grace-token".to_string(),
            },
            password: "battery-staple",
            admin: false,
        },
    ]
}

fn principal(user: &User) -> Principal {
    Principal::new(user.id.clone(), user.name.clone())
}

/// Fixed user directory
pub struct DemoUsers;

impl IdentityProvider for DemoUsers {
    fn find_by_id(&self, id: &str) -> Option<Principal> {
        accounts()
            .iter()
            .find(|a| a.user.id == id)
            .map(|a| principal(&a.user))
    }

    fn supports_tokens(&self) -> bool {
        true
    }

    fn find_by_token(&self, token: &str) -> Option<Principal> {
        accounts()
            .iter()
            .find(|a| a.user.api_token == token)
            .map(|a| principal(&a.user))
    }

    fn check_credentials(&self, username: &str, password: &str) -> Option<Principal> {
        accounts()
            .iter()
            .find(|a| a.user.email == username && a.password == password)
            .map(|a| principal(&a.user))
    }
}

/// Administrators may use the console and impersonate
pub struct DemoGate;

impl Gate for DemoGate {
    fn allows(&self, principal: &Principal, ability: &str) -> bool {
        ability == CONSOLE_ABILITY
            && accounts()
                .iter()
                .any(|a| a.admin && a.user.id == principal.id)
    }
}

/// Resolves `Authorization: Bearer` unless a principal is already attached
pub async fn authenticate(mut request: Request, next: Next) -> Response {
    if request.extensions().get::<Principal>().is_none() {
        let resolved = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|token| DemoUsers.find_by_token(token.trim()));
        if let Some(principal) = resolved {
            request.extensions_mut().insert(principal);
        }
    }
    next.run(request).await
}

#[derive(Default)]
pub struct ItemStore {
    items: RwLock<BTreeMap<u64, Item>>,
    next_id: AtomicU64,
}

impl ItemStore {
    pub fn seeded() -> Self {
        let store = Self::default();
        store.insert("Keyboard", 49.5, vec!["hardware".to_string()], "1");
        store.insert("Mouse", 19.0, Vec::new(), "2");
        store
    }

    fn insert(&self, title: &str, price: f64, tags: Vec<String>, owner_id: &str) -> Item {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let item = Item {
            id,
            title: title.to_string(),
            price,
            tags,
            owner_id: owner_id.to_string(),
        };
        if let Ok(mut items) = self.items.write() {
            items.insert(id, item.clone());
        }
        item
    }

    fn get(&self, id: u64) -> Option<Item> {
        self.items.read().ok()?.get(&id).cloned()
    }

    fn all(&self) -> Vec<Item> {
        self.items
            .read()
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Demo host with its route table
pub fn host() -> HostApp {
    let store = Arc::new(ItemStore::seeded());

    HostBuilder::new()
        .route(
            Route::get("/api/items", list_items)
                .name("items.index")
                .validated_by::<ItemFilter>(),
        )
        .route(
            Route::post("/api/items", store_item)
                .name("items.store")
                .middleware("auth")
                .validated_by::<StoreItem>(),
        )
        .route(
            Route::get("/api/items/{item}", show_item)
                .name("items.show")
                .where_param("item", "[0-9]+"),
        )
        .route(
            Route::patch("/api/items/{item}", update_item)
                .name("items.update")
                .middleware("auth")
                .where_param("item", "[0-9]+")
                .source_fn(file!()),
        )
        .route(
            Route::delete("/api/items/{item}", destroy_item)
                .name("items.destroy")
                .middleware("auth")
                .where_param("item", "[0-9]+"),
        )
        .route(Route::get("/api/me", me).name("me").middleware("auth"))
        .route(
            Route::post("/api/login", login)
                .name("login")
                .validated_by::<LoginRequest>(),
        )
        .route(Route::get("/_health", health))
        .map_router(move |router| {
            router
                .layer(Extension(store))
                .layer(middleware::from_fn(authenticate))
        })
        .build()
}

#[derive(Debug)]
pub enum DemoError {
    Unauthorized,
    NotFound,
    Invalid(BTreeMap<String, Vec<String>>),
}

impl IntoResponse for DemoError {
    fn into_response(self) -> Response {
        match self {
            DemoError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Unauthenticated." })),
            )
                .into_response(),
            DemoError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "Not found." })),
            )
                .into_response(),
            DemoError::Invalid(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "message": "The given data was invalid.", "errors": errors })),
            )
                .into_response(),
        }
    }
}

/// Checks top-level fields of `body` against a rule list
pub fn validate(body: &Value, rules: &RawRules) -> Result<(), DemoError> {
    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (field, field_rules) in rules {
        if field.contains('.') {
            continue;
        }
        let value = match body.get(field).filter(|v| !v.is_null()) {
            Some(value) => value,
            None => {
                if is_required(field_rules) {
                    errors.entry(field.clone()).or_default().push(format!("The {} field is required.", field));
                }
                continue;
            }
        };
        for rule in field_rules {
            if let Some(message) = check(field, value, rule) {
                errors.entry(field.clone()).or_default().push(message);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DemoError::Invalid(errors))
    }
}

fn check(field: &str, value: &Value, rule: &str) -> Option<String> {
    let name = crate::rules::parse::rule_name(rule);
    let limit = || rule_args(rule).first().and_then(|a| a.parse::<f64>().ok());
    let size = || match value {
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Number(n) => n.as_f64(),
        Value::Array(items) => Some(items.len() as f64),
        _ => None,
    };

    let ok = match name {
        "string" => value.is_string(),
        "numeric" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "array" => value.is_array(),
        "email" => value.as_str().map_or(false, |s| s.contains('@')),
        "min" => match (size(), limit()) {
            (Some(size), Some(limit)) => size >= limit,
            _ => true,
        },
        "max" => match (size(), limit()) {
            (Some(size), Some(limit)) => size <= limit,
            _ => true,
        },
        _ => true,
    };
    if ok {
        None
    } else {
        Some(format!("The {} field failed the {} rule.", field, name))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemFilter {
    pub q: Option<String>,
    pub page: Option<u32>,
}

impl DeclaresFieldRules for ItemFilter {
    fn field_rules() -> RawRules {
        field_rules! {
            "q" => "sometimes|string|max:50",
            "page" => "integer|min:1",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreItem {
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DeclaresFieldRules for StoreItem {
    fn field_rules() -> RawRules {
        field_rules! {
            "title" => "required|string|max:120",
            "price" => "required|numeric|min:0",
            "tags" => ["array", "max:5"],
            "tags.*" => "string|max:30",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl DeclaresFieldRules for LoginRequest {
    fn field_rules() -> RawRules {
        field_rules! {
            "email" => "required|email",
            "password" => "required|string|min:8",
        }
    }
}

async fn list_items(
    Extension(store): Extension<Arc<ItemStore>>,
    Query(filter): Query<ItemFilter>,
) -> Json<Vec<Item>> {
    let needle = filter.q.map(|q| q.to_lowercase());
    let items = store
        .all()
        .into_iter()
        .filter(|item| {
            needle
                .as_ref()
                .map_or(true, |q| item.title.to_lowercase().contains(q))
        })
        .collect();
    Json(items)
}

async fn store_item(
    Extension(store): Extension<Arc<ItemStore>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Item>), DemoError> {
    let principal = principal.ok_or(DemoError::Unauthorized)?;
    validate(&body, &StoreItem::field_rules())?;
    let input: StoreItem = serde_json::from_value(body).map_err(|e| {
        DemoError::Invalid(BTreeMap::from([("body".to_string(), vec![e.to_string()])]))
    })?;
    let item = store.insert(&input.title, input.price, input.tags, &principal.id);
    Ok((StatusCode::CREATED, Json(item)))
}

async fn show_item(
    Extension(store): Extension<Arc<ItemStore>>,
    Path(id): Path<u64>,
) -> Result<Json<Item>, DemoError> {
    store.get(id).map(Json).ok_or(DemoError::NotFound)
}

async fn update_item(
    Extension(store): Extension<Arc<ItemStore>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> Result<Json<Item>, DemoError> {
    let rules = field_rules! {
        "title" => "sometimes|string|max:120",
        "price" => "sometimes|numeric|min:0",
        "tags" => ["sometimes", "array"],
    };
    principal.ok_or(DemoError::Unauthorized)?;
    validate(&body, &rules)?;

    let mut items = store.items.write().map_err(|_| DemoError::NotFound)?;
    let item = items.get_mut(&id).ok_or(DemoError::NotFound)?;
    if let Some(title) = body.get("title").and_then(Value::as_str) {
        item.title = title.to_string();
    }
    if let Some(price) = body.get("price").and_then(Value::as_f64) {
        item.price = price;
    }
    if let Some(tags) = body.get("tags").and_then(Value::as_array) {
        item.tags = tags.iter().filter_map(Value::as_str).map(str::to_string).collect();
    }
    Ok(Json(item.clone()))
}

async fn destroy_item(
    Extension(store): Extension<Arc<ItemStore>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<u64>,
) -> Result<StatusCode, DemoError> {
    principal.ok_or(DemoError::Unauthorized)?;
    let mut items = store.items.write().map_err(|_| DemoError::NotFound)?;
    items.remove(&id).ok_or(DemoError::NotFound)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> Result<Json<Principal>, DemoError> {
    principal.map(Json).ok_or(DemoError::Unauthorized)
}

async fn login(Json(body): Json<Value>) -> Result<Json<Value>, DemoError> {
    validate(&body, &LoginRequest::field_rules())?;
    let input: LoginRequest = serde_json::from_value(body).map_err(|_| DemoError::Unauthorized)?;
    let account = accounts()
        .into_iter()
        .find(|a| a.user.email == input.email && a.password == input.password)
        .ok_or(DemoError::Unauthorized)?;
    Ok(Json(json!({
        "token": account.user.api_token,
        "user": { "id": account.user.id, "name": account.user.name },
    })))
}

async fn health() -> &'static str {
    "ok"
}
