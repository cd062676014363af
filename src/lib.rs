pub mod auth;
pub mod catalog;
pub mod config;
pub mod console;
pub mod cookies;
pub mod demo;
pub mod error;
pub mod fingerprint;
pub mod host;
pub mod models;
pub mod proxy;
pub mod rules;
pub mod schema;
pub mod sync;

// Re-export commonly used items
pub use auth::{AuthMode, CurrentPrincipal, Gate, IdentityBroker, IdentityProvider, Principal};
pub use catalog::RouteCatalog;
pub use config::{ConsoleConfig, DesktopConfig, RateLimitConfig};
pub use console::{Console, Discovery};
pub use cookies::{list_cookies, CookieEntry};
pub use error::ConsoleError;
pub use fingerprint::{canonicalize, fingerprint, fingerprint_of};
pub use host::{HostApp, HostBuilder, Route};
pub use models::*;
pub use proxy::{CallerContext, ProxiedRequest, RequestProxy};
pub use rules::{DeclaresFieldRules, RawRules, RuleExtractor, RuleStrategy};
pub use schema::{SchemaEntry, SchemaSynthesizer};
pub use sync::{SignatureVerifier, SyncChannel, SyncOutcome, SyncPayload};
