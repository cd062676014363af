// Identity resolution for Spectra
// Supports the operator's own session, impersonation, bearer tokens and basic credentials

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::models::{param_to_string, AuthModeKind, ExecutionCommand};

/// An authenticated identity the host's authorization logic understands.
///
/// The host's auth middleware stores it in request extensions; the proxy
/// does the same for synthetic requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The host's user directory
pub trait IdentityProvider: Send + Sync {
    fn find_by_id(&self, id: &str) -> Option<Principal>;

    /// Whether the underlying mechanism can resolve bearer tokens at all
    fn supports_tokens(&self) -> bool {
        false
    }

    fn find_by_token(&self, _token: &str) -> Option<Principal> {
        None
    }

    fn check_credentials(&self, username: &str, password: &str) -> Option<Principal>;
}

/// The host's ability checks
pub trait Gate: Send + Sync {
    fn allows(&self, principal: &Principal, ability: &str) -> bool;
}

/// Requested identity, one variant per authentication mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    Current,
    Impersonate {
        user_id: Option<String>,
    },
    Bearer {
        token: Option<String>,
    },
    Basic {
        username: Option<String>,
        password: Option<String>,
    },
}

impl From<&ExecutionCommand> for AuthMode {
    fn from(cmd: &ExecutionCommand) -> Self {
        match cmd.auth_mode {
            AuthModeKind::Current => AuthMode::Current,
            AuthModeKind::Impersonate => AuthMode::Impersonate {
                user_id: cmd.impersonate_id.as_ref().and_then(param_to_string),
            },
            AuthModeKind::Bearer => AuthMode::Bearer {
                token: cmd.bearer_token.clone(),
            },
            AuthModeKind::Basic => AuthMode::Basic {
                username: cmd.basic_user.clone(),
                password: cmd.basic_pass.clone(),
            },
        }
    }
}

/// Resolves an [`AuthMode`] into a principal. Every failure is `None`.
#[derive(Clone)]
pub struct IdentityBroker {
    provider: Arc<dyn IdentityProvider>,
    gate: Arc<dyn Gate>,
    ability: String,
}

impl IdentityBroker {
    pub fn new(provider: Arc<dyn IdentityProvider>, gate: Arc<dyn Gate>, ability: impl Into<String>) -> Self {
        Self {
            provider,
            gate,
            ability: ability.into(),
        }
    }

    pub fn authenticate(&self, mode: &AuthMode, current: Option<&Principal>) -> Option<Principal> {
        match mode {
            AuthMode::Current => current.cloned(),
            AuthMode::Impersonate { user_id } => self.impersonate(user_id.as_deref(), current),
            AuthMode::Bearer { token } => self.bearer(token.as_deref()),
            AuthMode::Basic { username, password } => {
                self.basic(username.as_deref(), password.as_deref())
            }
        }
    }

    fn impersonate(&self, user_id: Option<&str>, current: Option<&Principal>) -> Option<Principal> {
        let user_id = filled(user_id)?;
        let impersonator = current?;
        if !guarded(|| Some(self.gate.allows(impersonator, &self.ability)))? {
            tracing::debug!(impersonator = %impersonator.id, ability = %self.ability, "impersonation denied");
            return None;
        }
        guarded(|| self.provider.find_by_id(user_id))
    }

    fn bearer(&self, token: Option<&str>) -> Option<Principal> {
        let token = filled(token)?;
        if !self.provider.supports_tokens() {
            return None;
        }
        guarded(|| self.provider.find_by_token(token))
    }

    fn basic(&self, username: Option<&str>, password: Option<&str>) -> Option<Principal> {
        let username = filled(username)?;
        let password = filled(password)?;
        guarded(|| self.provider.check_credentials(username, password))
    }
}

fn filled(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Host callbacks are black boxes; a panic inside one is just "no identity"
fn guarded<T>(f: impl FnOnce() -> Option<T>) -> Option<T> {
    catch_unwind(AssertUnwindSafe(f)).ok().flatten()
}

/// Extractor for the principal attached to the current request, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentPrincipal(pub Option<Principal>);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Principal>().cloned()))
    }
}
