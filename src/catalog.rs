// Route discovery for Spectra
// Walks the host's route table and produces RouteDescriptors
//
// Example:
//   Route:  GET /api/posts/{post}/comments/{comment?}  where post = [0-9]+
//   Output: path_parameters = [post (required, "[0-9]+"), comment (optional)]

use lazy_static::lazy_static;
use regex::Regex;

use crate::host::{HostApp, RouteEntry};
use crate::models::{ParameterDescriptor, RouteDescriptor};

lazy_static! {
    // {name}, {name?}, {*rest}
    static ref PLACEHOLDER: Regex = Regex::new(r"\{(\*?)(\w+)(\??)\}").unwrap();
}

/// Tooling prefixes that never show up in discovery, besides the console's own
pub const INTERNAL_PREFIXES: [&str; 5] = ["/_debug", "/_health", "/__internal", "/telescope", "/horizon"];

pub struct RouteCatalog {
    console_prefix: String,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl RouteCatalog {
    pub fn new(console_prefix: &str) -> Self {
        Self {
            console_prefix: console_prefix.trim_end_matches('/').to_string(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Only URIs matching at least one of these globs are listed (all when empty)
    pub fn include(mut self, globs: &[String]) -> Self {
        self.include = globs.iter().filter_map(|g| compile_glob(g)).collect();
        self
    }

    pub fn exclude(mut self, globs: &[String]) -> Self {
        self.exclude = globs.iter().filter_map(|g| compile_glob(g)).collect();
        self
    }

    pub fn scan(&self, host: &HostApp) -> Vec<RouteDescriptor> {
        let routes: Vec<RouteDescriptor> = host
            .routes()
            .iter()
            .filter(|entry| self.is_visible(&entry.uri))
            .map(describe)
            .collect();
        tracing::debug!(count = routes.len(), "route scan complete");
        routes
    }

    pub fn is_visible(&self, uri: &str) -> bool {
        if self.is_internal(uri) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(uri)) {
            return false;
        }
        !self.exclude.iter().any(|re| re.is_match(uri))
    }

    fn is_internal(&self, uri: &str) -> bool {
        let under = |prefix: &str| {
            !prefix.is_empty()
                && (uri == prefix || uri.starts_with(&format!("{}/", prefix)))
        };
        under(&self.console_prefix) || INTERNAL_PREFIXES.iter().any(|p| under(p))
    }
}

pub fn describe(entry: &RouteEntry) -> RouteDescriptor {
    RouteDescriptor {
        uri: entry.uri.clone(),
        methods: entry.methods.clone(),
        name: entry.name.clone(),
        handler_ref: entry.handler.handler_ref.clone(),
        middleware: entry.middleware.clone(),
        path_parameters: path_parameters(&entry.uri, &entry.constraints),
    }
}

/// Placeholders of a URI template in order of appearance
pub fn path_parameters(uri: &str, constraints: &[(String, String)]) -> Vec<ParameterDescriptor> {
    PLACEHOLDER
        .captures_iter(uri)
        .map(|caps| {
            let name = caps[2].to_string();
            let pattern = constraints
                .iter()
                .find(|(param, _)| *param == name)
                .map(|(_, pattern)| pattern.clone());
            ParameterDescriptor {
                required: caps[3].is_empty(),
                name,
                pattern,
            }
        })
        .collect()
}

/// `*` matches within a segment, `**` across segments
fn compile_glob(glob: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let mut chars = glob.trim().chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                pattern.push_str(".*");
            } else {
                pattern.push_str("[^/]*");
            }
        } else {
            pattern.push_str(&regex::escape(&c.to_string()));
        }
    }
    pattern.push('$');

    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(glob = %glob, error = %e, "ignoring invalid route glob");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_and_constrained_parameters() {
        let params = path_parameters(
            "/api/posts/{post}/comments/{comment?}",
            &[("post".to_string(), "[0-9]+".to_string())],
        );
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "post");
        assert!(params[0].required);
        assert_eq!(params[0].pattern.as_deref(), Some("[0-9]+"));
        assert_eq!(params[1].name, "comment");
        assert!(!params[1].required);
        assert_eq!(params[1].pattern, None);
    }

    #[test]
    fn internal_prefixes_hidden() {
        let catalog = RouteCatalog::new("/spectra");
        assert!(!catalog.is_visible("/spectra"));
        assert!(!catalog.is_visible("/spectra/api/discover"));
        assert!(!catalog.is_visible("/_health"));
        assert!(!catalog.is_visible("/telescope/requests"));
        assert!(catalog.is_visible("/spectral"));
        assert!(catalog.is_visible("/api/users"));
    }

    #[test]
    fn include_and_exclude_globs() {
        let catalog = RouteCatalog::new("/spectra")
            .include(&["/api/**".to_string()])
            .exclude(&["/api/admin/*".to_string()]);
        assert!(catalog.is_visible("/api/users/{user}"));
        assert!(!catalog.is_visible("/api/admin/stats"));
        assert!(catalog.is_visible("/api/admin/stats/daily"));
        assert!(!catalog.is_visible("/web/home"));
    }
}
