// Configuration for Spectra
// Loaded from a JSON file, then overridden by SPECTRA_* environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConsoleError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Environment the host is running in
    pub environment: String,
    /// Environments the console is allowed to run in
    pub only_environments: Vec<String>,
    /// Mount prefix of the console's own routes
    pub path: String,
    /// Ability checked for console access and impersonation
    pub gate: String,
    pub require_authorization: bool,
    pub include_routes: Vec<String>,
    pub exclude_routes: Vec<String>,
    /// Request headers never forwarded to the host
    pub strip_headers: Vec<String>,
    /// Response keys replaced with the mask token
    pub mask_fields: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub desktop: DesktopConfig,
    pub project_path: PathBuf,
    /// Model sources, relative to `project_path`
    pub models_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max: u32,
    pub window_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub enabled: bool,
    pub url: String,
    pub public_key: String,
    /// Accepted clock difference for signed requests, in seconds
    pub max_drift: i64,
    pub fingerprint_path: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            environment: "local".to_string(),
            only_environments: vec!["local".to_string()],
            path: "/spectra".to_string(),
            gate: "use-spectra".to_string(),
            require_authorization: true,
            include_routes: Vec::new(),
            exclude_routes: Vec::new(),
            strip_headers: ["host", "content-length", "transfer-encoding", "connection", "cookie"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mask_fields: [
                "password",
                "password_confirmation",
                "token",
                "secret",
                "api_key",
                "access_token",
                "refresh_token",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rate_limit: RateLimitConfig::default(),
            desktop: DesktopConfig::default(),
            project_path: PathBuf::from("."),
            models_path: PathBuf::from("src/models"),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max: 60,
            window_minutes: 1,
        }
    }
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://127.0.0.1:4460".to_string(),
            public_key: String::new(),
            max_drift: 300,
            fingerprint_path: PathBuf::from(".spectra/fingerprint"),
        }
    }
}

impl ConsoleConfig {
    /// Read a JSON config file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConsoleError> {
        let data = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&data)?;
        Ok(config)
    }

    /// Apply SPECTRA_* overrides from the process environment
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(flag) = lookup("SPECTRA_ENABLED").and_then(|v| parse_flag(&v)) {
            self.enabled = flag;
        }
        if let Some(env) = lookup("SPECTRA_ENV") {
            self.environment = env;
        }
        if let Some(flag) = lookup("SPECTRA_DESKTOP_ENABLED").and_then(|v| parse_flag(&v)) {
            self.desktop.enabled = flag;
        }
        if let Some(url) = lookup("SPECTRA_DESKTOP_URL") {
            self.desktop.url = url;
        }
        if let Some(key) = lookup("SPECTRA_DESKTOP_KEY") {
            self.desktop.public_key = key;
        }
        self
    }

    /// Console is on and the current environment is permitted
    pub fn is_active(&self) -> bool {
        self.enabled
            && self
                .only_environments
                .iter()
                .any(|env| env == "*" || env.eq_ignore_ascii_case(&self.environment))
    }

    /// Normalised mount prefix: leading slash, no trailing slash
    pub fn prefix(&self) -> String {
        let trimmed = self.path.trim_matches('/');
        format!("/{}", trimmed)
    }

    pub fn models_root(&self) -> PathBuf {
        self.project_path.join(&self.models_path)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ConsoleConfig =
            serde_json::from_str(r#"{"path": "/console/", "rate_limit": {"max": 5}}"#).unwrap();
        assert_eq!(config.prefix(), "/console");
        assert_eq!(config.rate_limit.max, 5);
        assert_eq!(config.rate_limit.window_minutes, 1);
        assert_eq!(config.gate, "use-spectra");
    }

    #[test]
    fn environment_restriction() {
        let mut config = ConsoleConfig::default();
        assert!(config.is_active());
        config.environment = "production".to_string();
        assert!(!config.is_active());
        config.only_environments.push("*".to_string());
        assert!(config.is_active());
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SPECTRA_ENABLED", "off"),
            ("SPECTRA_DESKTOP_ENABLED", "true"),
            ("SPECTRA_DESKTOP_KEY", "pk_123"),
        ]
        .into_iter()
        .collect();
        let config = ConsoleConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert!(!config.enabled);
        assert!(config.desktop.enabled);
        assert_eq!(config.desktop.public_key, "pk_123");
    }
}
