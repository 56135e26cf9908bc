use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use homescreen_api::validate::DEFAULT_MODEL;
use homescreen_store::local::DEFAULT_NAMESPACE;

pub const PLACEHOLDER_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Local,
    Document,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub db_path: PathBuf,
    pub namespace: String,
    pub docstore_url: Option<String>,
    pub docstore_token: Option<String>,
    pub jwt_secret: String,
    pub anthropic_api_key: Option<String>,
    pub validation_model: String,
    pub strict_validation: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match var("HOMESCREEN_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("HOMESCREEN_PORT is not a port number: {}", raw))?,
            None => 3001,
        };

        let backend = match var("HOMESCREEN_BACKEND").as_deref() {
            None | Some("local") => Backend::Local,
            Some("document") => Backend::Document,
            Some(other) => bail!("HOMESCREEN_BACKEND must be `local` or `document`, got `{}`", other),
        };

        let docstore_url = var("HOMESCREEN_DOCSTORE_URL");
        if backend == Backend::Document && docstore_url.is_none() {
            bail!("HOMESCREEN_DOCSTORE_URL is required when HOMESCREEN_BACKEND=document");
        }

        let strict_validation = match var("HOMESCREEN_STRICT_VALIDATION").as_deref() {
            None => false,
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            Some(other) => bail!("HOMESCREEN_STRICT_VALIDATION must be a boolean, got `{}`", other),
        };

        Ok(Self {
            host: var("HOMESCREEN_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            backend,
            db_path: PathBuf::from(var("HOMESCREEN_DB_PATH").unwrap_or_else(|| "homescreen.db".into())),
            namespace: var("HOMESCREEN_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.into()),
            docstore_url,
            docstore_token: var("HOMESCREEN_DOCSTORE_TOKEN"),
            jwt_secret: var("HOMESCREEN_JWT_SECRET").unwrap_or_else(|| PLACEHOLDER_JWT_SECRET.into()),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            validation_model: var("HOMESCREEN_VALIDATION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            strict_validation,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 3001);
        assert_eq!(c.backend, Backend::Local);
        assert_eq!(c.db_path, PathBuf::from("homescreen.db"));
        assert_eq!(c.namespace, "homescreen_");
        assert_eq!(c.jwt_secret, PLACEHOLDER_JWT_SECRET);
        assert_eq!(c.validation_model, DEFAULT_MODEL);
        assert!(!c.strict_validation);
        assert!(c.anthropic_api_key.is_none());
        assert_eq!(c.addr().unwrap().to_string(), "0.0.0.0:3001");
    }

    #[test]
    fn document_backend_needs_url() {
        assert!(config(&[("HOMESCREEN_BACKEND", "document")]).is_err());

        let c = config(&[
            ("HOMESCREEN_BACKEND", "document"),
            ("HOMESCREEN_DOCSTORE_URL", "http://docs.internal"),
            ("HOMESCREEN_DOCSTORE_TOKEN", "t0k"),
        ])
        .unwrap();
        assert_eq!(c.backend, Backend::Document);
        assert_eq!(c.docstore_token.as_deref(), Some("t0k"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("HOMESCREEN_PORT", "http")]).is_err());
        assert!(config(&[("HOMESCREEN_BACKEND", "redis")]).is_err());
        assert!(config(&[("HOMESCREEN_STRICT_VALIDATION", "maybe")]).is_err());
    }

    #[test]
    fn blank_values_fall_back() {
        let c = config(&[("ANTHROPIC_API_KEY", "  "), ("HOMESCREEN_STRICT_VALIDATION", "true")]).unwrap();
        assert!(c.anthropic_api_key.is_none());
        assert!(c.strict_validation);
    }
}
