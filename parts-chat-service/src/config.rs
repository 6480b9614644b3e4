use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Settings read from the environment at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// Extra or replacement flow definitions, merged over the built-in flows
    pub flows_dir: Option<PathBuf>,
    /// JSON catalog to use instead of the bundled seed catalog
    pub catalog_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let raw_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .with_context(|| format!("BIND_ADDR is not a socket address: {raw_addr}"))?;

        let path = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        };

        Ok(Self {
            bind_addr,
            flows_dir: path("FLOWS_DIR"),
            catalog_path: path("CATALOG_PATH"),
            log_format: LogFormat::parse(lookup("LOG_FORMAT").as_deref()),
        })
    }
}

impl LogFormat {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ServiceConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.flows_dir.is_none());
        assert!(config.catalog_path.is_none());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("FLOWS_DIR", "/etc/parts/flows"),
            ("CATALOG_PATH", ""),
            ("LOG_FORMAT", "pretty"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.flows_dir, Some(PathBuf::from("/etc/parts/flows")));
        assert!(config.catalog_path.is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_bad_bind_addr() {
        assert!(config(&[("BIND_ADDR", "not an address")]).is_err());
    }
}
