// Host configuration
// Layering: serialized defaults, then a TOML file, then XMLRPC_HOST_* env vars.

use crate::errors::{HostError, HostResult};
use crate::system::SystemOptions;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "xmlrpc_host.toml";
pub const ENV_PREFIX: &str = "XMLRPC_HOST_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP path the RPC endpoint is mounted at
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub introspection: bool,
    #[serde(default)]
    pub multicall: bool,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_path() -> String {
    "/".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            log_filter: default_log_filter(),
            introspection: false,
            multicall: false,
        }
    }
}

impl HostConfig {
    /// `host:port` as handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn system_options(&self) -> SystemOptions {
        SystemOptions {
            introspection: self.introspection,
            multicall: self.multicall,
        }
    }

    pub fn validate(&self) -> HostResult<()> {
        if self.host.trim().is_empty() {
            return Err(HostError::config("host cannot be empty"));
        }
        if self.port == 0 {
            return Err(HostError::config("port must be non-zero"));
        }
        if !self.path.starts_with('/') {
            return Err(HostError::config(format!(
                "path must start with '/', got '{}'",
                self.path
            )));
        }
        let has_capture = self
            .path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'));
        if has_capture || self.path.contains(['{', '}']) {
            return Err(HostError::config(format!(
                "path '{}' must be a literal route without captures",
                self.path
            )));
        }
        if self.path == crate::server::HEALTH_PATH {
            return Err(HostError::config(format!(
                "path '{}' is reserved for the health check",
                self.path
            )));
        }
        Ok(())
    }
}

/// Provider stack used by [`load_config`]; exposed so callers can merge more.
pub fn figment(path: Option<&Path>) -> Figment {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    Figment::from(Serialized::defaults(HostConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX))
}

pub fn extract(figment: &Figment) -> HostResult<HostConfig> {
    let config: HostConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from defaults, the TOML file at `path` (or
/// `xmlrpc_host.toml`) and `XMLRPC_HOST_*` environment variables.
pub fn load_config(path: Option<&Path>) -> HostResult<HostConfig> {
    extract(&figment(path))
}
