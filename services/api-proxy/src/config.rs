//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Every field carries a default so the TOML file is optional and the
//! service runs out of the box, with only `PORT` and the account sources
//! supplied via environment. Upstream URLs live in config so tests can
//! point the pool and the diagnostic probe at local mock endpoints.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// HTTP server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Account source settings
#[derive(Debug, Deserialize)]
pub struct AccountsConfig {
    /// Local account file; wins over the env blob when present
    #[serde(default = "default_accounts_file")]
    pub file: PathBuf,
}

/// Upstream endpoint settings
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_ai_url")]
    pub ai_url: String,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            file: default_accounts_file(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            ai_url: default_ai_url(),
            refresh_timeout_secs: default_refresh_timeout(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8000".parse().expect("valid default listen addr")
}

fn default_max_connections() -> usize {
    1000
}

fn default_accounts_file() -> PathBuf {
    PathBuf::from(warp_auth::DEFAULT_ACCOUNTS_FILE)
}

fn default_token_url() -> String {
    warp_auth::TOKEN_ENDPOINT.to_string()
}

fn default_ai_url() -> String {
    warp_auth::AI_ENDPOINT.to_string()
}

fn default_refresh_timeout() -> u64 {
    warp_auth::REFRESH_TIMEOUT_SECS
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file if it exists, otherwise use defaults.
    ///
    /// A missing file is the normal case (the original deployment has no
    /// config file at all); a present-but-invalid file is still a
    /// startup error.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Override the listen port, used for the `PORT` env var.
    pub fn apply_port_override(&mut self, port: &str) -> common::Result<()> {
        let port: u16 = port
            .parse()
            .map_err(|e| common::Error::Config(format!("invalid PORT value {port:?}: {e}")))?;
        self.server.listen_addr.set_port(port);
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("warp-pool-proxy.toml")
    }

    fn validate(&self) -> common::Result<()> {
        for (name, url) in [
            ("token_url", &self.upstream.token_url),
            ("ai_url", &self.upstream.ai_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.upstream.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
