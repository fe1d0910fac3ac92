use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::executor::DEFAULT_DEDUP_CAPACITY;
use crate::protocol::StartOptions;

pub const DEFAULT_CONFIG_PATH: &str = ".runlink.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the server, as a browser would load it (http or https)
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_exec_route")]
    pub exec_route: String,
    #[serde(default = "default_terminal_route")]
    pub terminal_route: String,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    /// Fallback tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Start options applied to every run unless overridden
    #[serde(default)]
    pub default_start: StartOptions,

    // This field is not serialized, just used at runtime
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

fn default_server() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_exec_route() -> String {
    "/ws".to_string()
}

fn default_terminal_route() -> String {
    "/ws/terminal".to_string()
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: default_server(),
            exec_route: default_exec_route(),
            terminal_route: default_terminal_route(),
            dedup_capacity: default_dedup_capacity(),
            log_level: default_log_level(),
            default_start: StartOptions::default(),
            config_path: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path))?;
        config.config_path = Some(PathBuf::from(path));
        Ok(config)
    }

    /// Load the config file if it exists, defaults otherwise
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, route) in [
            ("exec_route", &self.exec_route),
            ("terminal_route", &self.terminal_route),
        ] {
            if !route.starts_with('/') {
                bail!("{} must start with '/', got '{}'", name, route);
            }
        }
        if self.dedup_capacity == 0 {
            bail!("dedup_capacity must be at least 1");
        }
        self.endpoints()?;
        Ok(())
    }

    pub fn endpoints(&self) -> anyhow::Result<Endpoints> {
        Endpoints::new(&self.server, &self.exec_route, &self.terminal_route)
    }
}

/// Socket URLs for the two session kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
    exec_route: String,
    terminal_route: String,
}

impl Endpoints {
    /// The socket scheme mirrors the server's: `wss` for https, `ws` otherwise.
    pub fn new(server: &str, exec_route: &str, terminal_route: &str) -> anyhow::Result<Self> {
        let mut base =
            Url::parse(server).with_context(|| format!("Invalid server URL '{}'", server))?;
        let scheme = match base.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => bail!("Unsupported server scheme '{}' in '{}'", other, server),
        };
        base.set_scheme(scheme)
            .map_err(|()| anyhow!("Cannot switch '{}' to {}", server, scheme))?;
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self {
            base,
            exec_route: exec_route.to_string(),
            terminal_route: terminal_route.to_string(),
        })
    }

    /// URL of the execution socket for `path`
    pub fn exec_url(&self, path: &str) -> Url {
        let mut url = self.route(&self.exec_route);
        url.query_pairs_mut().append_pair("path", path);
        url
    }

    /// URL of the terminal socket; `cwd` must already be normalized
    pub fn terminal_url(&self, cwd: &str) -> Url {
        let mut url = self.route(&self.terminal_route);
        if !cwd.is_empty() {
            url.query_pairs_mut().append_pair("cwd", cwd);
        }
        url
    }

    fn route(&self, route: &str) -> Url {
        let mut url = self.base.clone();
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            route.trim_start_matches('/')
        );
        url.set_path(&path);
        url
    }
}
