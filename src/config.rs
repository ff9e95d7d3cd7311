use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Where to listen and how much concurrency to run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listening socket binds to.
    pub listen_addr: String,
    /// Number of worker threads executing connection turns.
    pub workers: usize,
    /// Accepted sockets beyond this count are dropped at accept time.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            workers: 4,
            max_connections: 1024,
        }
    }
}

/// What gets served.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory request targets are resolved against.
    pub doc_root: PathBuf,
    /// Document substituted for the bare `/` target.
    pub default_document: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            doc_root: PathBuf::from("www"),
            default_document: "index.html".to_string(),
        }
    }
}

/// Fixed budgets for a single request cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Read buffer capacity; a request larger than this closes the connection.
    pub read_buffer_size: usize,
    /// Write buffer capacity for the response head and error bodies.
    pub write_buffer_size: usize,
    /// Maximum length of a resolved filesystem path.
    pub max_path_len: usize,
    /// Maximum number of header lines in one request.
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 2048,
            write_buffer_size: 1024,
            max_path_len: 200,
            max_headers: 100,
        }
    }
}

/// Complete server configuration.
///
/// Every field has a usable default, so an empty (or absent) config file
/// yields a working server rooted at `./www`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub files: FilesConfig,
    pub limits: LimitsConfig,
}

impl Config {
    /// Loads configuration from a YAML file, or returns the defaults when
    /// no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Self::from_yaml(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Parses a YAML document; sections and fields that are absent keep
    /// their defaults.
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}
