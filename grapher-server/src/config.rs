//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via GRAPHER_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by the binary)

use grapher_protocol::{StatusFormat, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "GRAPHER_CONFIG";

/// Largest accepted `read_chunk_size`; each stream connection allocates one.
pub const MAX_READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Protocol behaviour.
    pub protocol: ProtocolConfig,
}

impl Config {
    /// Loads configuration from `path`, falling back to `GRAPHER_CONFIG`,
    /// then applies environment variable overrides.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a `GRAPHER_*` variable lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.network.apply_overrides(&lookup);
        self.protocol.apply_overrides(&lookup);
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// How commands are framed on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Raw TCP; each read chunk is one command.
    Stream,
    /// WebSocket; each message is one command.
    #[default]
    Message,
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" | "tcp" => Ok(Transport::Stream),
            "message" | "websocket" | "ws" => Ok(Transport::Message),
            other => Err(ConfigError::ValidationError(format!(
                "unknown transport '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Stream => f.write_str("stream"),
            Transport::Message => f.write_str("message"),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Command framing.
    pub transport: Transport,
    /// Idle connection timeout in seconds (0 = never).
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Bytes read per command on the stream transport.
    pub read_chunk_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            transport: Transport::default(),
            idle_timeout_secs: 0,
            max_connections: 64,
            read_chunk_size: 4096,
        }
    }
}

impl NetworkConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("GRAPHER_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Some(transport) = lookup("GRAPHER_TRANSPORT") {
            if let Ok(parsed) = transport.parse() {
                self.transport = parsed;
            }
        }

        if let Some(timeout) = lookup("GRAPHER_IDLE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.idle_timeout_secs = secs;
            }
        }

        if let Some(max) = lookup("GRAPHER_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }

        if let Some(size) = lookup("GRAPHER_READ_CHUNK_SIZE") {
            if let Ok(n) = size.parse() {
                self.read_chunk_size = n;
            }
        }
    }

    /// Returns the idle timeout, if one is configured.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Validates network configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "read_chunk_size must be positive".to_string(),
            ));
        }
        if self.read_chunk_size > MAX_READ_CHUNK_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "read_chunk_size must be at most {} bytes",
                MAX_READ_CHUNK_SIZE
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// What an empty command produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyVerbPolicy {
    /// `NotFound`, then the command falls through to the state checks, so an
    /// empty command while unloaded also yields `DriverNotLoaded`.
    #[default]
    DualFrame,
    /// `NotFound` only.
    SingleFrame,
}

impl FromStr for EmptyVerbPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dual_frame" | "dual" => Ok(EmptyVerbPolicy::DualFrame),
            "single_frame" | "single" => Ok(EmptyVerbPolicy::SingleFrame),
            other => Err(ConfigError::ValidationError(format!(
                "unknown empty verb policy '{}'",
                other
            ))),
        }
    }
}

/// Protocol behaviour shared by every session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Literal form of status codes in reply frames.
    pub status_format: StatusFormat,
    /// Handling of blank commands.
    pub empty_verb: EmptyVerbPolicy,
}

impl ProtocolConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(format) = lookup("GRAPHER_STATUS_FORMAT") {
            if let Ok(parsed) = format.parse() {
                self.status_format = parsed;
            }
        }

        if let Some(policy) = lookup("GRAPHER_EMPTY_VERB") {
            if let Ok(parsed) = policy.parse() {
                self.empty_verb = parsed;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
