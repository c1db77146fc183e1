use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Where the server lives.  Unset fields fall back to the `MPD_HOST` /
/// `MPD_PORT` / `MPD_TIMEOUT` environment and then to local defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine loop frequency
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// How often the engine interrupts idle to refresh the status
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub action_capacity: usize,
    #[serde(default = "default_queue_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            status_interval_ms: default_status_interval_ms(),
            action_capacity: default_queue_capacity(),
            event_capacity: default_queue_capacity(),
        }
    }
}

impl EngineConfig {
    /// Loop period, never shorter than a millisecond.
    pub fn tick(&self) -> Duration {
        let micros = 1_000_000 / u64::from(self.tick_hz.max(1));
        Duration::from_micros(micros).max(MIN_TICK)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

const MIN_TICK: Duration = Duration::from_millis(1);

fn default_tick_hz() -> u32 {
    30
}

fn default_status_interval_ms() -> u64 {
    250
}

fn default_queue_capacity() -> usize {
    16
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Resolved server endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    Tcp { host: String, port: u16 },
    #[cfg(unix)]
    Unix(PathBuf),
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerAddress::Tcp { host, port } => write!(f, "{}:{}", host, port),
            #[cfg(unix)]
            ServerAddress::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> ServerAddress {
        let env_host = std::env::var("MPD_HOST").ok();
        let env_port = std::env::var("MPD_PORT").ok().and_then(|p| p.parse().ok());
        resolve_address(
            self.host.as_deref().or(env_host.as_deref()),
            self.port.or(env_port),
        )
    }

    pub fn timeout(&self) -> Duration {
        let ms = self
            .timeout_ms
            .or_else(|| {
                std::env::var("MPD_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|secs| secs * 1000)
            })
            .unwrap_or_else(default_timeout_ms);
        Duration::from_millis(ms)
    }
}

fn resolve_address(host: Option<&str>, port: Option<u16>) -> ServerAddress {
    // `password@host`: authentication is not supported, drop the password
    let host = host.map(|h| h.rsplit_once('@').map_or(h, |(_, h)| h));

    match host {
        #[cfg(unix)]
        Some(h) if h.starts_with('/') => ServerAddress::Unix(PathBuf::from(h)),
        Some(h) if !h.is_empty() => ServerAddress::Tcp {
            host: h.to_string(),
            port: port.unwrap_or(platform::DEFAULT_PORT),
        },
        _ => {
            #[cfg(unix)]
            if port.is_none() {
                if let Some(path) = platform::default_socket_path() {
                    return ServerAddress::Unix(path);
                }
            }
            ServerAddress::Tcp {
                host: platform::DEFAULT_HOST.to_string(),
                port: port.unwrap_or(platform::DEFAULT_PORT),
            }
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.tick_hz, 30);
        assert_eq!(config.engine.status_interval_ms, 250);
        assert_eq!(config.engine.action_capacity, 16);
        assert_eq!(config.engine.event_capacity, 16);
        assert_eq!(config.engine.tick(), Duration::from_micros(33_333));
        assert!(Config::config_path().ends_with("mupwit/config.toml"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("[engine]\ntick_hz = 60\n\n[server]\nhost = \"music.lan\"\n")
            .unwrap();
        assert_eq!(config.engine.tick_hz, 60);
        assert_eq!(config.engine.status_interval_ms, 250);
        assert_eq!(config.server.host.as_deref(), Some("music.lan"));
        assert_eq!(config.server.port, None);
    }

    #[test]
    fn test_tick_is_clamped() {
        let mut engine = EngineConfig::default();
        engine.tick_hz = 2000;
        assert_eq!(engine.tick(), Duration::from_millis(1));
        engine.tick_hz = 0;
        assert_eq!(engine.tick(), Duration::from_secs(1));
        engine.tick_hz = 400;
        assert_eq!(engine.tick(), Duration::from_micros(2500));
    }

    #[test]
    fn test_resolve_strips_password() {
        assert_eq!(
            resolve_address(Some("secret@music.lan"), Some(6601)),
            ServerAddress::Tcp {
                host: "music.lan".into(),
                port: 6601
            }
        );
    }

    #[test]
    fn test_resolve_host_default_port() {
        assert_eq!(
            resolve_address(Some("10.0.0.2"), None),
            ServerAddress::Tcp {
                host: "10.0.0.2".into(),
                port: 6600
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_socket_path() {
        assert_eq!(
            resolve_address(Some("/run/mpd/socket"), None),
            ServerAddress::Unix(PathBuf::from("/run/mpd/socket"))
        );
    }
}
