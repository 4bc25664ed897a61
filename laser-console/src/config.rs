use laser_core::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub server: ServerConf,
    pub http: HttpConf,
    pub session: SessionConfig,
}

/// Adresse du device-server
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConf {
    pub base_url: String,   // ex: "http://localhost:8000/api/genesis-mx"
    pub stream_url: String, // ex: "ws://localhost:8000/api/genesis-mx/"
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for ServerConf {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/genesis-mx".into(),
            stream_url: "ws://localhost:8000/api/genesis-mx/".into(),
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

pub fn parse_config(txt: &str) -> ConsoleConfig {
    if txt.trim().is_empty() {
        return ConsoleConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("[console] config invalide: {e}");
        ConsoleConfig::default()
    })
}

pub async fn load_config() -> ConsoleConfig {
    let path = std::env::var("LASER_CONSOLE_CONFIG").unwrap_or_else(|_| "console.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        info!("[console] config chargée depuis {}", path);
        parse_config(&txt)
    } else {
        warn!("[console] pas de {}, usage config par défaut", path);
        ConsoleConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laser_core::ReconnectConf;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("  \n");
        assert_eq!(cfg, ConsoleConfig::default());
        assert_eq!(cfg.server.stream_url, "ws://localhost:8000/api/genesis-mx/");
        assert_eq!(cfg.session.power_limit, 1000.0);
    }

    #[test]
    fn test_partial_config() {
        let cfg = parse_config(
            r#"
server:
  base_url: "http://lab-pc:8000/api/genesis-mx"
session:
  power_limit: 400.0
  reconnect:
    mode: fixed
    delay_ms: 2000
    max_attempts: 0
"#,
        );

        assert_eq!(cfg.server.base_url, "http://lab-pc:8000/api/genesis-mx");
        assert_eq!(cfg.server.stream_url, ServerConf::default().stream_url);
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert_eq!(cfg.session.power_limit, 400.0);
        assert_eq!(cfg.session.history_capacity, 500);
        assert_eq!(
            cfg.session.reconnect,
            ReconnectConf::Fixed {
                delay_ms: 2000,
                max_attempts: 0
            }
        );
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let cfg = parse_config("server: [not, a, map]");
        assert_eq!(cfg, ConsoleConfig::default());
    }
}
