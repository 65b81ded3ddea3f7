//! Server configuration.

use squares_settings::SquaresSettings;

use crate::websocket::SessionConfig;

/// Configuration for the squares server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent realtime sessions.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-session timers.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
            max_message_size: 64 * 1024,
            session: SessionConfig::default(),
        }
    }
}

impl From<&SquaresSettings> for ServerConfig {
    fn from(settings: &SquaresSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            session: SessionConfig::from(&settings.realtime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_binds_loopback_auto_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn built_from_settings() {
        let mut settings = SquaresSettings::default();
        settings.server.port = 9000;
        settings.server.max_connections = 5;
        settings.realtime.ping_interval_secs = 15;
        settings.realtime.keepalive_envelopes = true;

        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.session.ping_interval, Duration::from_secs(15));
        assert!(cfg.session.keepalive_envelopes);
    }
}
