//! Settings types.
//!
//! All structs use `#[serde(default)]` so a partial settings file only has to
//! name the keys it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SquaresSettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Realtime session timers and bus sizing.
    pub realtime: RealtimeSettings,
    /// Token verification settings.
    pub auth: AuthSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl SquaresSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let rt = &self.realtime;
        if rt.ping_interval_secs == 0 || rt.revalidate_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "realtime intervals must be non-zero".into(),
            ));
        }
        if rt.pong_wait_secs <= rt.ping_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "pongWaitSecs ({}) must exceed pingIntervalSecs ({})",
                rt.pong_wait_secs, rt.ping_interval_secs
            )));
        }
        if rt.write_wait_secs == 0 || rt.write_wait_secs >= rt.ping_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "writeWaitSecs ({}) must be between 1 and pingIntervalSecs ({})",
                rt.write_wait_secs, rt.ping_interval_secs
            )));
        }
        if rt.bus_capacity == 0 {
            return Err(SettingsError::InvalidValue("busCapacity must be non-zero".into()));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "maxConnections must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` auto-assigns).
    pub port: u16,
    /// Maximum concurrent realtime sessions per process.
    pub max_connections: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
            max_message_size: 64 * 1024,
        }
    }
}

/// Realtime session timers and bus sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Seconds between server pings.
    pub ping_interval_secs: u64,
    /// Write deadline for any single frame, in seconds.
    pub write_wait_secs: u64,
    /// Read deadline extended by each pong, in seconds.
    pub pong_wait_secs: u64,
    /// Seconds between claims revalidation checks.
    pub revalidate_interval_secs: u64,
    /// Also write a `keepalive` envelope on every ping tick.
    pub keepalive_envelopes: bool,
    /// Per-topic buffer of the in-process bus.
    pub bus_capacity: usize,
    /// Redis URL of the shared bus (`redis://host:6379/`). Unset runs the
    /// in-process bus, which only reaches viewers of this process.
    pub bus_url: Option<String>,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            write_wait_secs: 10,
            pong_wait_secs: 60,
            revalidate_interval_secs: 300,
            keepalive_envelopes: false,
            bus_capacity: 256,
            bus_url: None,
        }
    }
}

impl RealtimeSettings {
    /// Ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Write deadline as a [`Duration`].
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    /// Read deadline as a [`Duration`].
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Revalidation interval as a [`Duration`].
    pub fn revalidate_interval(&self) -> Duration {
        Duration::from_secs(self.revalidate_interval_secs)
    }
}

/// Token verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret used to verify HS256 tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// Required `iss` claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Required `aud` claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// Clock-skew leeway for `exp` at handshake, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            issuer: None,
            audience: None,
            leeway_secs: 30,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
