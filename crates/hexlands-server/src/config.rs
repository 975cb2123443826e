//! Server configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const MIN_JSON_BYTES: usize = 4096;
pub const MAX_JSON_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Token bucket shape for one rate-limit category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketLimit {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl BucketLimit {
    fn clamped(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity.max(1.0),
            refill_per_sec: refill_per_sec.max(0.1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub data_dir: PathBuf,
    /// `None` disables pruning
    pub room_ttl: Option<Duration>,
    pub max_json_bytes: usize,
    pub trust_proxy: bool,
    pub join_limit: BucketLimit,
    pub action_limit: BucketLimit,
    pub emote_limit: BucketLimit,
    pub persist_debounce: Duration,
    pub heartbeat: Duration,
    pub disconnect_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: PathBuf::from("./data"),
            room_ttl: Some(Duration::from_secs(24 * 3600)),
            max_json_bytes: 65536,
            trust_proxy: false,
            join_limit: BucketLimit::clamped(24.0, 12.0),
            action_limit: BucketLimit::clamped(60.0, 30.0),
            emote_limit: BucketLimit::clamped(16.0, 8.0),
            persist_debounce: Duration::from_millis(140),
            heartbeat: Duration::from_secs(15),
            disconnect_grace: Duration::from_millis(1200),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let addr = parse_or(&lookup, "SERVER_ADDR", defaults.addr)?;
        let data_dir = lookup("DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let ttl_hours: f64 = parse_or(&lookup, "ROOM_TTL_HOURS", 24.0)?;
        let room_ttl = if ttl_hours > 0.0 {
            Some(Duration::from_secs_f64(ttl_hours * 3600.0))
        } else {
            None
        };

        let max_json_bytes: usize = parse_or(&lookup, "MAX_JSON_BYTES", defaults.max_json_bytes)?;
        let max_json_bytes = max_json_bytes.clamp(MIN_JSON_BYTES, MAX_JSON_BYTES);

        let trust_proxy = lookup("TRUST_PROXY")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let bucket = |cap_name: &'static str,
                      refill_name: &'static str,
                      default: BucketLimit|
         -> Result<BucketLimit, ConfigError> {
            Ok(BucketLimit::clamped(
                parse_or(&lookup, cap_name, default.capacity)?,
                parse_or(&lookup, refill_name, default.refill_per_sec)?,
            ))
        };

        Ok(Self {
            addr,
            data_dir,
            room_ttl,
            max_json_bytes,
            trust_proxy,
            join_limit: bucket(
                "JOIN_RATE_CAPACITY",
                "JOIN_RATE_REFILL_PER_SEC",
                defaults.join_limit,
            )?,
            action_limit: bucket(
                "ACTION_RATE_CAPACITY",
                "ACTION_RATE_REFILL_PER_SEC",
                defaults.action_limit,
            )?,
            emote_limit: bucket(
                "EMOTE_RATE_CAPACITY",
                "EMOTE_RATE_REFILL_PER_SEC",
                defaults.emote_limit,
            )?,
            persist_debounce: Duration::from_millis(parse_or(&lookup, "PERSIST_DEBOUNCE_MS", 140)?),
            heartbeat: Duration::from_secs(parse_or::<u64, _>(&lookup, "HEARTBEAT_SECS", 15)?.max(1)),
            disconnect_grace: Duration::from_millis(parse_or(&lookup, "DISCONNECT_GRACE_MS", 1200)?),
        })
    }

    pub fn rooms_dir(&self) -> PathBuf {
        self.data_dir.join("rooms")
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.rooms_dir(), PathBuf::from("./data/rooms"));
        assert_eq!(config.room_ttl, Some(Duration::from_secs(86_400)));
        assert_eq!(config.max_json_bytes, 65536);
        assert!(!config.trust_proxy);
        assert_eq!(config.action_limit.capacity, 60.0);
        assert_eq!(config.persist_debounce, Duration::from_millis(140));
    }

    #[test]
    fn test_clamps() {
        let config = config_from(&[
            ("MAX_JSON_BYTES", "10"),
            ("JOIN_RATE_CAPACITY", "0"),
            ("JOIN_RATE_REFILL_PER_SEC", "0"),
            ("ROOM_TTL_HOURS", "0"),
            ("TRUST_PROXY", "true"),
        ])
        .unwrap();
        assert_eq!(config.max_json_bytes, MIN_JSON_BYTES);
        assert_eq!(config.join_limit.capacity, 1.0);
        assert_eq!(config.join_limit.refill_per_sec, 0.1);
        assert_eq!(config.room_ttl, None);
        assert!(config.trust_proxy);

        let config = config_from(&[("MAX_JSON_BYTES", "99999999")]).unwrap();
        assert_eq!(config.max_json_bytes, MAX_JSON_BYTES);
    }

    #[test]
    fn test_invalid_value() {
        assert!(config_from(&[("SERVER_ADDR", "not-an-address")]).is_err());
        assert!(config_from(&[("HEARTBEAT_SECS", "-3")]).is_err());
    }
}
