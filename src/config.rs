//! Runtime configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every key has a default, so an empty
//! environment yields a working standalone setup.

use crate::domain::Placement;
use crate::replication::Target;

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Top-level configuration.
///
/// Loaded once at startup via [`ReplicaConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Capacity applied to every pool; `None` keeps pools unbounded.
    pub default_capacity: Option<usize>,

    /// Instances constructed per pool at startup.
    pub prewarm: usize,

    /// Capacity of the in-process mesh broadcast channel.
    pub mesh_bus_capacity: usize,

    /// Recipients of outbound replicated actions.
    pub replication_target: Target,

    /// Placement handed to pool factories.
    pub placement: Placement,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            default_capacity: None,
            prewarm: 0,
            mesh_bus_capacity: 1_024,
            replication_target: Target::Others,
            placement: Placement::ORIGIN,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ReplicaConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the [`Default`] values when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `REPLICATION_TARGET`, `PLACEMENT_POSITION` or
    /// `PLACEMENT_ROTATION` is set but malformed.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let default_capacity = match parse_env("POOL_DEFAULT_CAPACITY", 0usize) {
            0 => None,
            cap => Some(cap),
        };
        let prewarm = parse_env("POOL_PREWARM", defaults.prewarm);
        let mesh_bus_capacity = parse_env("MESH_BUS_CAPACITY", defaults.mesh_bus_capacity);

        let replication_target = match std::env::var("REPLICATION_TARGET").ok() {
            Some(name) => Target::from_name(&name)
                .ok_or_else(|| format!("invalid REPLICATION_TARGET: {name}"))?,
            None => defaults.replication_target,
        };

        let mut placement = defaults.placement;
        if let Ok(raw) = std::env::var("PLACEMENT_POSITION") {
            placement.position = parse_floats(&raw)
                .ok_or_else(|| format!("invalid PLACEMENT_POSITION: {raw}"))?;
        }
        if let Ok(raw) = std::env::var("PLACEMENT_ROTATION") {
            placement.rotation = parse_floats(&raw)
                .ok_or_else(|| format!("invalid PLACEMENT_ROTATION: {raw}"))?;
        }

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            default_capacity,
            prewarm,
            mesh_bus_capacity,
            replication_target,
            placement,
            log_format,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses exactly `N` comma-separated floats.
fn parse_floats<const N: usize>(raw: &str) -> Option<[f32; N]> {
    let values: Vec<f32> = raw
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect::<Option<_>>()?;
    values.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_standalone_friendly() {
        let config = ReplicaConfig::default();
        assert_eq!(config.default_capacity, None);
        assert_eq!(config.replication_target, Target::Others);
        assert_eq!(config.placement, Placement::ORIGIN);
    }

    #[test]
    fn parses_vectors() {
        assert_eq!(parse_floats::<3>("1, 2.5,-3"), Some([1.0, 2.5, -3.0]));
        assert_eq!(parse_floats::<4>("0,0,0,1"), Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(parse_floats::<3>("1,2"), None);
        assert_eq!(parse_floats::<3>("1,x,3"), None);
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        assert_eq!(parse_env("REPLICA_POOL_TEST_UNSET_KEY", 7usize), 7);
    }
}
