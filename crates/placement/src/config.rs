use std::env;

use runtime::cooldown::DEFAULT_COOLDOWN_SECONDS;
use serde::{Deserialize, Serialize};

/// Tunables for marker placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementConfig {
    /// Maximum distance from the user a marker may be placed at (km).
    #[serde(default = "default_max_range_km")]
    pub max_range_km: f64,

    /// Minimum distance between a new marker and any existing one (km).
    ///
    /// 0.005 km is 5 m. Older notes call this "50m"; the value is what counts.
    #[serde(default = "default_min_separation_km")]
    pub min_separation_km: f64,

    /// Seconds between two placements by the same session.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u32,

    /// Path of the remote marker collection.
    #[serde(default = "default_collection_path")]
    pub collection_path: String,
}

fn default_max_range_km() -> f64 {
    0.1
}

fn default_min_separation_km() -> f64 {
    0.005
}

fn default_cooldown_seconds() -> u32 {
    DEFAULT_COOLDOWN_SECONDS
}

fn default_collection_path() -> String {
    "markers".to_string()
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            max_range_km: default_max_range_km(),
            min_separation_km: default_min_separation_km(),
            cooldown_seconds: default_cooldown_seconds(),
            collection_path: default_collection_path(),
        }
    }
}

impl PlacementConfig {
    /// Reads overrides from `INCIDENTS_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_range_km: env_var_f64("INCIDENTS_MAX_RANGE_KM", defaults.max_range_km),
            min_separation_km: env_var_f64(
                "INCIDENTS_MIN_SEPARATION_KM",
                defaults.min_separation_km,
            ),
            cooldown_seconds: env_var_u32("INCIDENTS_COOLDOWN_SECONDS", defaults.cooldown_seconds),
            collection_path: env::var("INCIDENTS_COLLECTION")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.collection_path),
        }
    }

    /// Range limit in whole meters, for user-facing messages.
    pub fn max_range_m(&self) -> u32 {
        (self.max_range_km * 1000.0).round() as u32
    }

    pub fn min_separation_m(&self) -> u32 {
        (self.min_separation_km * 1000.0).round() as u32
    }
}

fn env_var_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}
