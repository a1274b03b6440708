//! # Cache Configuration
//!
//! Read once at startup, never reloaded. Every field has a default, so an
//! empty file (or no file) is a valid configuration.
//!
//! ```toml
//! refresh_interval_ms = 100
//! cell_size = 64.0
//! metric = "spatial"
//! default_search_radius = 100.0
//!
//! enabled_maps = []          # empty = every map the store reports
//! disabled_maps = [489]
//! enabled_kinds = ["actor", "interactable", "area_effect", "trigger"]
//!
//! [[map_override]]
//! map = 571
//! kinds = ["actor"]
//! ```

use std::path::Path;
use std::time::Duration;

use farsight_shared::{DistanceMetric, DEFAULT_CELL_SIZE, DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_SEARCH_RADIUS};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::snapshot::{EntityKind, KindSet, MapId};

/// Per-map replacement for the global kind list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapOverride {
    /// Map the override applies to.
    pub map: MapId,
    /// Kinds to snapshot on that map.
    pub kinds: Vec<EntityKind>,
}

/// Everything the cache reads from configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Rebuild cadence, in milliseconds.
    pub refresh_interval_ms: u64,
    /// Grid cell side length.
    pub cell_size: f32,
    /// Distance metric for radius queries.
    pub metric: DistanceMetric,
    /// Radius used by nearest lookups that don't pass one.
    pub default_search_radius: f32,
    /// Maps to snapshot; empty means all.
    pub enabled_maps: Vec<MapId>,
    /// Maps never snapshotted (wins over `enabled_maps`).
    pub disabled_maps: Vec<MapId>,
    /// Kinds snapshotted on every map without an override.
    pub enabled_kinds: Vec<EntityKind>,
    /// Per-map kind lists.
    pub map_override: Vec<MapOverride>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            cell_size: DEFAULT_CELL_SIZE,
            metric: DistanceMetric::default(),
            default_search_radius: DEFAULT_SEARCH_RADIUS,
            enabled_maps: Vec::new(),
            disabled_maps: Vec::new(),
            enabled_kinds: EntityKind::ALL.to_vec(),
            map_override: Vec::new(),
        }
    }
}

impl CacheConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::Invalid`] on
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file can't be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Rejects values the cache cannot run with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid("refresh_interval_ms must be at least 1".to_string()));
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "cell_size must be positive and finite (got {})",
                self.cell_size
            )));
        }
        if !(self.default_search_radius.is_finite() && self.default_search_radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "default_search_radius must be positive and finite (got {})",
                self.default_search_radius
            )));
        }
        if let Some(dup) = self
            .map_override
            .iter()
            .enumerate()
            .find(|(i, o)| self.map_override[..*i].iter().any(|prev| prev.map == o.map))
        {
            return Err(ConfigError::Invalid(format!("map {} has more than one override", dup.1.map)));
        }
        Ok(())
    }

    /// Rebuild cadence.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Whether `map` is snapshotted at all.
    #[must_use]
    pub fn map_enabled(&self, map: MapId) -> bool {
        !self.disabled_maps.contains(&map) && (self.enabled_maps.is_empty() || self.enabled_maps.contains(&map))
    }

    /// Kinds snapshotted on `map` (empty if the map is disabled).
    #[must_use]
    pub fn kinds_for(&self, map: MapId) -> KindSet {
        if !self.map_enabled(map) {
            return KindSet::EMPTY;
        }
        match self.map_override.iter().find(|o| o.map == map) {
            Some(over) => over.kinds.iter().copied().collect(),
            None => self.enabled_kinds.iter().copied().collect(),
        }
    }
}
