use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::geometry::Bounds;

/// Construction parameters for one battle's index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridConfig {
    pub bounds: Bounds,
    /// Quadrants per axis
    pub dimension: u32,
    /// Maximum simultaneous units; unit ids run `0..capacity`
    pub capacity: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds::new(-1000.0, -1000.0, 1000.0, 1000.0),
            dimension: 8,
            capacity: 1024,
        }
    }
}

impl GridConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> GridResult<Self> {
        let config: GridConfig = serde_json::from_str(json)
            .map_err(|e| GridError::invalid_config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Cheap checks that do not need the geometry built
    pub fn validate(&self) -> GridResult<()> {
        if self.dimension == 0 {
            return Err(GridError::InvalidDimension(self.dimension));
        }
        if self.capacity == 0 {
            return Err(GridError::ZeroCapacity);
        }
        Ok(())
    }
}
