//! Configuration for a mesh regeneration pass.

use brep_kernel::Deviation;
use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Knobs controlling triangulation density, edge sampling and atlas layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshOptions {
    /// Maximum chordal deviation of the triangulation (model units).
    pub max_deviation: f64,
    /// Angular deviation = `max_deviation * angular_deviation_factor` (radians).
    pub angular_deviation_factor: f64,
    /// Angular deviation used when tessellating free edges (radians).
    pub free_edge_angular_deviation: f64,
    /// Margin added to each atlas box on both axes (arc-length units).
    pub atlas_padding: f64,
    /// Fixed number of chords used to estimate isoparametric arc lengths.
    pub arc_length_segments: u32,
    /// Size of the topological hash table.
    pub hash_upper_bound: u64,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            max_deviation: 0.1,
            angular_deviation_factor: 5.0,
            free_edge_angular_deviation: 0.1,
            atlas_padding: 2.0,
            arc_length_segments: 5,
            hash_upper_bound: 100_000_000,
        }
    }
}

impl MeshOptions {
    /// Fast preview meshing.
    pub fn coarse() -> Self {
        Self {
            max_deviation: 1.0,
            ..Self::default()
        }
    }

    /// Dense meshing for close-up inspection.
    pub fn fine() -> Self {
        Self {
            max_deviation: 0.01,
            arc_length_segments: 16,
            ..Self::default()
        }
    }

    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, MeshError> {
        let options: Self = serde_json::from_str(text).map_err(|e| MeshError::InvalidOptions {
            reason: e.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        let positive = [
            ("max_deviation", self.max_deviation),
            ("angular_deviation_factor", self.angular_deviation_factor),
            ("free_edge_angular_deviation", self.free_edge_angular_deviation),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(MeshError::InvalidOptions {
                    reason: format!("{name} must be positive and finite, got {value}"),
                });
            }
        }
        if !self.atlas_padding.is_finite() || self.atlas_padding < 0.0 {
            return Err(MeshError::InvalidOptions {
                reason: format!("atlas_padding must be non-negative, got {}", self.atlas_padding),
            });
        }
        if self.arc_length_segments == 0 {
            return Err(MeshError::InvalidOptions {
                reason: "arc_length_segments must be at least 1".to_string(),
            });
        }
        if self.hash_upper_bound == 0 {
            return Err(MeshError::InvalidOptions {
                reason: "hash_upper_bound must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Deviation handed to the kernel's incremental mesher.
    pub fn deviation(&self) -> Deviation {
        Deviation::new(
            self.max_deviation,
            self.max_deviation * self.angular_deviation_factor,
        )
    }

    /// Deviation for adaptive tessellation of free edges.
    pub fn free_edge_deviation(&self) -> Deviation {
        Deviation::new(self.max_deviation, self.free_edge_angular_deviation)
    }
}
