use thiserror::Error;

use gather_core::geo::{DEFAULT_CELL_PRECISION, MAX_CELL_PRECISION};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DiscoveryConfigError {
    #[error("cell precision must be between 1 and {MAX_CELL_PRECISION}")]
    InvalidCellPrecision,

    #[error("radius must be positive and finite")]
    InvalidRadius,

    #[error("max results must be > 0")]
    InvalidMaxResults,
}

/// Tunables for nearby-experience discovery.
///
/// The cell precision must match the precision experiences were written
/// with, so it is a deployment-wide setting rather than a per-call knob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscoveryConfig {
    cell_precision: usize,
    radius_km: f64,
    max_results: u32,
}

impl DiscoveryConfig {
    /// Creates custom discovery settings.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryConfigError` if any parameter is out of range.
    pub fn new(
        cell_precision: usize,
        radius_km: f64,
        max_results: u32,
    ) -> Result<Self, DiscoveryConfigError> {
        if cell_precision == 0 || cell_precision > MAX_CELL_PRECISION {
            return Err(DiscoveryConfigError::InvalidCellPrecision);
        }
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(DiscoveryConfigError::InvalidRadius);
        }
        if max_results == 0 {
            return Err(DiscoveryConfigError::InvalidMaxResults);
        }
        Ok(Self {
            cell_precision,
            radius_km,
            max_results,
        })
    }

    #[must_use]
    pub fn cell_precision(&self) -> usize {
        self.cell_precision
    }

    #[must_use]
    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    #[must_use]
    pub fn max_results(&self) -> u32 {
        self.max_results
    }
}

impl Default for DiscoveryConfig {
    /// 6-character cells, a 2 km radius, and at most 50 results: the 3x3
    /// neighbor grid at this precision spans roughly 3.6 km x 1.8 km, so a
    /// 2 km radius stays inside what the cell filter can see.
    fn default() -> Self {
        Self {
            cell_precision: DEFAULT_CELL_PRECISION,
            radius_km: 2.0,
            max_results: 50,
        }
    }
}
