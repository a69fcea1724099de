use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cell precision used by the deployment: 6 characters covers roughly a
/// 1.2 km x 0.6 km rectangle, a workable "nearby" granularity.
pub const DEFAULT_CELL_PRECISION: usize = 6;

/// Longest supported cell string.
pub const MAX_CELL_PRECISION: usize = 12;

const EARTH_RADIUS_KM: f64 = 6371.0;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum GeoError {
    #[error("invalid coordinate: latitude {lat} must be in [-90, 90] and longitude {lon} in [-180, 180]")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("cell precision {0} must be between 1 and {MAX_CELL_PRECISION}")]
    InvalidPrecision(usize),
}

//
// ─── GEO CELL ──────────────────────────────────────────────────────────────────
//

/// A fixed-precision geohash string naming a rectangular region.
///
/// Cells are derived per request and used as a coarse index key; they are
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeoCell(String);

impl GeoCell {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn precision(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for GeoCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GeoCell {
    fn from(s: String) -> Self {
        Self(s)
    }
}

//
// ─── GEO POINT ─────────────────────────────────────────────────────────────────
//

/// A validated (latitude, longitude) pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    /// Creates a point after range-checking both coordinates.
    ///
    /// # Errors
    ///
    /// Returns `GeoError::InvalidCoordinate` when `lat` is outside
    /// [-90, 90] or `lon` outside [-180, 180] (NaN included).
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    #[must_use]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Encodes the cell containing this point at the given precision.
    ///
    /// Deterministic: nearby points at the same precision share a cell
    /// whenever they fall inside the same rectangle.
    ///
    /// # Errors
    ///
    /// Returns `GeoError::InvalidPrecision` when `precision` is 0 or exceeds
    /// [`MAX_CELL_PRECISION`].
    pub fn cell(&self, precision: usize) -> Result<GeoCell, GeoError> {
        if precision == 0 || precision > MAX_CELL_PRECISION {
            return Err(GeoError::InvalidPrecision(precision));
        }

        let mut lat_range = (-90.0f64, 90.0f64);
        let mut lon_range = (-180.0f64, 180.0f64);
        let mut even_bit = true; // even bits encode longitude
        let mut current = 0usize;
        let mut bits = 0usize;
        let mut encoded = String::with_capacity(precision);

        while encoded.len() < precision {
            let (range, value) = if even_bit {
                (&mut lon_range, self.lon)
            } else {
                (&mut lat_range, self.lat)
            };
            let mid = (range.0 + range.1) / 2.0;
            current <<= 1;
            if value >= mid {
                current |= 1;
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            even_bit = !even_bit;
            bits += 1;
            if bits == 5 {
                encoded.push(BASE32[current] as char);
                bits = 0;
                current = 0;
            }
        }

        Ok(GeoCell(encoded))
    }

    /// The center cell plus its geometric neighbors (N, S, E, W, and the
    /// four diagonals): a 3x3 grid used as a store filter approximating a
    /// radius search.
    ///
    /// At most 9 cells. Latitude rows that would cross a pole are dropped
    /// and longitudes wrap across the antimeridian; the result is a set, so
    /// any seam duplicates collapse. Cell membership is a coarse
    /// approximation: a geographically close point can still land in a
    /// non-adjacent cell near a boundary, which is why candidates are
    /// re-ranked with [`GeoPoint::distance_km`].
    ///
    /// # Errors
    ///
    /// Returns `GeoError::InvalidPrecision` as for [`GeoPoint::cell`].
    pub fn neighbor_cells(&self, precision: usize) -> Result<BTreeSet<GeoCell>, GeoError> {
        if precision == 0 || precision > MAX_CELL_PRECISION {
            return Err(GeoError::InvalidPrecision(precision));
        }

        let total_bits = 5 * precision;
        let lon_bits = total_bits.div_ceil(2);
        let lat_bits = total_bits / 2;
        #[allow(clippy::cast_precision_loss)]
        let lat_span = 180.0 / (1u64 << lat_bits) as f64;
        #[allow(clippy::cast_precision_loss)]
        let lon_span = 360.0 / (1u64 << lon_bits) as f64;

        let mut cells = BTreeSet::new();
        for row in -1i8..=1 {
            let lat = f64::from(row).mul_add(lat_span, self.lat);
            if !(-90.0..=90.0).contains(&lat) {
                continue;
            }
            for col in -1i8..=1 {
                let mut lon = f64::from(col).mul_add(lon_span, self.lon);
                if lon > 180.0 {
                    lon -= 360.0;
                } else if lon < -180.0 {
                    lon += 360.0;
                }
                cells.insert(GeoPoint { lat, lon }.cell(precision)?);
            }
        }
        Ok(cells)
    }

    /// Great-circle distance to `other` in kilometers (haversine, Earth
    /// radius fixed at 6371 km).
    #[must_use]
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
