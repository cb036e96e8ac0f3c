//! Regular output grid fitting.
//!
//! The output grid uses geographic (lat/lon) coordinates. The operator
//! specifies a target cell size in meters; the actual x/y resolution of the
//! fitted cells varies slightly, since a cell's width in meters varies with
//! latitude and since the cell size is adjusted to fit a whole number of
//! cells in each direction within the domain envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Meters per degree of latitude (WGS84 mean).
const METERS_PER_DEG_LAT: f64 = 110_574.0;

/// Meters per degree of longitude at the equator.
const METERS_PER_DEG_LON_EQUATOR: f64 = 111_320.0;

/// Error type for grid fitting.
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    /// Target cell size must be a positive, finite number of meters
    #[error("invalid target cell size: {0} m")]
    InvalidCellSize(f64),

    /// Envelope has no area to grid
    #[error(
        "degenerate grid envelope: lon [{min_lon}, {max_lon}], lat [{min_lat}, {max_lat}]"
    )]
    DegenerateEnvelope {
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
    },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Geographic bounding envelope of the output grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Envelope {
    /// Tight envelope over a set of points. Returns `None` for an empty set.
    pub fn of_points<I>(points: I) -> Option<Envelope>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut envelope: Option<Envelope> = None;
        for (lon, lat) in points {
            if !lon.is_finite() || !lat.is_finite() {
                continue;
            }
            envelope = Some(match envelope {
                None => Envelope { min_lon: lon, min_lat: lat, max_lon: lon, max_lat: lat },
                Some(e) => Envelope {
                    min_lon: e.min_lon.min(lon),
                    min_lat: e.min_lat.min(lat),
                    max_lon: e.max_lon.max(lon),
                    max_lat: e.max_lat.max(lat),
                },
            });
        }
        envelope
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

// ---------------------------------------------------------------------------
// Regular grid
// ---------------------------------------------------------------------------

/// A fitted regular lat/lon grid: the envelope, the cell counts, and the
/// adjusted per-axis cell sizes in degrees.
///
/// Cells are indexed row-major with x (longitude) varying fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegularGrid {
    pub envelope: Envelope,
    pub nx: usize,
    pub ny: usize,
    /// Cell width in degrees of longitude, after whole-cell adjustment.
    pub cell_lon: f64,
    /// Cell height in degrees of latitude, after whole-cell adjustment.
    pub cell_lat: f64,
}

impl RegularGrid {
    /// Fits a regular grid over `envelope` with cells as close as possible
    /// to `cellsize_m` meters on each side.
    ///
    /// The meters-to-degrees conversion is evaluated at the envelope's
    /// center latitude; the per-axis cell size is then adjusted so a whole
    /// number of cells spans the envelope exactly.
    pub fn fit(envelope: Envelope, cellsize_m: f64) -> Result<Self, GridError> {
        if !cellsize_m.is_finite() || cellsize_m <= 0.0 {
            return Err(GridError::InvalidCellSize(cellsize_m));
        }
        let width = envelope.width();
        let height = envelope.height();
        if width <= 0.0 || height <= 0.0 || !width.is_finite() || !height.is_finite() {
            return Err(GridError::DegenerateEnvelope {
                min_lon: envelope.min_lon,
                max_lon: envelope.max_lon,
                min_lat: envelope.min_lat,
                max_lat: envelope.max_lat,
            });
        }

        let center_lat = (envelope.min_lat + envelope.max_lat) / 2.0;
        let meters_per_deg_lon = METERS_PER_DEG_LON_EQUATOR * center_lat.to_radians().cos();
        if meters_per_deg_lon <= 0.0 {
            // Envelope centered on a pole; longitude spacing is undefined.
            return Err(GridError::DegenerateEnvelope {
                min_lon: envelope.min_lon,
                max_lon: envelope.max_lon,
                min_lat: envelope.min_lat,
                max_lat: envelope.max_lat,
            });
        }

        let target_cell_lon = cellsize_m / meters_per_deg_lon;
        let target_cell_lat = cellsize_m / METERS_PER_DEG_LAT;

        let nx = (width / target_cell_lon).round().max(1.0) as usize;
        let ny = (height / target_cell_lat).round().max(1.0) as usize;

        Ok(RegularGrid {
            envelope,
            nx,
            ny,
            cell_lon: width / nx as f64,
            cell_lat: height / ny as f64,
        })
    }

    /// Total number of output cells.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened index of cell (ix, iy).
    pub fn cell_index(&self, ix: usize, iy: usize) -> usize {
        iy * self.nx + ix
    }

    /// Geographic center of cell (ix, iy).
    pub fn cell_center(&self, ix: usize, iy: usize) -> (f64, f64) {
        (
            self.envelope.min_lon + (ix as f64 + 0.5) * self.cell_lon,
            self.envelope.min_lat + (iy as f64 + 0.5) * self.cell_lat,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Chesapeake-Bay-sized envelope used across tests.
    fn bay_envelope() -> Envelope {
        Envelope { min_lon: -77.4, min_lat: 36.7, max_lon: -75.5, max_lat: 39.6 }
    }

    #[test]
    fn test_fit_spans_envelope_with_whole_cells() {
        let grid = RegularGrid::fit(bay_envelope(), 500.0).expect("fit should succeed");
        let spanned_lon = grid.cell_lon * grid.nx as f64;
        let spanned_lat = grid.cell_lat * grid.ny as f64;
        assert!((spanned_lon - grid.envelope.width()).abs() < 1e-9);
        assert!((spanned_lat - grid.envelope.height()).abs() < 1e-9);
    }

    #[test]
    fn test_fit_cell_size_is_near_target() {
        let grid = RegularGrid::fit(bay_envelope(), 500.0).expect("fit should succeed");
        // At ~38N a 500 m cell is ~0.0057 deg of longitude and ~0.0045 deg
        // of latitude; the adjusted sizes must stay within a few percent.
        let lon_m = grid.cell_lon * 111_320.0 * (38.15f64).to_radians().cos();
        let lat_m = grid.cell_lat * 110_574.0;
        assert!((lon_m - 500.0).abs() < 25.0, "lon cell was {} m", lon_m);
        assert!((lat_m - 500.0).abs() < 25.0, "lat cell was {} m", lat_m);
    }

    #[test]
    fn test_fit_is_deterministic() {
        // Same inputs must describe the same output grid every time.
        let a = RegularGrid::fit(bay_envelope(), 500.0).unwrap();
        let b = RegularGrid::fit(bay_envelope(), 500.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_rejects_non_positive_cell_size() {
        assert_eq!(
            RegularGrid::fit(bay_envelope(), 0.0),
            Err(GridError::InvalidCellSize(0.0))
        );
        assert!(RegularGrid::fit(bay_envelope(), -500.0).is_err());
        assert!(RegularGrid::fit(bay_envelope(), f64::NAN).is_err());
    }

    #[test]
    fn test_fit_rejects_degenerate_envelope() {
        let flat = Envelope { min_lon: -77.0, min_lat: 38.0, max_lon: -77.0, max_lat: 39.0 };
        assert!(matches!(
            RegularGrid::fit(flat, 500.0),
            Err(GridError::DegenerateEnvelope { .. })
        ));
    }

    #[test]
    fn test_cell_centers_are_inside_envelope() {
        let grid = RegularGrid::fit(bay_envelope(), 5000.0).unwrap();
        for iy in 0..grid.ny {
            for ix in 0..grid.nx {
                let (lon, lat) = grid.cell_center(ix, iy);
                assert!(lon > grid.envelope.min_lon && lon < grid.envelope.max_lon);
                assert!(lat > grid.envelope.min_lat && lat < grid.envelope.max_lat);
            }
        }
    }

    #[test]
    fn test_envelope_of_points_skips_non_finite() {
        let envelope = Envelope::of_points(vec![
            (-76.0, 37.0),
            (f64::NAN, 50.0),
            (-75.0, 39.0),
        ])
        .expect("finite points should produce an envelope");
        assert_eq!(envelope.min_lon, -76.0);
        assert_eq!(envelope.max_lon, -75.0);
        assert_eq!(envelope.min_lat, 37.0);
        assert_eq!(envelope.max_lat, 39.0);
        assert!(Envelope::of_points(std::iter::empty()).is_none());
    }
}
