//! Native model output access.
//!
//! Presents every supported framework (ROMS, FVCOM, POM) through the same
//! flattened view: per-cell longitude, latitude, wet mask, and per-hour u/v
//! current components. Reading the NetCDF files themselves requires the
//! system NetCDF library and is gated behind the `netcdf` cargo feature;
//! the in-memory types are always available so index generation and
//! encoding can be exercised against synthetic geometry.

use thiserror::Error;

#[cfg(feature = "netcdf")]
use std::path::Path;

use crate::convert::grid::Envelope;
#[cfg(feature = "netcdf")]
use crate::model::ModelType;

/// Error type for native model output access.
#[derive(Debug, Error)]
pub enum NativeError {
    /// NetCDF library error
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// Missing variable
    #[error("missing variable: {0}")]
    MissingVariable(String),

    /// Geometry arrays disagree about the cell count
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Feature not enabled
    #[error("NetCDF feature not enabled")]
    FeatureDisabled,
}

/// Fill value for missing data (CF-conventions standard).
pub const FILL_VALUE_F32: f32 = 9.96921e+36;

/// Check if a value is valid (not a fill value).
#[inline]
pub fn is_valid_f32(v: f32) -> bool {
    v.is_finite() && v.abs() < 1.0e+30
}

// ---------------------------------------------------------------------------
// Native grid geometry
// ---------------------------------------------------------------------------

/// Flattened native model geometry. Structured grids flatten row-major;
/// unstructured meshes use their element ordering. Either way a native cell
/// is addressed by its flattened index, which is what the grid index stores.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeGrid {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    /// Model wet/dry mask: `false` cells never contribute to interpolation.
    pub wet: Vec<bool>,
}

impl NativeGrid {
    pub fn new(lon: Vec<f64>, lat: Vec<f64>, wet: Vec<bool>) -> Result<Self, NativeError> {
        if lon.len() != lat.len() || lon.len() != wet.len() {
            return Err(NativeError::DimensionMismatch(format!(
                "lon has {} cells, lat has {}, mask has {}",
                lon.len(),
                lat.len(),
                wet.len()
            )));
        }
        Ok(NativeGrid { lon, lat, wet })
    }

    pub fn len(&self) -> usize {
        self.lon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lon.is_empty()
    }

    /// Tight envelope over the wet cells. `None` when the grid has no wet
    /// cells with finite coordinates.
    pub fn envelope(&self) -> Option<Envelope> {
        Envelope::of_points(
            self.lon
                .iter()
                .zip(self.lat.iter())
                .zip(self.wet.iter())
                .filter(|(_, &wet)| wet)
                .map(|((&lon, &lat), _)| (lon, lat)),
        )
    }

    /// Reads the geometry of a native model output file.
    #[cfg(feature = "netcdf")]
    pub fn from_netcdf(path: &Path, model_type: ModelType) -> Result<Self, NativeError> {
        let file = netcdf::open(path)?;
        let (lon, lat) = match model_type {
            ModelType::Roms => (
                read_f64(&file, &["lon_rho"])?,
                read_f64(&file, &["lat_rho"])?,
            ),
            ModelType::Fvcom => (
                read_f64(&file, &["lonc", "lon"])?,
                read_f64(&file, &["latc", "lat"])?,
            ),
            ModelType::Pom => (
                read_f64(&file, &["lon", "longitude"])?,
                read_f64(&file, &["lat", "latitude"])?,
            ),
        };

        // ROMS carries an explicit land/sea mask; the other frameworks only
        // store wet cells.
        let wet = match model_type {
            ModelType::Roms => match read_f64(&file, &["mask_rho"]) {
                Ok(mask) => mask.iter().map(|&m| m > 0.5).collect(),
                Err(NativeError::MissingVariable(_)) => vec![true; lon.len()],
                Err(e) => return Err(e),
            },
            ModelType::Fvcom | ModelType::Pom => vec![true; lon.len()],
        };

        NativeGrid::new(lon, lat, wet)
    }

    #[cfg(not(feature = "netcdf"))]
    pub fn from_netcdf(
        _path: &std::path::Path,
        _model_type: crate::model::ModelType,
    ) -> Result<Self, NativeError> {
        Err(NativeError::FeatureDisabled)
    }
}

// ---------------------------------------------------------------------------
// Current fields
// ---------------------------------------------------------------------------

/// One lead hour of current vectors on the native grid, in m/s, aligned
/// with the `NativeGrid` cell ordering. Dry or missing cells hold fill
/// values.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentField {
    pub u: Vec<f32>,
    pub v: Vec<f32>,
}

impl CurrentField {
    pub fn new(u: Vec<f32>, v: Vec<f32>) -> Result<Self, NativeError> {
        if u.len() != v.len() {
            return Err(NativeError::DimensionMismatch(format!(
                "u has {} cells, v has {}",
                u.len(),
                v.len()
            )));
        }
        Ok(CurrentField { u, v })
    }

    pub fn len(&self) -> usize {
        self.u.len()
    }

    pub fn is_empty(&self) -> bool {
        self.u.is_empty()
    }

    /// Reads the surface-layer current vectors from a native model output
    /// file. Vertically-resolved variables are read at the surface layer;
    /// interpolation to an arbitrary target depth below surface is not
    /// resolved here and the requested depth is recorded in artifact
    /// metadata only.
    #[cfg(feature = "netcdf")]
    pub fn from_netcdf(path: &Path, model_type: ModelType) -> Result<Self, NativeError> {
        let file = netcdf::open(path)?;
        let (u_names, v_names): (&[&str], &[&str]) = match model_type {
            // Geographic-rotated components when present, raw otherwise.
            ModelType::Roms => (&["u_eastward", "u_sur", "u"], &["v_northward", "v_sur", "v"]),
            ModelType::Fvcom => (&["ua", "u"], &["va", "v"]),
            ModelType::Pom => (&["u", "ua"], &["v", "va"]),
        };
        let u = read_surface_f32(&file, u_names)?;
        let v = read_surface_f32(&file, v_names)?;
        CurrentField::new(u, v)
    }

    #[cfg(not(feature = "netcdf"))]
    pub fn from_netcdf(
        _path: &std::path::Path,
        _model_type: crate::model::ModelType,
    ) -> Result<Self, NativeError> {
        Err(NativeError::FeatureDisabled)
    }
}

// ---------------------------------------------------------------------------
// NetCDF helpers
// ---------------------------------------------------------------------------

/// Reads the first matching variable in full as f64.
#[cfg(feature = "netcdf")]
fn read_f64(file: &netcdf::File, names: &[&str]) -> Result<Vec<f64>, NativeError> {
    for name in names {
        if let Some(var) = file.variable(name) {
            let data: Vec<f64> = var.get_values(..)?;
            return Ok(data);
        }
    }
    Err(NativeError::MissingVariable(names.join(" or ")))
}

/// Whether a dimension name denotes a vertical coordinate.
#[cfg(feature = "netcdf")]
fn is_vertical_dim(name: &str) -> bool {
    matches!(name, "s_rho" | "s_w" | "siglay" | "siglev" | "level" | "depth" | "z")
}

/// Reads the first matching variable at the forecast's single time step,
/// selecting the surface layer when the variable is vertically resolved.
///
/// Supported layouts: `[cell]`, `[time, cell]`, `[time, level, cell]`,
/// `[time, eta, xi]` (flattened row-major), and `[time, level, eta, xi]`.
/// The surface is the last vertical level (ROMS sigma ordering, bottom
/// first).
#[cfg(feature = "netcdf")]
fn read_surface_f32(file: &netcdf::File, names: &[&str]) -> Result<Vec<f32>, NativeError> {
    for name in names {
        let Some(var) = file.variable(name) else { continue };
        let dims = var.dimensions();
        let data: Vec<f32> = match dims.len() {
            1 => var.get_values(..)?,
            2 => var.get_values((0, ..))?,
            3 => {
                if is_vertical_dim(&dims[1].name()) {
                    let surface = dims[1].len().saturating_sub(1);
                    var.get_values((0, surface, ..))?
                } else {
                    var.get_values((0, .., ..))?
                }
            }
            4 => {
                let surface = dims[1].len().saturating_sub(1);
                var.get_values((0, surface, .., ..))?
            }
            n => {
                return Err(NativeError::DimensionMismatch(format!(
                    "variable '{}' has unsupported rank {}",
                    name, n
                )));
            }
        };
        return Ok(data);
    }
    Err(NativeError::MissingVariable(names.join(" or ")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
