//! S-111 cycle artifact assembly and writing.
//!
//! One artifact holds every forecast projection of a single cycle, ordered
//! by lead hour. An hour that failed acquisition is represented as an
//! explicit gap entry, never dropped: consumers rely on the fixed
//! hour-to-index correspondence of the series. Writing the artifact file
//! requires the system NetCDF/HDF5 libraries and is gated behind the
//! `netcdf` cargo feature; assembly itself is pure.

use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

use crate::convert::index::GridIndex;
use crate::convert::native::{CurrentField, NativeError, is_valid_f32};
use crate::cycle::cycle_compact;
use crate::logging::{self, Stage};
use crate::model::{CodingFormat, HourFetch};
use crate::registry::OfsModel;

/// Conversion factor from m/s to knots.
pub const MS_TO_KNOTS: f64 = 1.943_844_49;

/// Error type for encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Native(#[from] NativeError),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The forecast field disagrees with the geometry the index was built
    /// against
    #[error("field has {got} native cells, index expects {expected}")]
    CellCountMismatch { got: usize, expected: usize },

    /// Not a single hour of the cycle was available to encode
    #[error("no forecast hours were retrieved for cycle {0}")]
    EmptyCycle(String),

    /// Artifact writing requested without the `netcdf` feature
    #[error("NetCDF feature not enabled")]
    FeatureDisabled,
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// Current speed and direction at one output cell.
///
/// Speed is in knots; direction is degrees true, the heading the water
/// flows toward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellCurrent {
    pub speed_kn: f32,
    pub dir_deg: f32,
}

/// One lead hour of the output series: interpolated cell values, or an
/// explicit gap when the hour could not be acquired.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Data { hour: u16, cells: Vec<Option<CellCurrent>> },
    Gap { hour: u16, reason: String },
}

impl Projection {
    pub fn hour(&self) -> u16 {
        match self {
            Projection::Data { hour, .. } | Projection::Gap { hour, .. } => *hour,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, Projection::Gap { .. })
    }
}

/// One cycle's complete output series, tagged with model, cycle, coding
/// format, and target depth metadata. Projections stay ordered by lead hour
/// regardless of insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleArtifact {
    pub model_id: String,
    pub region: String,
    pub product: String,
    pub cycle: DateTime<Utc>,
    pub coding_format: CodingFormat,
    pub target_depth_m: f64,
    pub projections: Vec<Projection>,
}

impl CycleArtifact {
    pub fn new(
        model: &OfsModel,
        cycle: DateTime<Utc>,
        coding_format: CodingFormat,
        target_depth_m: f64,
    ) -> Self {
        CycleArtifact {
            model_id: model.id.to_string(),
            region: model.region.to_string(),
            product: model.product.to_string(),
            cycle,
            coding_format,
            target_depth_m,
            projections: Vec::new(),
        }
    }

    /// Inserts a projection at its hour-ordered position.
    pub fn push(&mut self, projection: Projection) {
        let at = self
            .projections
            .partition_point(|p| p.hour() < projection.hour());
        self.projections.insert(at, projection);
    }

    pub fn data_count(&self) -> usize {
        self.projections.iter().filter(|p| !p.is_gap()).count()
    }

    pub fn gap_hours(&self) -> Vec<u16> {
        self.projections.iter().filter(|p| p.is_gap()).map(|p| p.hour()).collect()
    }
}

// ---------------------------------------------------------------------------
// Field projection
// ---------------------------------------------------------------------------

/// Converts a native u/v pair to speed (knots) and direction (degrees true,
/// heading toward). Invalid components yield `None`.
pub fn to_cell_current(u: f32, v: f32) -> Option<CellCurrent> {
    if !is_valid_f32(u) || !is_valid_f32(v) {
        return None;
    }
    let (u, v) = (u as f64, v as f64);
    let speed_kn = (u * u + v * v).sqrt() * MS_TO_KNOTS;
    let mut dir_deg = u.atan2(v).to_degrees();
    if dir_deg < 0.0 {
        dir_deg += 360.0;
    }
    Some(CellCurrent { speed_kn: speed_kn as f32, dir_deg: dir_deg as f32 })
}

/// Projects one native field onto the output grid through the index's
/// per-cell mapping.
pub fn project_field(
    index: &GridIndex,
    field: &CurrentField,
) -> Result<Vec<Option<CellCurrent>>, EncodeError> {
    if field.len() != index.native_cells {
        return Err(EncodeError::CellCountMismatch {
            got: field.len(),
            expected: index.native_cells,
        });
    }
    Ok(index
        .cell_map
        .iter()
        .map(|mapped| {
            mapped.and_then(|native| {
                let native = native as usize;
                to_cell_current(field.u[native], field.v[native])
            })
        })
        .collect())
}

/// Carries a native field through untouched (coding format 3): one entry
/// per native cell, invalid cells as `None`.
pub fn project_native(field: &CurrentField) -> Vec<Option<CellCurrent>> {
    field
        .u
        .iter()
        .zip(field.v.iter())
        .map(|(&u, &v)| to_cell_current(u, v))
        .collect()
}

// ---------------------------------------------------------------------------
// Cycle assembly
// ---------------------------------------------------------------------------

/// Everything one cycle's encoding needs, resolved up front by the caller.
pub struct ConvertRequest<'a> {
    pub model: &'a OfsModel,
    pub cycle: DateTime<Utc>,
    pub coding_format: CodingFormat,
    pub target_depth_m: f64,
    pub hours: &'a [HourFetch],
}

/// Assembles a full cycle artifact, reading each retrieved hour through
/// `read` and carrying acquisition gaps into the series.
///
/// A file that fails to read is an encoding error and fatal for the cycle
/// (unlike acquisition failures, which were already converted into gaps).
/// Zero data hours is fatal: there is nothing to encode.
pub fn assemble_cycle<F>(
    request: &ConvertRequest,
    index: Option<&GridIndex>,
    mut read: F,
) -> Result<CycleArtifact, EncodeError>
where
    F: FnMut(&Path) -> Result<CurrentField, NativeError>,
{
    let mut artifact = CycleArtifact::new(
        request.model,
        request.cycle,
        request.coding_format,
        request.target_depth_m,
    );

    for hour_fetch in request.hours {
        match hour_fetch {
            HourFetch::Retrieved { hour, path } => {
                let field = read(path)?;
                let cells = match index {
                    Some(index) => project_field(index, &field)?,
                    None => project_native(&field),
                };
                artifact.push(Projection::Data { hour: *hour, cells });
            }
            HourFetch::Gap { hour, reason } => {
                artifact.push(Projection::Gap { hour: *hour, reason: reason.to_string() });
            }
        }
    }

    if artifact.data_count() == 0 {
        return Err(EncodeError::EmptyCycle(cycle_compact(&request.cycle)));
    }

    let gaps = artifact.gap_hours();
    if !gaps.is_empty() {
        logging::warn(
            Stage::Encode,
            Some(&artifact.model_id),
            &format!(
                "Cycle {} encoded with {} gap hour(s)",
                cycle_compact(&artifact.cycle),
                gaps.len()
            ),
        );
    }
    Ok(artifact)
}

/// Assembles a full cycle artifact by reading each retrieved hour from its
/// NetCDF file.
pub fn encode_cycle(
    request: &ConvertRequest,
    index: Option<&GridIndex>,
) -> Result<CycleArtifact, EncodeError> {
    let model_type = request.model.model_type;
    assemble_cycle(request, index, |path| CurrentField::from_netcdf(path, model_type))
}

// ---------------------------------------------------------------------------
// Artifact writing
// ---------------------------------------------------------------------------

/// File name of a cycle artifact, optionally tagged with a subgrid name.
pub fn artifact_filename(artifact: &CycleArtifact, subgrid: Option<&str>) -> String {
    match subgrid {
        Some(name) => format!(
            "s111_{}_{}_{}.h5",
            artifact.model_id,
            cycle_compact(&artifact.cycle),
            name
        ),
        None => format!("s111_{}_{}.h5", artifact.model_id, cycle_compact(&artifact.cycle)),
    }
}

/// Writes one artifact into `out_dir` as an HDF5-backed NetCDF-4 file:
/// speed/direction laid out `[time, cell]` with gap hours holding fill
/// values, plus a per-hour lead-hour coordinate and a data-presence flag.
#[cfg(feature = "netcdf")]
pub fn write_artifact(
    artifact: &CycleArtifact,
    out_dir: &Path,
    subgrid: Option<&str>,
) -> Result<std::path::PathBuf, EncodeError> {
    use crate::convert::native::FILL_VALUE_F32;

    let n_cells = artifact
        .projections
        .iter()
        .find_map(|p| match p {
            Projection::Data { cells, .. } => Some(cells.len()),
            Projection::Gap { .. } => None,
        })
        .ok_or_else(|| EncodeError::EmptyCycle(cycle_compact(&artifact.cycle)))?;

    let path = out_dir.join(artifact_filename(artifact, subgrid));
    let mut file = netcdf::create(&path)?;

    file.add_attribute("model", artifact.model_id.as_str())?;
    file.add_attribute("region", artifact.region.as_str())?;
    file.add_attribute("product", artifact.product.as_str())?;
    file.add_attribute("issuance", cycle_compact(&artifact.cycle).as_str())?;
    file.add_attribute("data_coding_format", i32::from(artifact.coding_format.value()))?;
    file.add_attribute("target_depth_m", artifact.target_depth_m)?;
    if let Some(name) = subgrid {
        file.add_attribute("subgrid", name)?;
    }

    file.add_dimension("time", artifact.projections.len())?;
    file.add_dimension("cell", n_cells)?;

    {
        let mut hour_var = file.add_variable::<i32>("forecast_hour", &["time"])?;
        hour_var.put_attribute("long_name", "forecast lead hour")?;
        let hours: Vec<i32> = artifact.projections.iter().map(|p| i32::from(p.hour())).collect();
        hour_var.put_values(&hours, ..)?;
    }

    {
        let mut present_var = file.add_variable::<i8>("hour_present", &["time"])?;
        present_var.put_attribute("long_name", "1 when the hour holds data, 0 for a gap")?;
        let present: Vec<i8> =
            artifact.projections.iter().map(|p| if p.is_gap() { 0 } else { 1 }).collect();
        present_var.put_values(&present, ..)?;
    }

    {
        let mut speed_var = file.add_variable::<f32>("surface_current_speed", &["time", "cell"])?;
        speed_var.put_attribute("units", "knots")?;
        speed_var.put_attribute("_FillValue", FILL_VALUE_F32)?;
    }
    {
        let mut dir_var =
            file.add_variable::<f32>("surface_current_direction", &["time", "cell"])?;
        dir_var.put_attribute("units", "degrees true")?;
        dir_var.put_attribute("_FillValue", FILL_VALUE_F32)?;
    }

    {
        for (t, projection) in artifact.projections.iter().enumerate() {
            let (speed, dir): (Vec<f32>, Vec<f32>) = match projection {
                Projection::Data { cells, .. } => cells
                    .iter()
                    .map(|c| match c {
                        Some(c) => (c.speed_kn, c.dir_deg),
                        None => (FILL_VALUE_F32, FILL_VALUE_F32),
                    })
                    .unzip(),
                Projection::Gap { .. } => {
                    (vec![FILL_VALUE_F32; n_cells], vec![FILL_VALUE_F32; n_cells])
                }
            };
            let mut speed_var = file
                .variable_mut("surface_current_speed")
                .ok_or_else(|| NativeError::MissingVariable("surface_current_speed".into()))?;
            speed_var.put_values(&speed, (t, ..))?;
            let mut dir_var = file
                .variable_mut("surface_current_direction")
                .ok_or_else(|| NativeError::MissingVariable("surface_current_direction".into()))?;
            dir_var.put_values(&dir, (t, ..))?;
        }
    }

    logging::info(
        Stage::Encode,
        Some(&artifact.model_id),
        &format!("Wrote {}", path.display()),
    );
    Ok(path)
}

#[cfg(not(feature = "netcdf"))]
pub fn write_artifact(
    _artifact: &CycleArtifact,
    _out_dir: &Path,
    _subgrid: Option<&str>,
) -> Result<std::path::PathBuf, EncodeError> {
    Err(EncodeError::FeatureDisabled)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::index::{GridIndex, IndexRequest};
    use crate::convert::native::NativeGrid;
    use crate::model::FetchError;
    use crate::registry::find_model;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn cbofs() -> &'static OfsModel {
        find_model("cbofs").unwrap()
    }

    fn cycle() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 7, 1, 0, 0, 0).unwrap()
    }

    fn lattice() -> NativeGrid {
        let mut lon = Vec::new();
        let mut lat = Vec::new();
        for iy in 0..5 {
            for ix in 0..5 {
                lon.push(-76.0 + 0.1 * ix as f64);
                lat.push(37.0 + 0.1 * iy as f64);
            }
        }
        NativeGrid::new(lon.clone(), lat, vec![true; lon.len()]).unwrap()
    }

    fn lattice_index() -> GridIndex {
        let request = IndexRequest {
            model_id: "cbofs".into(),
            cellsize_m: 10_000.0,
            shoreline: None,
            subgrids: None,
        };
        GridIndex::build(&lattice(), &request).unwrap()
    }

    fn uniform_field(n: usize, u: f32, v: f32) -> CurrentField {
        CurrentField::new(vec![u; n], vec![v; n]).unwrap()
    }

    // --- Speed/direction conversion -----------------------------------------

    #[test]
    fn test_eastward_flow_heads_090() {
        let cell = to_cell_current(1.0, 0.0).expect("valid components");
        assert!((cell.dir_deg - 90.0).abs() < 1e-4);
        assert!((cell.speed_kn - 1.943_844_5).abs() < 1e-4);
    }

    #[test]
    fn test_southward_flow_heads_180() {
        let cell = to_cell_current(0.0, -1.0).expect("valid components");
        assert!((cell.dir_deg - 180.0).abs() < 1e-4);
    }

    #[test]
    fn test_westward_flow_heads_270() {
        let cell = to_cell_current(-1.0, 0.0).expect("valid components");
        assert!((cell.dir_deg - 270.0).abs() < 1e-4);
    }

    #[test]
    fn test_fill_components_yield_none() {
        use crate::convert::native::FILL_VALUE_F32;
        assert!(to_cell_current(FILL_VALUE_F32, 0.0).is_none());
        assert!(to_cell_current(0.0, f32::NAN).is_none());
    }

    // --- Projection ----------------------------------------------------------

    #[test]
    fn test_project_field_follows_cell_map() {
        let index = lattice_index();
        let cells = project_field(&index, &uniform_field(25, 1.0, 0.0)).unwrap();
        assert_eq!(cells.len(), index.grid.len());
        for (cell, mapped) in cells.iter().zip(index.cell_map.iter()) {
            assert_eq!(cell.is_some(), mapped.is_some());
        }
    }

    #[test]
    fn test_project_field_rejects_wrong_cell_count() {
        let index = lattice_index();
        let result = project_field(&index, &uniform_field(7, 1.0, 0.0));
        assert!(matches!(result, Err(EncodeError::CellCountMismatch { got: 7, .. })));
    }

    // --- Series ordering and gaps --------------------------------------------

    fn synthetic_hours(gap_at: Option<u16>, max: u16) -> Vec<HourFetch> {
        (0..=max)
            .map(|hour| {
                if Some(hour) == gap_at {
                    HourFetch::Gap { hour, reason: FetchError::HttpStatus(404) }
                } else {
                    HourFetch::Retrieved { hour, path: PathBuf::from(format!("f{:03}.nc", hour)) }
                }
            })
            .collect()
    }

    #[test]
    fn test_assemble_preserves_gap_as_series_entry() {
        // Hour 7 failed to download: the series must still carry all other
        // hours in order, with hour 7 present as an explicit gap.
        let index = lattice_index();
        let hours = synthetic_hours(Some(7), 12);
        let request = ConvertRequest {
            model: cbofs(),
            cycle: cycle(),
            coding_format: CodingFormat::RegularGrid,
            target_depth_m: 4.5,
            hours: &hours,
        };
        let artifact = assemble_cycle(&request, Some(&index), |_| Ok(uniform_field(25, 0.5, 0.5)))
            .expect("assembly should succeed");

        let hours: Vec<u16> = artifact.projections.iter().map(|p| p.hour()).collect();
        assert_eq!(hours, (0..=12).collect::<Vec<u16>>());
        assert!(artifact.projections[7].is_gap());
        assert_eq!(artifact.data_count(), 12);
        assert_eq!(artifact.gap_hours(), vec![7]);
    }

    #[test]
    fn test_assemble_orders_hours_regardless_of_input_order() {
        let index = lattice_index();
        let mut hours = synthetic_hours(None, 5);
        hours.reverse();
        let request = ConvertRequest {
            model: cbofs(),
            cycle: cycle(),
            coding_format: CodingFormat::RegularGrid,
            target_depth_m: 4.5,
            hours: &hours,
        };
        let artifact = assemble_cycle(&request, Some(&index), |_| Ok(uniform_field(25, 0.5, 0.5)))
            .expect("assembly should succeed");
        let ordered: Vec<u16> = artifact.projections.iter().map(|p| p.hour()).collect();
        assert_eq!(ordered, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_assemble_all_gaps_is_fatal() {
        let index = lattice_index();
        let hours: Vec<HourFetch> = (0..3)
            .map(|hour| HourFetch::Gap { hour, reason: FetchError::HttpStatus(404) })
            .collect();
        let request = ConvertRequest {
            model: cbofs(),
            cycle: cycle(),
            coding_format: CodingFormat::RegularGrid,
            target_depth_m: 4.5,
            hours: &hours,
        };
        let result = assemble_cycle(&request, Some(&index), |_| Ok(uniform_field(25, 0.5, 0.5)));
        assert!(matches!(result, Err(EncodeError::EmptyCycle(_))));
    }

    #[test]
    fn test_assemble_read_failure_is_fatal_for_the_cycle() {
        // Acquisition failures become gaps, but a retrieved file that turns
        // out malformed is an encoding error.
        let index = lattice_index();
        let hours = synthetic_hours(None, 3);
        let request = ConvertRequest {
            model: cbofs(),
            cycle: cycle(),
            coding_format: CodingFormat::RegularGrid,
            target_depth_m: 4.5,
            hours: &hours,
        };
        let result = assemble_cycle(&request, Some(&index), |_| {
            Err(NativeError::MissingVariable("u".into()))
        });
        assert!(matches!(result, Err(EncodeError::Native(_))));
    }

    #[test]
    fn test_full_cycle_yields_49_tagged_projections() {
        // cbofs cycle 2019070100 with hours 0-48 all available: one
        // artifact, 49 ordered projections, cycle tag preserved.
        let index = lattice_index();
        let hours = synthetic_hours(None, 48);
        let request = ConvertRequest {
            model: cbofs(),
            cycle: cycle(),
            coding_format: CodingFormat::RegularGrid,
            target_depth_m: 4.5,
            hours: &hours,
        };
        let artifact = assemble_cycle(&request, Some(&index), |_| Ok(uniform_field(25, 0.5, 0.0)))
            .expect("assembly should succeed");
        assert_eq!(artifact.projections.len(), 49);
        assert_eq!(artifact.data_count(), 49);
        assert_eq!(cycle_compact(&artifact.cycle), "2019070100");
        assert_eq!(artifact.model_id, "cbofs");
        assert_eq!(artifact.coding_format, CodingFormat::RegularGrid);
    }

    #[test]
    fn test_artifact_filename_embeds_cycle_and_subgrid() {
        let artifact = CycleArtifact::new(cbofs(), cycle(), CodingFormat::RegularGrid, 4.5);
        assert_eq!(artifact_filename(&artifact, None), "s111_cbofs_2019070100.h5");
        assert_eq!(
            artifact_filename(&artifact, Some("band4")),
            "s111_cbofs_2019070100_band4.h5"
        );
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_write_without_feature_reports_disabled() {
        let artifact = CycleArtifact::new(cbofs(), cycle(), CodingFormat::RegularGrid, 4.5);
        let result = write_artifact(&artifact, Path::new("/tmp"), None);
        assert!(matches!(result, Err(EncodeError::FeatureDisabled)));
    }
}
