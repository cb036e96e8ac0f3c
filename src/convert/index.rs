//! Grid index generation and persistence.
//!
//! The grid index is the persisted description of the output grid and its
//! relationship to a model's native computational grid: the fitted regular
//! grid, a per-cell mapping onto the nearest wet native cell, and an
//! optional per-cell subgrid assignment. It is built once per
//! model/resolution/subgrid combination — index generation over a large
//! domain is slow by nature — and is read-only afterwards; only manual
//! regeneration invalidates it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::convert::grid::{GridError, RegularGrid};
use crate::convert::native::NativeGrid;
use crate::convert::shapes::{ShapeError, Shoreline, SubgridSet};
use crate::logging::{self, Stage};

/// Error type for index generation and access.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Shapes(#[from] ShapeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The native grid has no wet cells, or none of the output cells could
    /// be mapped onto it
    #[error("no water cells could be mapped inside the output envelope")]
    EmptyDomain,

    /// The index on disk was built for a different model
    #[error("index was built for model '{expected}', run requested '{requested}'")]
    ModelMismatch { expected: String, requested: String },
}

// ---------------------------------------------------------------------------
// Build request
// ---------------------------------------------------------------------------

/// Everything index generation needs, resolved up front by the caller.
pub struct IndexRequest {
    pub model_id: String,
    /// Target cell size of regular grid cells, in meters.
    pub cellsize_m: f64,
    /// Detailed land mask; without it the model's own wet mask decides.
    pub shoreline: Option<Shoreline>,
    /// Named subgrid tiles; without them the whole domain is one artifact.
    pub subgrids: Option<SubgridSet>,
}

// ---------------------------------------------------------------------------
// Persisted index
// ---------------------------------------------------------------------------

/// A named subgrid entry carried in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgridEntry {
    pub name: String,
}

/// Persisted grid index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridIndex {
    pub model_id: String,
    pub cellsize_m: f64,
    pub grid: RegularGrid,
    /// Number of cells in the native grid this index was built against;
    /// forecast fields must match before encoding.
    pub native_cells: usize,
    /// Per output cell (row-major, x fastest): flattened index of the
    /// contributing native cell, or `None` for land/out-of-domain cells.
    pub cell_map: Vec<Option<u32>>,
    /// Per output cell: position into `subgrids`, or `None` when the cell
    /// lies outside every subgrid tile. Empty subgrid list means the index
    /// was built without subsetting.
    pub subgrid_map: Vec<Option<u16>>,
    pub subgrids: Vec<SubgridEntry>,
}

impl GridIndex {
    /// Builds an index from native geometry and a build request.
    ///
    /// Every output cell center is classified (land via the shoreline mask
    /// when given), then mapped to the nearest wet native cell by squared
    /// equirectangular distance. Centers farther from any wet native cell
    /// than twice the larger of the native grid's estimated spacing and the
    /// output cell size are treated as outside the model domain.
    pub fn build(native: &NativeGrid, request: &IndexRequest) -> Result<Self, IndexError> {
        let envelope = native.envelope().ok_or(IndexError::EmptyDomain)?;
        let grid = RegularGrid::fit(envelope, request.cellsize_m)?;

        let wet_cells: Vec<(usize, f64, f64)> = native
            .lon
            .iter()
            .zip(native.lat.iter())
            .enumerate()
            .filter(|(i, _)| native.wet[*i])
            .map(|(i, (&lon, &lat))| (i, lon, lat))
            .collect();
        if wet_cells.is_empty() {
            return Err(IndexError::EmptyDomain);
        }

        // Estimated native spacing, for the out-of-domain cutoff: assume the
        // wet cells tile the envelope roughly uniformly.
        let spacing = ((envelope.width() * envelope.height()) / wet_cells.len() as f64)
            .sqrt()
            .max(f64::EPSILON);
        let cutoff = 2.0 * spacing.max(grid.cell_lon.max(grid.cell_lat));
        let cutoff_sq = cutoff * cutoff;
        let lat_scale = ((envelope.min_lat + envelope.max_lat) / 2.0).to_radians().cos();

        let mut cell_map = vec![None; grid.len()];
        let mut subgrid_map = vec![None; grid.len()];
        let subgrid_entries: Vec<SubgridEntry> = request
            .subgrids
            .as_ref()
            .map(|set| {
                set.polygons
                    .iter()
                    .map(|p| SubgridEntry { name: p.name.clone() })
                    .collect()
            })
            .unwrap_or_default();

        let mut mapped = 0usize;
        for iy in 0..grid.ny {
            for ix in 0..grid.nx {
                let (lon, lat) = grid.cell_center(ix, iy);
                if let Some(shoreline) = &request.shoreline {
                    if shoreline.is_land(lon, lat) {
                        continue;
                    }
                }

                let nearest = wet_cells
                    .iter()
                    .map(|&(i, nlon, nlat)| {
                        let dx = (nlon - lon) * lat_scale;
                        let dy = nlat - lat;
                        (i, dx * dx + dy * dy)
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1));

                let Some((native_idx, dist_sq)) = nearest else { continue };
                if dist_sq > cutoff_sq {
                    continue;
                }

                let cell = grid.cell_index(ix, iy);
                cell_map[cell] = Some(native_idx as u32);
                mapped += 1;

                if let Some(set) = &request.subgrids {
                    subgrid_map[cell] = set.assign(lon, lat).map(|s| s as u16);
                }
            }
        }

        if mapped == 0 {
            return Err(IndexError::EmptyDomain);
        }
        logging::info(
            Stage::Index,
            Some(&request.model_id),
            &format!(
                "Mapped {}/{} output cells onto {} wet native cells",
                mapped,
                grid.len(),
                wet_cells.len()
            ),
        );

        Ok(GridIndex {
            model_id: request.model_id.clone(),
            cellsize_m: request.cellsize_m,
            grid,
            native_cells: native.len(),
            cell_map,
            subgrid_map,
            subgrids: subgrid_entries,
        })
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let file = fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let file = fs::File::open(path)?;
        let index = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(index)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Fails when the index was built for a different model than the run
    /// requests.
    pub fn ensure_model(&self, model_id: &str) -> Result<(), IndexError> {
        if self.model_id == model_id {
            Ok(())
        } else {
            Err(IndexError::ModelMismatch {
                expected: self.model_id.clone(),
                requested: model_id.to_string(),
            })
        }
    }

    pub fn has_subgrids(&self) -> bool {
        !self.subgrids.is_empty()
    }

    /// Number of output cells mapped to a native cell.
    pub fn mapped_cells(&self) -> usize {
        self.cell_map.iter().filter(|c| c.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};

    /// A small uniform wet lattice: 10x10 native cells over a ~0.9 x 0.9
    /// degree box near the Chesapeake entrance.
    fn lattice() -> NativeGrid {
        let mut lon = Vec::new();
        let mut lat = Vec::new();
        for iy in 0..10 {
            for ix in 0..10 {
                lon.push(-76.0 + 0.1 * ix as f64);
                lat.push(37.0 + 0.1 * iy as f64);
            }
        }
        let wet = vec![true; lon.len()];
        NativeGrid::new(lon, lat, wet).unwrap()
    }

    fn request(cellsize_m: f64) -> IndexRequest {
        IndexRequest {
            model_id: "cbofs".to_string(),
            cellsize_m,
            shoreline: None,
            subgrids: None,
        }
    }

    #[test]
    fn test_build_maps_every_cell_on_a_fully_wet_domain() {
        let index = GridIndex::build(&lattice(), &request(5000.0)).expect("build should succeed");
        assert_eq!(index.model_id, "cbofs");
        assert_eq!(index.native_cells, 100);
        assert_eq!(index.cell_map.len(), index.grid.len());
        assert_eq!(index.mapped_cells(), index.grid.len());
        assert!(index.cell_map.iter().flatten().all(|&n| (n as usize) < 100));
    }

    #[test]
    fn test_build_is_idempotent() {
        // Repeated builds from the same inputs must describe the same grid.
        let a = GridIndex::build(&lattice(), &request(5000.0)).unwrap();
        let b = GridIndex::build(&lattice(), &request(5000.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_rejects_invalid_cell_size_before_any_mapping() {
        let result = GridIndex::build(&lattice(), &request(-1.0));
        assert!(matches!(result, Err(IndexError::Grid(GridError::InvalidCellSize(_)))));
    }

    #[test]
    fn test_build_rejects_all_dry_native_grid() {
        let dry = NativeGrid::new(vec![-76.0, -75.9], vec![37.0, 37.0], vec![false, false]).unwrap();
        assert!(matches!(GridIndex::build(&dry, &request(500.0)), Err(IndexError::EmptyDomain)));
    }

    #[test]
    fn test_shoreline_masks_land_cells() {
        // Land over the western half of the lattice: roughly half the
        // output cells must be unmapped.
        let land = Polygon::new(
            LineString::from(vec![
                (-76.05, 36.95),
                (-75.55, 36.95),
                (-75.55, 37.95),
                (-76.05, 37.95),
                (-76.05, 36.95),
            ]),
            vec![],
        );
        let mut req = request(5000.0);
        req.shoreline = Some(Shoreline::from_polygons(vec![land]));

        let masked = GridIndex::build(&lattice(), &req).expect("build should succeed");
        let unmasked = GridIndex::build(&lattice(), &request(5000.0)).unwrap();
        assert!(masked.mapped_cells() < unmasked.mapped_cells());
        assert!(masked.mapped_cells() > 0);
    }

    #[test]
    fn test_subgrid_assignment_recorded_per_cell() {
        use crate::convert::shapes::{SubgridPolygon, SubgridSet};

        fn tile(name: &str, min_x: f64, max_x: f64) -> SubgridPolygon {
            let ring = LineString::from(vec![
                (min_x, 36.9),
                (max_x, 36.9),
                (max_x, 38.0),
                (min_x, 38.0),
                (min_x, 36.9),
            ]);
            SubgridPolygon::new(name, MultiPolygon(vec![Polygon::new(ring, vec![])]))
        }

        let set = SubgridSet::from_polygons(vec![
            tile("west", -76.05, -75.55),
            tile("east", -75.55, -75.05),
        ])
        .unwrap();

        let mut req = request(5000.0);
        req.subgrids = Some(set);
        let index = GridIndex::build(&lattice(), &req).unwrap();

        assert_eq!(index.subgrids.len(), 2);
        assert!(index.has_subgrids());
        let assigned = index.subgrid_map.iter().flatten().count();
        assert!(assigned > 0, "some cells must land in a subgrid");
        assert!(
            index.subgrid_map.iter().flatten().all(|&s| s < 2),
            "assignments must reference the subgrid table"
        );
    }

    #[test]
    fn test_save_and_load_preserve_index() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("cbofs_index_500m.json");

        let index = GridIndex::build(&lattice(), &request(5000.0)).unwrap();
        index.save(&path).expect("save should succeed");
        let loaded = GridIndex::load(&path).expect("load should succeed");
        assert_eq!(index, loaded);
    }

    #[test]
    fn test_ensure_model_rejects_mismatch() {
        let index = GridIndex::build(&lattice(), &request(5000.0)).unwrap();
        assert!(index.ensure_model("cbofs").is_ok());
        assert!(matches!(
            index.ensure_model("dbofs"),
            Err(IndexError::ModelMismatch { .. })
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = GridIndex::load(Path::new("/nonexistent/cbofs_index.json"));
        assert!(matches!(result, Err(IndexError::Io(_))));
    }
}
