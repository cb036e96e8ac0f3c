//! Shoreline and subgrid shapefile loading.
//!
//! Loads polygon shapefiles and provides point-in-polygon classification:
//! a shoreline shapefile (e.g. NOS' nos80k) supplies a detailed land mask,
//! and a subgrid shapefile partitions the model domain into named tiles
//! used to bound output file size.

use std::collections::HashSet;
use std::path::Path;

use geo::{Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use shapefile::dbase::FieldValue;
use shapefile::{Reader, Shape};
use thiserror::Error;

/// Error type for shapefile operations.
#[derive(Debug, Error)]
pub enum ShapeError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shapefile parsing error
    #[error("shapefile error: {0}")]
    Shapefile(String),

    /// No polygon records found in the file
    #[error("no polygons found in shapefile [{0}]")]
    NoPolygons(String),

    /// The designated naming attribute is missing or empty on a record
    #[error("subgrid field '{field}' missing or empty on record {record}")]
    MissingField { field: String, record: usize },

    /// The designated naming attribute resolves to the same value twice
    #[error("subgrid name '{name}' duplicated across polygons")]
    DuplicateName { name: String },
}

impl From<shapefile::Error> for ShapeError {
    fn from(e: shapefile::Error) -> Self {
        ShapeError::Shapefile(e.to_string())
    }
}

/// Converts one shapefile polygon record into geo polygons, one per ring.
/// Holes are treated as separate rings; for mask and assignment purposes a
/// point inside a hole ring still tests inside the outer ring first.
fn shape_polygons(polygon: &shapefile::Polygon) -> Vec<Polygon<f64>> {
    let mut polygons = Vec::new();
    for ring in polygon.rings() {
        let coords: Vec<Coord<f64>> = ring
            .points()
            .iter()
            .map(|p| Coord { x: p.x, y: p.y })
            .collect();
        if coords.len() >= 4 {
            polygons.push(Polygon::new(LineString::from(coords), vec![]));
        }
    }
    polygons
}

// ---------------------------------------------------------------------------
// Shoreline land mask
// ---------------------------------------------------------------------------

/// Land polygons loaded from a shoreline shapefile.
///
/// Provides the detailed land mask applied during index generation; output
/// cells whose centers fall on land never receive interpolated currents.
pub struct Shoreline {
    land: MultiPolygon<f64>,
}

impl Shoreline {
    /// Loads every polygon in the shapefile as a land polygon.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ShapeError> {
        let display = path.as_ref().display().to_string();
        let mut reader = Reader::from_path(path)?;

        let mut polygons = Vec::new();
        for result in reader.iter_shapes_and_records() {
            let (shape, _record) = result?;
            if let Shape::Polygon(polygon) = shape {
                polygons.extend(shape_polygons(&polygon));
            }
        }

        if polygons.is_empty() {
            return Err(ShapeError::NoPolygons(display));
        }
        Ok(Self::from_polygons(polygons))
    }

    /// Builds a shoreline from in-memory polygons.
    pub fn from_polygons(polygons: Vec<Polygon<f64>>) -> Self {
        Shoreline { land: MultiPolygon(polygons) }
    }

    /// True when the point falls inside a land polygon.
    pub fn is_land(&self, lon: f64, lat: f64) -> bool {
        self.land.contains(&Point::new(lon, lat))
    }

    pub fn polygon_count(&self) -> usize {
        self.land.0.len()
    }
}

// ---------------------------------------------------------------------------
// Subgrid polygons
// ---------------------------------------------------------------------------

/// One named subgrid tile. A record with multiple rings keeps them all.
pub struct SubgridPolygon {
    pub name: String,
    shape: MultiPolygon<f64>,
}

impl SubgridPolygon {
    pub fn new(name: impl Into<String>, shape: MultiPolygon<f64>) -> Self {
        SubgridPolygon { name: name.into(), shape }
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.shape.contains(&Point::new(lon, lat))
    }
}

/// The full set of named subgrid tiles for a model domain.
pub struct SubgridSet {
    pub polygons: Vec<SubgridPolygon>,
}

impl SubgridSet {
    /// Loads subgrid polygons, naming each record by the designated
    /// attribute, or by its record number when no attribute is designated.
    ///
    /// A designated attribute that is missing/empty on a record, or that
    /// resolves to the same value on two records, is a configuration error:
    /// artifact names derived from it would collide or be meaningless.
    pub fn load<P: AsRef<Path>>(path: P, field: Option<&str>) -> Result<Self, ShapeError> {
        let display = path.as_ref().display().to_string();
        let mut reader = Reader::from_path(path)?;

        let mut polygons = Vec::new();
        for (record_no, result) in reader.iter_shapes_and_records().enumerate() {
            let (shape, record) = result?;
            let Shape::Polygon(polygon) = shape else { continue };

            let name = match field {
                Some(field_name) => {
                    field_string(record.get(field_name)).ok_or(ShapeError::MissingField {
                        field: field_name.to_string(),
                        record: record_no,
                    })?
                }
                None => record_no.to_string(),
            };

            polygons.push(SubgridPolygon {
                name,
                shape: MultiPolygon(shape_polygons(&polygon)),
            });
        }

        if polygons.is_empty() {
            return Err(ShapeError::NoPolygons(display));
        }
        Self::from_polygons(polygons)
    }

    /// Builds a subgrid set from in-memory polygons, enforcing unique names.
    pub fn from_polygons(polygons: Vec<SubgridPolygon>) -> Result<Self, ShapeError> {
        let mut seen = HashSet::new();
        for polygon in &polygons {
            if !seen.insert(polygon.name.clone()) {
                return Err(ShapeError::DuplicateName { name: polygon.name.clone() });
            }
        }
        Ok(SubgridSet { polygons })
    }

    /// Index of the first subgrid containing the point, if any. First-match
    /// assignment keeps the cell partition disjoint even when tiles overlap
    /// at their borders.
    pub fn assign(&self, lon: f64, lat: f64) -> Option<usize> {
        self.polygons.iter().position(|p| p.contains(lon, lat))
    }

    pub fn names(&self) -> Vec<&str> {
        self.polygons.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Renders a dBASE field value as a subgrid name. Numeric identifiers are
/// common in grid shapefiles; integral floats render without the fraction.
fn field_string(value: Option<&FieldValue>) -> Option<String> {
    match value? {
        FieldValue::Character(Some(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
        }
        FieldValue::Numeric(Some(n)) => {
            if n.fract() == 0.0 {
                Some(format!("{}", *n as i64))
            } else {
                Some(format!("{}", n))
            }
        }
        FieldValue::Float(Some(n)) => Some(format!("{}", n)),
        FieldValue::Integer(n) => Some(format!("{}", n)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (min_x, min_y),
                (max_x, min_y),
                (max_x, max_y),
                (min_x, max_y),
                (min_x, min_y),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_shoreline_classifies_land_and_water() {
        let shoreline = Shoreline::from_polygons(vec![square(-76.0, 37.0, -75.0, 38.0)]);
        assert!(shoreline.is_land(-75.5, 37.5));
        assert!(!shoreline.is_land(-76.5, 37.5));
    }

    #[test]
    fn test_subgrid_assignment_is_first_match() {
        // Two tiles overlapping on [-75.6, -75.4]: the first must win so
        // every point has exactly one assignment.
        let set = SubgridSet::from_polygons(vec![
            SubgridPolygon {
                name: "west".into(),
                shape: MultiPolygon(vec![square(-76.0, 37.0, -75.4, 38.0)]),
            },
            SubgridPolygon {
                name: "east".into(),
                shape: MultiPolygon(vec![square(-75.6, 37.0, -75.0, 38.0)]),
            },
        ])
        .expect("unique names should be accepted");

        assert_eq!(set.assign(-75.8, 37.5), Some(0));
        assert_eq!(set.assign(-75.5, 37.5), Some(0), "overlap resolves to first tile");
        assert_eq!(set.assign(-75.2, 37.5), Some(1));
        assert_eq!(set.assign(-74.0, 37.5), None, "outside all tiles");
    }

    #[test]
    fn test_duplicate_subgrid_names_are_rejected() {
        let result = SubgridSet::from_polygons(vec![
            SubgridPolygon {
                name: "tile".into(),
                shape: MultiPolygon(vec![square(0.0, 0.0, 1.0, 1.0)]),
            },
            SubgridPolygon {
                name: "tile".into(),
                shape: MultiPolygon(vec![square(2.0, 0.0, 3.0, 1.0)]),
            },
        ]);
        assert!(matches!(result, Err(ShapeError::DuplicateName { .. })));
    }

    #[test]
    fn test_field_string_renders_numeric_identifiers() {
        assert_eq!(
            field_string(Some(&FieldValue::Numeric(Some(42.0)))),
            Some("42".to_string())
        );
        assert_eq!(
            field_string(Some(&FieldValue::Character(Some("  band4 ".to_string())))),
            Some("band4".to_string())
        );
        assert_eq!(field_string(Some(&FieldValue::Character(Some("  ".to_string())))), None);
        assert_eq!(field_string(None), None);
    }
}
