//! Subgrid chopping.
//!
//! Partitions one encoded cycle artifact into per-subgrid artifacts using
//! the index's per-cell assignment, to bound individual file size. The
//! partition is exact: no output cell is duplicated across subgrids or
//! lost, except for cells outside every subgrid polygon, which are dropped
//! by design.

use crate::convert::encode::{CycleArtifact, Projection};
use crate::convert::index::GridIndex;
use crate::logging::{self, Stage};

/// One subgrid's slice of a cycle artifact.
pub struct SubgridArtifact {
    pub name: String,
    /// Flattened output-grid cell indices this subgrid carries, ascending.
    pub cell_indices: Vec<usize>,
    pub artifact: CycleArtifact,
}

/// Partitions `artifact` by the index's subgrid assignment.
///
/// Returns one artifact per subgrid that holds at least one cell; empty
/// subgrids produce no file. An index built without subgrids yields an
/// empty list and the caller keeps the whole-domain artifact.
pub fn chop_artifact(artifact: &CycleArtifact, index: &GridIndex) -> Vec<SubgridArtifact> {
    if !index.has_subgrids() {
        return Vec::new();
    }

    let mut parts = Vec::with_capacity(index.subgrids.len());
    for (subgrid_pos, entry) in index.subgrids.iter().enumerate() {
        let cell_indices: Vec<usize> = index
            .subgrid_map
            .iter()
            .enumerate()
            .filter(|(_, assigned)| **assigned == Some(subgrid_pos as u16))
            .map(|(cell, _)| cell)
            .collect();

        if cell_indices.is_empty() {
            logging::debug(
                Stage::Chop,
                Some(&artifact.model_id),
                &format!("Subgrid '{}' holds no cells, skipping", entry.name),
            );
            continue;
        }

        let projections = artifact
            .projections
            .iter()
            .map(|projection| match projection {
                Projection::Data { hour, cells } => Projection::Data {
                    hour: *hour,
                    cells: cell_indices.iter().map(|&cell| cells[cell]).collect(),
                },
                Projection::Gap { hour, reason } => {
                    Projection::Gap { hour: *hour, reason: reason.clone() }
                }
            })
            .collect();

        parts.push(SubgridArtifact {
            name: entry.name.clone(),
            cell_indices,
            artifact: CycleArtifact { projections, ..artifact.clone() },
        });
    }
    parts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
