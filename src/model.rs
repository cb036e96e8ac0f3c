/// Core data types for the OFS S-111 conversion service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no logic, no I/O, and no external dependencies — only types.

use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Model frameworks
// ---------------------------------------------------------------------------

/// Underlying hydrodynamic modelling framework of an Operational Forecast
/// System. Selects the native-grid conventions (variable names, topology)
/// used when reading model output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Regional Ocean Modeling System (curvilinear structured grid).
    Roms,
    /// Finite Volume Community Ocean Model (unstructured triangular mesh).
    Fvcom,
    /// Princeton Ocean Model (structured grid).
    Pom,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::Roms => write!(f, "roms"),
            ModelType::Fvcom => write!(f, "fvcom"),
            ModelType::Pom => write!(f, "pom"),
        }
    }
}

// ---------------------------------------------------------------------------
// Coding formats
// ---------------------------------------------------------------------------

/// S-111 data coding format selector.
///
/// Format 2 projects current vectors onto a regular georectified grid and
/// requires a pre-built grid index. Format 3 carries the native model cells
/// as an ungeorectified gridded array and needs no index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingFormat {
    RegularGrid,
    Ungeorectified,
}

impl CodingFormat {
    /// Numeric selector as used on the command line and in artifact metadata.
    pub fn value(self) -> u8 {
        match self {
            CodingFormat::RegularGrid => 2,
            CodingFormat::Ungeorectified => 3,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            2 => Some(CodingFormat::RegularGrid),
            3 => Some(CodingFormat::Ungeorectified),
            _ => None,
        }
    }

    /// Whether this format can only be encoded through a grid index.
    pub fn requires_index(self) -> bool {
        matches!(self, CodingFormat::RegularGrid)
    }
}

impl fmt::Display for CodingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

// ---------------------------------------------------------------------------
// Per-hour acquisition results
// ---------------------------------------------------------------------------

/// Outcome of acquiring a single forecast lead hour.
///
/// A failed hour is carried forward as an explicit `Gap` rather than being
/// dropped, so the encoding stage can keep the fixed hour-to-index
/// correspondence in the output series.
#[derive(Debug, Clone, PartialEq)]
pub enum HourFetch {
    /// The file was downloaded (or located locally) and is readable.
    Retrieved { hour: u16, path: PathBuf },
    /// The hour could not be retrieved; the cycle continues without it.
    Gap { hour: u16, reason: FetchError },
}

impl HourFetch {
    pub fn hour(&self) -> u16 {
        match self {
            HourFetch::Retrieved { hour, .. } | HourFetch::Gap { hour, .. } => *hour,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, HourFetch::Gap { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            HourFetch::Retrieved { path, .. } => Some(path),
            HourFetch::Gap { .. } => None,
        }
    }
}

/// All per-hour results for one forecast cycle, ascending by lead hour.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CycleDownload {
    pub hours: Vec<HourFetch>,
}

impl CycleDownload {
    pub fn retrieved_count(&self) -> usize {
        self.hours.iter().filter(|h| !h.is_gap()).count()
    }

    /// Lead hours that failed to download, ascending.
    pub fn gap_hours(&self) -> Vec<u16> {
        self.hours.iter().filter(|h| h.is_gap()).map(|h| h.hour()).collect()
    }

    /// True when not a single hour was retrieved. Total acquisition failure
    /// is fatal to the run; partial failure is not.
    pub fn is_total_failure(&self) -> bool {
        self.retrieved_count() == 0
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching forecast files from the archive.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Non-2xx HTTP response from the archive.
    HttpStatus(u16),
    /// The request could not be completed (DNS, connect, read failure).
    Transport(String),
    /// The response could not be written to the local download directory.
    Disk(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::HttpStatus(code) => write!(f, "HTTP error: {}", code),
            FetchError::Transport(msg) => write!(f, "Transport error: {}", msg),
            FetchError::Disk(msg) => write!(f, "Disk error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coding_format_round_trip() {
        assert_eq!(CodingFormat::from_value(2), Some(CodingFormat::RegularGrid));
        assert_eq!(CodingFormat::from_value(3), Some(CodingFormat::Ungeorectified));
        assert_eq!(CodingFormat::from_value(1), None);
        assert!(CodingFormat::RegularGrid.requires_index());
        assert!(!CodingFormat::Ungeorectified.requires_index());
    }

    #[test]
    fn test_cycle_download_gap_accounting() {
        let download = CycleDownload {
            hours: vec![
                HourFetch::Retrieved { hour: 0, path: PathBuf::from("f000.nc") },
                HourFetch::Gap { hour: 1, reason: FetchError::HttpStatus(404) },
                HourFetch::Retrieved { hour: 2, path: PathBuf::from("f002.nc") },
            ],
        };
        assert_eq!(download.retrieved_count(), 2);
        assert_eq!(download.gap_hours(), vec![1]);
        assert!(!download.is_total_failure());
    }

    #[test]
    fn test_all_gaps_is_total_failure() {
        let download = CycleDownload {
            hours: vec![
                HourFetch::Gap { hour: 0, reason: FetchError::HttpStatus(404) },
                HourFetch::Gap { hour: 1, reason: FetchError::Transport("timeout".into()) },
            ],
        };
        assert!(download.is_total_failure());
        assert_eq!(download.gap_hours(), vec![0, 1]);
    }
}
