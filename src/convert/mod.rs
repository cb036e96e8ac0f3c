//! Conversion engine: regular-grid derivation, grid index generation,
//! native model access, S-111 encoding, and subgrid chopping.
//!
//! The orchestration layer hands each stage a typed request struct and the
//! stages hand back typed results; file paths never carry implicit meaning
//! between stages. Reading native NetCDF output and writing artifact files
//! require the system NetCDF library and are gated behind the `netcdf`
//! cargo feature; everything else (grid fitting, index construction from
//! in-memory geometry, series assembly, chopping) is pure Rust.

pub mod chop;
pub mod encode;
pub mod grid;
pub mod index;
pub mod native;
pub mod shapes;

pub use chop::{SubgridArtifact, chop_artifact};
pub use encode::{CellCurrent, ConvertRequest, CycleArtifact, EncodeError, Projection};
pub use grid::{Envelope, GridError, RegularGrid};
pub use index::{GridIndex, IndexError, IndexRequest};
pub use native::{CurrentField, NativeError, NativeGrid};
pub use shapes::{ShapeError, Shoreline, SubgridSet};
