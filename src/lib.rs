//! # ofs_s111
//!
//! Download NOS Operational Forecast System (OFS) surface-current forecasts
//! from the NCEP NOMADS archive and convert them to S-111 artifacts.
//!
//! This crate provides the building blocks of the conversion pipeline:
//! - Model registry (supported OFS models, hour ranges, cycle schedules)
//! - Forecast cycle resolution against availability delays
//! - Per-hour forecast acquisition with explicit gap results
//! - Grid index generation (regular grid fitting, shoreline masking,
//!   subgrid assignment) and persistence
//! - Cycle encoding (gap-preserving hour series) and subgrid chopping
//! - Archive availability probing and operational-mode sequencing

pub mod convert;
pub mod cycle;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod ops;
pub mod registry;
pub mod verify;

// Re-export main types for convenience
pub use model::{CodingFormat, CycleDownload, FetchError, HourFetch, ModelType};
pub use registry::{MODEL_REGISTRY, OfsModel, all_model_ids, find_model};
