//! Operational conversion mode.
//!
//! Drives the full pipeline on a schedule-friendly configuration: resolve
//! the latest cycle, download it, convert against the model's pre-built
//! default (whole-domain) and subset (subgrid) indexes, move the resulting
//! artifacts to the cycle-dated dissemination directory, and clear the
//! staging area. Index generation is not part of operational runs; indexes
//! are built once out of band and referenced from the configuration file.

use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::convert::chop::chop_artifact;
use crate::convert::encode::{ConvertRequest, encode_cycle, write_artifact};
use crate::convert::index::GridIndex;
use crate::cycle::{cycle_compact, latest_cycle};
use crate::fetch::nomads;
use crate::logging::{self, Stage};
use crate::model::CodingFormat;
use crate::registry::OfsModel;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Operational configuration, loaded from a TOML file.
///
/// ```toml
/// download_dir = "/opt/s111/netcdf"
/// staging_dir = "/opt/s111/hdf5"
/// dissemination_dir = "/win/ofsdata/%Y%m%d/HDF5/S111_1.0.0"
/// target_depth_m = 4.5
///
/// [models.cbofs]
/// index_default = "/opt/s111/indexes/cbofs_index_default_500m.json"
/// index_subset = "/opt/s111/indexes/cbofs_index_band4_500m.json"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct OpsConfig {
    /// Where NetCDF forecast files are downloaded (per-model subdirectories).
    pub download_dir: PathBuf,
    /// Where artifacts are staged before dissemination.
    pub staging_dir: PathBuf,
    /// strftime pattern of the dated dissemination directory.
    pub dissemination_dir: String,
    #[serde(default = "default_target_depth")]
    pub target_depth_m: f64,
    pub models: HashMap<String, OpsModelConfig>,
}

fn default_target_depth() -> f64 {
    4.5
}

/// Per-model index pair referenced by operational runs.
#[derive(Debug, Clone, Deserialize)]
pub struct OpsModelConfig {
    pub index_default: PathBuf,
    pub index_subset: PathBuf,
}

impl OpsConfig {
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cannot read ops configuration [{}]: {}", path.display(), e))?;
        let config: OpsConfig = toml::from_str(&text)?;
        Ok(config)
    }

    pub fn model(&self, model_id: &str) -> Result<&OpsModelConfig, Box<dyn Error>> {
        self.models.get(model_id).ok_or_else(|| {
            format!(
                "model '{}' is not configured for operational runs. Configured models: {}",
                model_id,
                self.models.keys().cloned().collect::<Vec<_>>().join(", ")
            )
            .into()
        })
    }
}

// ---------------------------------------------------------------------------
// Operational run
// ---------------------------------------------------------------------------

/// Expands the dated dissemination directory for one cycle and model.
pub fn dissemination_dir(
    config: &OpsConfig,
    model: &OfsModel,
    cycle_time: &DateTime<Utc>,
) -> PathBuf {
    let dated = cycle_time.format(&config.dissemination_dir).to_string();
    Path::new(&dated).join(model.id.to_uppercase())
}

/// Runs the full operational sequence for one model.
///
/// Default-grid and subset-grid conversion run sequentially against the
/// same downloaded cycle; the stages hand off through the staging
/// directory, and completed artifacts move to the dated dissemination
/// directory before staging is cleared.
pub fn run_ops(model: &OfsModel, config: &OpsConfig) -> Result<(), Box<dyn Error>> {
    let model_config = config.model(model.id)?;

    // Both indexes must load before anything is downloaded.
    let index_default = GridIndex::load(&model_config.index_default)?;
    index_default.ensure_model(model.id)?;
    let index_subset = GridIndex::load(&model_config.index_subset)?;
    index_subset.ensure_model(model.id)?;

    let cycle_time = latest_cycle(model).ok_or(
        "Latest model cycle time cannot be determined. Verify that system time is \
         correct and review model cycle configuration.",
    )?;
    logging::info(
        Stage::Ops,
        Some(model.id),
        &format!("Processing cycle {}", cycle_compact(&cycle_time)),
    );

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;
    let download = nomads::download_cycle(&client, model, &cycle_time, &config.download_dir)?;
    if download.is_total_failure() {
        return Err(format!(
            "no forecast hours could be retrieved for cycle {}",
            cycle_compact(&cycle_time)
        )
        .into());
    }

    let staging = config.staging_dir.join(model.id);
    fs::create_dir_all(&staging)?;

    let request = ConvertRequest {
        model,
        cycle: cycle_time,
        coding_format: CodingFormat::RegularGrid,
        target_depth_m: config.target_depth_m,
        hours: &download.hours,
    };

    let mut staged_files = Vec::new();

    // Whole-domain artifact from the default index.
    let artifact = encode_cycle(&request, Some(&index_default))?;
    staged_files.push(write_artifact(&artifact, &staging, None)?);

    // Per-subgrid artifacts from the subset index.
    let subset_artifact = encode_cycle(&request, Some(&index_subset))?;
    for part in chop_artifact(&subset_artifact, &index_subset) {
        staged_files.push(write_artifact(&part.artifact, &staging, Some(&part.name))?);
    }

    // Move completed artifacts to the dated dissemination directory.
    let dest_dir = dissemination_dir(config, model, &cycle_time);
    fs::create_dir_all(&dest_dir)?;
    for staged in &staged_files {
        let file_name = staged
            .file_name()
            .ok_or_else(|| format!("staged artifact has no file name: {}", staged.display()))?;
        fs::copy(staged, dest_dir.join(file_name))?;
    }
    logging::info(
        Stage::Ops,
        Some(model.id),
        &format!("Disseminated {} artifact(s) to {}", staged_files.len(), dest_dir.display()),
    );

    // Clear the staging directory so files never accumulate between cycles.
    for entry in fs::read_dir(&staging)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("h5") {
            fs::remove_file(&path)?;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::find_model;
    use chrono::TimeZone;

    const SAMPLE: &str = r#"
        download_dir = "/opt/s111/netcdf"
        staging_dir = "/opt/s111/hdf5"
        dissemination_dir = "/win/ofsdata/%Y%m%d/HDF5/S111_1.0.0"

        [models.cbofs]
        index_default = "/opt/s111/indexes/cbofs_index_default_500m.json"
        index_subset = "/opt/s111/indexes/cbofs_index_band4_500m.json"

        [models.dbofs]
        index_default = "/opt/s111/indexes/dbofs_index_default_500m.json"
        index_subset = "/opt/s111/indexes/dbofs_index_band4_500m.json"
    "#;

    #[test]
    fn test_config_parses_models_and_defaults() {
        let config: OpsConfig = toml::from_str(SAMPLE).expect("sample config should parse");
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.target_depth_m, 4.5, "depth should default when omitted");
        assert!(config.model("cbofs").is_ok());
        assert!(config.model("leofs").is_err());
    }

    #[test]
    fn test_dissemination_dir_expands_cycle_date() {
        let config: OpsConfig = toml::from_str(SAMPLE).unwrap();
        let model = find_model("cbofs").unwrap();
        let cycle = Utc.with_ymd_and_hms(2019, 7, 1, 6, 0, 0).unwrap();
        let dir = dissemination_dir(&config, model, &cycle);
        assert_eq!(
            dir,
            PathBuf::from("/win/ofsdata/20190701/HDF5/S111_1.0.0/CBOFS")
        );
    }

    #[test]
    fn test_load_missing_config_reports_path() {
        let err = OpsConfig::load(Path::new("/nonexistent/ops.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ops.toml"));
    }
}
