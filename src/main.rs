//! ofs-s111 CLI - Surface-current forecast conversion.
//!
//! Download OFS NetCDF model output from the NOMADS archive and convert it
//! to S-111 artifacts, optionally building the regular-grid index needed
//! for georectified output.

use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use ofs_s111::convert::chop::chop_artifact;
use ofs_s111::convert::encode::{ConvertRequest, encode_cycle, write_artifact};
use ofs_s111::convert::index::{GridIndex, IndexRequest};
use ofs_s111::convert::native::NativeGrid;
use ofs_s111::convert::shapes::{Shoreline, SubgridSet};
use ofs_s111::cycle::{self, cycle_compact};
use ofs_s111::fetch::nomads;
use ofs_s111::logging::{self, LogLevel, Stage};
use ofs_s111::model::{CodingFormat, HourFetch};
use ofs_s111::ops::{OpsConfig, run_ops};
use ofs_s111::registry::{OfsModel, all_model_ids, find_model};
use ofs_s111::verify;

/// Convert OFS surface-current model output to S-111 format.
#[derive(Parser)]
#[command(name = "ofs-s111")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Append log output to this file in addition to the console.
    #[arg(long, global = true)]
    log_file: Option<String>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a regular-grid index file for a model.
    ///
    /// The index contains the regular grid definition and interpolation
    /// mapping and must exist before format-2 conversion. Once created it
    /// can be used indefinitely unless the grid extent/resolution or the
    /// underlying model grid changes.
    BuildIndex {
        /// Identifier of the target Operational Forecast System (e.g. cbofs).
        #[arg(short = 'o', long)]
        model: String,

        /// Path of the index file to create; an existing file is overwritten.
        #[arg(short = 'i', long)]
        index: PathBuf,

        /// NetCDF file of native model output supplying the grid geometry.
        #[arg(short = 'm', long)]
        sample: PathBuf,

        /// Target cell size of regular grid cells, in meters.
        #[arg(short = 't', long)]
        cellsize: f64,

        /// Shoreline polygon shapefile applying a detailed land mask. When
        /// omitted the model's own mask decides, which may be less detailed.
        #[arg(short = 'l', long)]
        shoreline: Option<PathBuf>,

        /// Subgrid polygon shapefile used to partition output into tiles.
        /// When omitted the model extent is used and no subsetting occurs.
        #[arg(short = 'g', long)]
        subgrids: Option<PathBuf>,

        /// Attribute of the subgrid shapefile naming each tile; record
        /// numbers are used when omitted.
        #[arg(short = 'f', long)]
        subgrid_field: Option<String>,
    },

    /// Download a forecast cycle and convert it to S-111 artifacts.
    Run {
        /// Identifier of the target Operational Forecast System (e.g. cbofs).
        #[arg(short = 'o', long)]
        model: String,

        /// Data coding format: 2 = regular grid, 3 = ungeorectified array.
        #[arg(long, default_value_t = 2)]
        format: u8,

        /// Grid index file (required for format 2).
        #[arg(short = 'i', long)]
        index: Option<PathBuf>,

        /// Directory where artifacts are generated, in a per-model
        /// subdirectory.
        #[arg(short = 's', long)]
        out: PathBuf,

        /// Directory for downloaded model output, in a per-model
        /// subdirectory; existing NetCDF files there are cleared first.
        #[arg(short = 'd', long)]
        download_dir: Option<PathBuf>,

        /// Previously downloaded NetCDF files to convert instead of
        /// downloading.
        #[arg(short = 'm', long, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Cycle time to process (YYYYMMDDHH); the most recent available
        /// cycle is calculated when omitted.
        #[arg(short = 'c', long)]
        cycle: Option<String>,

        /// Target depth below the sea surface in meters; must be >= 0.
        #[arg(short = 'z', long, default_value_t = 4.5)]
        depth: f64,
    },

    /// Probe the archive for a cycle's per-hour availability.
    Check {
        /// Identifier of the target Operational Forecast System (e.g. cbofs).
        #[arg(short = 'o', long)]
        model: String,

        /// Cycle time to probe (YYYYMMDDHH); defaults to the latest
        /// available cycle.
        #[arg(short = 'c', long)]
        cycle: Option<String>,

        /// Emit the availability report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Run the operational download-convert-disseminate sequence.
    Ops {
        /// Identifier of the target Operational Forecast System (e.g. cbofs).
        #[arg(short = 'o', long)]
        model: String,

        /// Operational configuration file.
        #[arg(long, default_value = "ops.toml")]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let min_level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    let timestamps = matches!(cli.command, Commands::Ops { .. });
    logging::init_logger(min_level, cli.log_file.as_deref(), timestamps);

    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::error(Stage::System, None, &e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::BuildIndex { model, index, sample, cellsize, shoreline, subgrids, subgrid_field } => {
            cmd_build_index(&model, &index, &sample, cellsize, shoreline, subgrids, subgrid_field)
        }
        Commands::Run { model, format, index, out, download_dir, files, cycle, depth } => {
            cmd_run(&model, format, index, &out, download_dir, &files, cycle, depth)
        }
        Commands::Check { model, cycle, json } => cmd_check(&model, cycle, json),
        Commands::Ops { model, config } => cmd_ops(&model, &config),
    }
}

/// Resolves a model identifier against the registry.
fn resolve_model(id: &str) -> Result<&'static OfsModel, Box<dyn Error>> {
    find_model(id).ok_or_else(|| {
        format!(
            "a valid model must be specified. Possible values: {}",
            all_model_ids().join(", ")
        )
        .into()
    })
}

/// Resolves the cycle to process: an explicit timestamp, or the latest
/// cycle whose availability delay has elapsed.
fn resolve_cycle(
    model: &OfsModel,
    explicit: Option<String>,
) -> Result<chrono::DateTime<chrono::Utc>, Box<dyn Error>> {
    match explicit {
        Some(text) => {
            let cycle_time = cycle::parse_cycle(&text)?;
            if !cycle::is_scheduled_cycle(model, &cycle_time) {
                logging::warn(
                    Stage::System,
                    Some(model.id),
                    &format!(
                        "cycle hour {:02}z is not on the {} schedule; proceeding anyway",
                        cycle_time.format("%H"),
                        model.id
                    ),
                );
            }
            Ok(cycle_time)
        }
        None => cycle::latest_cycle(model).ok_or_else(|| {
            "Latest model cycle time cannot be determined. Verify that system time is \
             correct and review model cycle configuration."
                .into()
        }),
    }
}

// ---------------------------------------------------------------------------
// build-index
// ---------------------------------------------------------------------------

fn cmd_build_index(
    model_id: &str,
    index_path: &PathBuf,
    sample: &PathBuf,
    cellsize: f64,
    shoreline: Option<PathBuf>,
    subgrids: Option<PathBuf>,
    subgrid_field: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let model = resolve_model(model_id)?;

    if !sample.is_file() {
        return Err(format!("specified sample file does not exist [{}]", sample.display()).into());
    }
    if let Some(path) = &shoreline {
        if !path.is_file() {
            return Err(
                format!("specified shoreline shapefile does not exist [{}]", path.display()).into()
            );
        }
    }
    if let Some(path) = &subgrids {
        if !path.is_file() {
            return Err(
                format!("specified subgrid shapefile does not exist [{}]", path.display()).into()
            );
        }
    }

    let request = IndexRequest {
        model_id: model.id.to_string(),
        cellsize_m: cellsize,
        shoreline: shoreline.map(Shoreline::load).transpose()?,
        subgrids: subgrids
            .map(|path| SubgridSet::load(path, subgrid_field.as_deref()))
            .transpose()?,
    };

    logging::info(
        Stage::Index,
        Some(model.id),
        &format!("Building index from {} at {} m", sample.display(), cellsize),
    );
    let native = NativeGrid::from_netcdf(sample, model.model_type)?;
    let index = GridIndex::build(&native, &request)?;
    index.save(index_path)?;
    logging::info(
        Stage::Index,
        Some(model.id),
        &format!(
            "Wrote {} ({} of {} cells mapped, {} subgrid(s))",
            index_path.display(),
            index.mapped_cells(),
            index.grid.len(),
            index.subgrids.len()
        ),
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn cmd_run(
    model_id: &str,
    format: u8,
    index_path: Option<PathBuf>,
    out: &PathBuf,
    download_dir: Option<PathBuf>,
    files: &[PathBuf],
    cycle_arg: Option<String>,
    depth: f64,
) -> Result<(), Box<dyn Error>> {
    let model = resolve_model(model_id)?;

    let coding_format = CodingFormat::from_value(format)
        .ok_or_else(|| format!("invalid coding format [{}]: must be 2 or 3", format))?;
    if depth < 0.0 || !depth.is_finite() {
        return Err("target depth must be greater than or equal to 0".into());
    }

    // Configuration must be complete before any download is attempted: a
    // format-2 run without a usable index has no output grid to encode to.
    let index = match (coding_format.requires_index(), index_path) {
        (true, None) => {
            return Err("a grid index (-i/--index) is required for coding format 2".into());
        }
        (true, Some(path)) => {
            if !path.is_file() {
                return Err(
                    format!("specified index file does not exist [{}]", path.display()).into()
                );
            }
            let index = GridIndex::load(&path)?;
            index.ensure_model(model.id)?;
            Some(index)
        }
        (false, _) => None,
    };

    let cycle_time = resolve_cycle(model, cycle_arg)?;
    logging::info(
        Stage::System,
        Some(model.id),
        &format!("Processing forecast cycle with reference time {}", cycle_compact(&cycle_time)),
    );

    // Acquire forecast files: a local file list, or a fresh cycle download.
    let hours: Vec<HourFetch> = if !files.is_empty() {
        nomads::hours_from_local(files)?
    } else {
        let download_dir = download_dir
            .ok_or("either --download-dir or --files must be specified to supply model output")?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        let download = nomads::download_cycle(&client, model, &cycle_time, &download_dir)?;
        if download.is_total_failure() {
            return Err(format!(
                "no forecast hours could be retrieved for cycle {}",
                cycle_compact(&cycle_time)
            )
            .into());
        }
        download.hours
    };

    let out_dir = out.join(model.id);
    fs::create_dir_all(&out_dir)?;

    let request = ConvertRequest {
        model,
        cycle: cycle_time,
        coding_format,
        target_depth_m: depth,
        hours: &hours,
    };
    let artifact = encode_cycle(&request, index.as_ref())?;

    // Subgrid-bearing indexes produce per-subgrid files; everything else
    // produces one whole-domain artifact.
    let mut written = Vec::new();
    match index.as_ref().filter(|i| i.has_subgrids()) {
        Some(index) => {
            for part in chop_artifact(&artifact, index) {
                written.push(write_artifact(&part.artifact, &out_dir, Some(&part.name))?);
            }
            if written.is_empty() {
                return Err("no subgrid holds any output cells; nothing to write".into());
            }
        }
        None => {
            written.push(write_artifact(&artifact, &out_dir, None)?);
        }
    }

    logging::info(
        Stage::System,
        Some(model.id),
        &format!("Produced {} artifact(s) in {}", written.len(), out_dir.display()),
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn cmd_check(model_id: &str, cycle_arg: Option<String>, json: bool) -> Result<(), Box<dyn Error>> {
    let model = resolve_model(model_id)?;
    let cycle_time = resolve_cycle(model, cycle_arg)?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let report = verify::probe_cycle(&client, model, &cycle_time);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        verify::print_summary(&report);
    }

    if report.summary.available == 0 {
        return Err(format!(
            "no forecast hours are available for cycle {}",
            cycle_compact(&cycle_time)
        )
        .into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ops
// ---------------------------------------------------------------------------

fn cmd_ops(model_id: &str, config_path: &PathBuf) -> Result<(), Box<dyn Error>> {
    let model = resolve_model(model_id)?;
    let config = OpsConfig::load(config_path)?;
    run_ops(model, &config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
