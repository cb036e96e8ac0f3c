/// NCEP NOMADS HTTP Archive Client
///
/// Retrieves per-hour NOS Operational Forecast System NetCDF output from
/// the NOMADS production archive for conversion to S-111.
///
/// Archive layout:
///   https://nomads.ncep.noaa.gov/pub/data/nccf/com/nos/prod/
///       {model}.{YYYYMMDD}/nos.{model}.fields.f{HHH}.{YYYYMMDD}.t{HH}z.nc

use chrono::{DateTime, Timelike, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::{self, Stage};
use crate::model::{CycleDownload, FetchError, HourFetch};
use crate::registry::OfsModel;

/// Base URL of the NOMADS HTTP server for CO-OPS OFS NetCDF files.
const NOMADS_BASE_URL: &str = "https://nomads.ncep.noaa.gov";

/// Environment variable overriding the archive base URL (mirror servers,
/// local fixtures). Loaded from the environment/.env at startup.
const BASE_URL_ENV: &str = "OFS_NOMADS_URL";

/// The effective archive base URL.
pub fn base_url() -> String {
    std::env::var(BASE_URL_ENV).unwrap_or_else(|_| NOMADS_BASE_URL.to_string())
}

// ---------------------------------------------------------------------------
// Naming conventions
// ---------------------------------------------------------------------------

/// Local filename for one lead-hour file. Matches the remote basename so a
/// download directory doubles as a cache keyed by model, cycle, and hour.
pub fn local_filename(model: &OfsModel, cycle: &DateTime<Utc>, hour: u16) -> String {
    format!(
        "nos.{}.fields.f{:03}.{}.t{:02}z.nc",
        model.id,
        hour,
        cycle.format("%Y%m%d"),
        cycle.hour()
    )
}

/// Remote URL of one lead-hour file on the archive.
pub fn forecast_url(base: &str, model: &OfsModel, cycle: &DateTime<Utc>, hour: u16) -> String {
    format!(
        "{}/pub/data/nccf/com/nos/prod/{}.{}/{}",
        base,
        model.id,
        cycle.format("%Y%m%d"),
        local_filename(model, cycle, hour)
    )
}

/// Recovers the forecast lead hour from a file name following the archive
/// naming convention (the `fHHH` designator). Returns `None` for names that
/// do not carry one.
pub fn hour_from_filename(name: &str) -> Option<u16> {
    let start = name.find(".fields.f")? + ".fields.f".len();
    let digits = name.get(start..start + 3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// Cycle planning
// ---------------------------------------------------------------------------

/// A single planned lead-hour request.
#[derive(Debug, Clone, PartialEq)]
pub struct HourRequest {
    pub hour: u16,
    pub url: String,
    pub local_path: PathBuf,
}

/// Plans the full ordered request list for one model cycle: every configured
/// lead hour (0 through the model maximum, ascending), its remote URL, and
/// its local destination inside `model_dir`.
pub fn plan_cycle(model: &OfsModel, cycle: &DateTime<Utc>, model_dir: &Path) -> Vec<HourRequest> {
    let base = base_url();
    model
        .forecast_hours()
        .into_iter()
        .map(|hour| HourRequest {
            hour,
            url: forecast_url(&base, model, cycle, hour),
            local_path: model_dir.join(local_filename(model, cycle, hour)),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Prepares `<download_dir>/<model>`: creates it if absent, otherwise clears
/// stale NetCDF files from previous cycles so files never accumulate.
pub fn prepare_model_dir(download_dir: &Path, model: &OfsModel) -> Result<PathBuf, FetchError> {
    let dir = download_dir.join(model.id);
    if dir.is_dir() {
        let entries = fs::read_dir(&dir).map_err(|e| FetchError::Disk(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| FetchError::Disk(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("nc") {
                logging::debug(
                    Stage::Fetch,
                    Some(model.id),
                    &format!("Removing {}", path.display()),
                );
                fs::remove_file(&path).map_err(|e| FetchError::Disk(e.to_string()))?;
            }
        }
    } else {
        fs::create_dir_all(&dir).map_err(|e| FetchError::Disk(e.to_string()))?;
    }
    Ok(dir)
}

/// Downloads one planned hour to its local destination.
fn fetch_hour(client: &reqwest::blocking::Client, request: &HourRequest) -> Result<(), FetchError> {
    let mut response = client
        .get(&request.url)
        .send()
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let mut out_file =
        fs::File::create(&request.local_path).map_err(|e| FetchError::Disk(e.to_string()))?;
    let bytes = response
        .copy_to(&mut out_file)
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    if bytes == 0 {
        return Err(FetchError::Transport("empty response body".to_string()));
    }
    Ok(())
}

/// Downloads every configured lead hour of one cycle.
///
/// A failed hour is recorded as a gap and never aborts the remaining hours;
/// only a failure to prepare the download directory is fatal. The returned
/// results are in ascending hour order and a summary (including any missing
/// hours) is logged for the operator.
pub fn download_cycle(
    client: &reqwest::blocking::Client,
    model: &OfsModel,
    cycle: &DateTime<Utc>,
    download_dir: &Path,
) -> Result<CycleDownload, FetchError> {
    let model_dir = prepare_model_dir(download_dir, model)?;
    let requests = plan_cycle(model, cycle, &model_dir);

    let mut hours = Vec::with_capacity(requests.len());
    for request in &requests {
        logging::debug(
            Stage::Fetch,
            Some(model.id),
            &format!("Downloading {} to {}", request.url, request.local_path.display()),
        );
        match fetch_hour(client, request) {
            Ok(()) => hours.push(HourFetch::Retrieved {
                hour: request.hour,
                path: request.local_path.clone(),
            }),
            Err(err) => {
                logging::log_fetch_failure(model.id, request.hour, &err);
                // Remove any partial file so the cache never holds a
                // truncated download.
                let _ = fs::remove_file(&request.local_path);
                hours.push(HourFetch::Gap { hour: request.hour, reason: err });
            }
        }
    }

    let download = CycleDownload { hours };
    logging::log_download_summary(
        model.id,
        requests.len(),
        download.retrieved_count(),
        &download.gap_hours(),
    );
    Ok(download)
}

/// Builds per-hour results from already-downloaded local files, recovering
/// each file's lead hour from its name. Used when the operator supplies
/// `--files` instead of a download directory.
pub fn hours_from_local(files: &[PathBuf]) -> Result<Vec<HourFetch>, FetchError> {
    let mut hours = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FetchError::Disk(format!("invalid file name: {}", path.display())))?;
        let hour = hour_from_filename(name).ok_or_else(|| {
            FetchError::Disk(format!(
                "cannot determine forecast hour from file name [{}]",
                name
            ))
        })?;
        if !path.is_file() {
            return Err(FetchError::Disk(format!("file does not exist: {}", path.display())));
        }
        hours.push(HourFetch::Retrieved { hour, path: path.clone() });
    }
    hours.sort_by_key(|h| h.hour());
    Ok(hours)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MODEL_REGISTRY, find_model};
    use chrono::TimeZone;

    fn cycle_2019070100() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 7, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_forecast_url_matches_archive_convention() {
        let cbofs = find_model("cbofs").unwrap();
        let url = forecast_url(NOMADS_BASE_URL, cbofs, &cycle_2019070100(), 12);
        assert_eq!(
            url,
            "https://nomads.ncep.noaa.gov/pub/data/nccf/com/nos/prod/\
             cbofs.20190701/nos.cbofs.fields.f012.20190701.t00z.nc"
        );
    }

    #[test]
    fn test_local_filename_pads_hour_and_cycle() {
        let cbofs = find_model("cbofs").unwrap();
        let cycle = Utc.with_ymd_and_hms(2019, 7, 1, 6, 0, 0).unwrap();
        assert_eq!(
            local_filename(cbofs, &cycle, 0),
            "nos.cbofs.fields.f000.20190701.t06z.nc"
        );
        assert_eq!(
            local_filename(cbofs, &cycle, 48),
            "nos.cbofs.fields.f048.20190701.t06z.nc"
        );
    }

    #[test]
    fn test_hour_from_filename_round_trips() {
        let cbofs = find_model("cbofs").unwrap();
        let name = local_filename(cbofs, &cycle_2019070100(), 7);
        assert_eq!(hour_from_filename(&name), Some(7));
        assert_eq!(hour_from_filename("not-a-forecast-file.nc"), None);
    }

    #[test]
    fn test_plan_requests_exactly_the_configured_hours_ascending() {
        // The acquisition stage must request hours 0 through the model's
        // maximum, in ascending order, for every supported model.
        for model in MODEL_REGISTRY {
            let requests = plan_cycle(model, &cycle_2019070100(), Path::new("/tmp/ofs"));
            let hours: Vec<u16> = requests.iter().map(|r| r.hour).collect();
            assert_eq!(
                hours,
                model.forecast_hours(),
                "planned hours for '{}' must match the registry",
                model.id
            );
            assert!(
                hours.windows(2).all(|w| w[0] < w[1]),
                "planned hours for '{}' must be ascending",
                model.id
            );
        }
    }

    #[test]
    fn test_plan_cbofs_requests_49_hours() {
        let cbofs = find_model("cbofs").unwrap();
        let requests = plan_cycle(cbofs, &cycle_2019070100(), Path::new("/tmp/ofs"));
        assert_eq!(requests.len(), 49);
        assert_eq!(requests[0].hour, 0);
        assert_eq!(requests[48].hour, 48);
    }

    #[test]
    fn test_prepare_model_dir_creates_and_clears() {
        let cbofs = find_model("cbofs").unwrap();
        let tmp = tempfile::tempdir().expect("tempdir");

        let dir = prepare_model_dir(tmp.path(), cbofs).expect("prepare should succeed");
        assert!(dir.is_dir());
        assert!(dir.ends_with("cbofs"));

        // A stale NetCDF file from a previous cycle is removed; other files
        // are left alone.
        let stale = dir.join("nos.cbofs.fields.f001.20190630.t18z.nc");
        let unrelated = dir.join("notes.txt");
        fs::write(&stale, b"stale").unwrap();
        fs::write(&unrelated, b"keep").unwrap();

        prepare_model_dir(tmp.path(), cbofs).expect("re-prepare should succeed");
        assert!(!stale.exists(), "stale .nc files should be cleared");
        assert!(unrelated.exists(), "non-NetCDF files should be kept");
    }

    #[test]
    fn test_hours_from_local_sorts_and_parses() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let f12 = tmp.path().join("nos.cbofs.fields.f012.20190701.t00z.nc");
        let f000 = tmp.path().join("nos.cbofs.fields.f000.20190701.t00z.nc");
        fs::write(&f12, b"x").unwrap();
        fs::write(&f000, b"x").unwrap();

        let hours = hours_from_local(&[f12.clone(), f000.clone()]).expect("should parse");
        assert_eq!(hours.len(), 2);
        assert_eq!(hours[0].hour(), 0, "results must sort ascending by hour");
        assert_eq!(hours[1].hour(), 12);
    }

    #[test]
    fn test_hours_from_local_rejects_unrecognized_names() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let odd = tmp.path().join("model_output.nc");
        fs::write(&odd, b"x").unwrap();
        assert!(hours_from_local(&[odd]).is_err());
    }
}
