//! Archive Availability Verification Module
//!
//! Framework for probing the NOMADS archive to determine which lead hours
//! of a forecast cycle are present before committing to a full download.
//!
//! Use this to diagnose partial cycles and availability-delay drift without
//! pulling multi-gigabyte NetCDF files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

use crate::cycle::{self, cycle_compact};
use crate::fetch::nomads;
use crate::registry::OfsModel;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ProbeStatus {
    Available,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourProbe {
    pub hour: u16,
    pub url: String,
    pub status: ProbeStatus,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub total: usize,
    pub available: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleAvailabilityReport {
    pub timestamp: String,
    pub model_id: String,
    pub cycle: String,
    pub hours: Vec<HourProbe>,
    pub summary: ProbeSummary,
}

impl CycleAvailabilityReport {
    /// Lead hours not present on the archive, ascending.
    pub fn missing_hours(&self) -> Vec<u16> {
        self.hours
            .iter()
            .filter(|h| h.status == ProbeStatus::Missing)
            .map(|h| h.hour)
            .collect()
    }
}

// ============================================================================
// Per-hour probe
// ============================================================================

fn probe_hour(client: &reqwest::blocking::Client, hour: u16, url: &str) -> HourProbe {
    let mut result = HourProbe {
        hour,
        url: url.to_string(),
        status: ProbeStatus::Missing,
        http_status: None,
        error_message: None,
    };

    match client.head(url).timeout(Duration::from_secs(10)).send() {
        Ok(response) => {
            result.http_status = Some(response.status().as_u16());
            if response.status().is_success() {
                result.status = ProbeStatus::Available;
            } else {
                result.error_message = Some(format!("HTTP {}", response.status()));
            }
        }
        Err(e) => {
            result.error_message = Some(format!("Request failed: {}", e));
        }
    }

    result
}

// ============================================================================
// Full Cycle Probe
// ============================================================================

/// Probes every configured lead hour of one model cycle with HEAD requests
/// and reports per-hour availability.
pub fn probe_cycle(
    client: &reqwest::blocking::Client,
    model: &OfsModel,
    cycle_time: &DateTime<Utc>,
) -> CycleAvailabilityReport {
    let base = nomads::base_url();
    let mut hours = Vec::new();

    println!(
        "Probing {} cycle {} ({} hours)...",
        model.id,
        cycle_compact(cycle_time),
        model.forecast_hours().len()
    );

    for hour in model.forecast_hours() {
        let url = nomads::forecast_url(&base, model, cycle_time, hour);
        print!("  f{:03} ... ", hour);
        let probe = probe_hour(client, hour, &url);
        match probe.status {
            ProbeStatus::Available => println!("✓ OK"),
            ProbeStatus::Missing => println!(
                "✗ MISSING: {}",
                probe.error_message.as_deref().unwrap_or("Unknown")
            ),
        }
        hours.push(probe);
    }

    let available = hours.iter().filter(|h| h.status == ProbeStatus::Available).count();
    let summary = ProbeSummary {
        total: hours.len(),
        available,
        missing: hours.len() - available,
    };

    CycleAvailabilityReport {
        timestamp: Utc::now().to_rfc3339(),
        model_id: model.id.to_string(),
        cycle: cycle_compact(cycle_time),
        hours,
        summary,
    }
}

/// Probes the latest available cycle for `model`.
pub fn probe_latest(
    client: &reqwest::blocking::Client,
    model: &OfsModel,
) -> Result<CycleAvailabilityReport, Box<dyn Error>> {
    let cycle_time = cycle::latest_cycle(model).ok_or(
        "Latest model cycle time cannot be determined. Verify that system time is \
         correct and review model cycle configuration.",
    )?;
    Ok(probe_cycle(client, model, &cycle_time))
}

pub fn print_summary(report: &CycleAvailabilityReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("AVAILABILITY SUMMARY — {} cycle {}", report.model_id, report.cycle);
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!(
        "Hours available:  {}/{}  ({} missing)",
        report.summary.available, report.summary.total, report.summary.missing
    );
    if report.summary.missing > 0 {
        let missing: Vec<String> =
            report.missing_hours().iter().map(|h| format!("f{:03}", h)).collect();
        println!("Missing hours:    {}", missing.join(", "));
    }
    println!("═══════════════════════════════════════════════════════════");
}

// ============================================================================
// Tests
// ============================================================================
