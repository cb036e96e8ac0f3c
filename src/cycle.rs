/// Forecast cycle resolution.
///
/// A forecast cycle is one model run issuance, identified by its UTC
/// reference time. Files for a cycle appear on the archive only after the
/// model's configured availability delay, so "latest cycle" means the most
/// recent cycle whose delay has elapsed, not the most recent issued.
///
/// # Clock injection
/// All functions accept a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally. This makes cycle selection purely deterministic
/// in tests without mocking or time manipulation.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};

use crate::registry::OfsModel;

// ---------------------------------------------------------------------------
// Cycle timestamp parsing
// ---------------------------------------------------------------------------

/// Parses an explicit cycle timestamp in `YYYYMMDDHH` form.
///
/// The hour is not required to match the model's configured cycle schedule;
/// callers may warn on a mismatch but off-schedule reprocessing is allowed.
pub fn parse_cycle(text: &str) -> Result<DateTime<Utc>, String> {
    if text.len() != 10 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!(
            "invalid cycle timestamp [{}]: format must be YYYYMMDDHH",
            text
        ));
    }
    let year: i32 = text[0..4].parse().map_err(|_| format!("invalid year in [{}]", text))?;
    let month: u32 = text[4..6].parse().map_err(|_| format!("invalid month in [{}]", text))?;
    let day: u32 = text[6..8].parse().map_err(|_| format!("invalid day in [{}]", text))?;
    let hour: u32 = text[8..10].parse().map_err(|_| format!("invalid hour in [{}]", text))?;

    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .ok_or_else(|| format!("invalid cycle timestamp [{}]", text))
}

/// Compact `YYYYMMDDHH` rendering used in file names and metadata.
pub fn cycle_compact(cycle: &DateTime<Utc>) -> String {
    cycle.format("%Y%m%d%H").to_string()
}

/// Whether the cycle's hour-of-day is one the model actually issues.
pub fn is_scheduled_cycle(model: &OfsModel, cycle: &DateTime<Utc>) -> bool {
    model.cycles.contains(&cycle.hour())
}

// ---------------------------------------------------------------------------
// Latest cycle selection
// ---------------------------------------------------------------------------

/// Calculates the latest cycle for `model` whose files should be available
/// on the archive at `now`.
///
/// Candidate cycle times are yesterday's and today's configured cycle hours;
/// they are scanned in reverse chronological order until one is found with
/// `now >= cycle + availability_delay`. Returns `None` when no candidate
/// qualifies (system clock far in the past relative to the configured
/// schedule).
pub fn latest_cycle_at(model: &OfsModel, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut candidates: Vec<DateTime<Utc>> = Vec::with_capacity(model.cycles.len() * 2);
    for &cycle_hour in model.cycles {
        let today = now
            .date_naive()
            .and_hms_opt(cycle_hour, 0, 0)
            .map(|t| Utc.from_utc_datetime(&t))?;
        candidates.push(today - Duration::days(1));
        candidates.push(today);
    }
    candidates.sort();

    let delay = Duration::minutes(model.availability_delay_min);
    candidates.into_iter().rev().find(|&cycle| now >= cycle + delay)
}

/// Convenience wrapper that uses the real current time.
/// Use `latest_cycle_at` in tests to keep them deterministic.
pub fn latest_cycle(model: &OfsModel) -> Option<DateTime<Utc>> {
    latest_cycle_at(model, Utc::now())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
