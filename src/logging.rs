/// Structured logging for the OFS S-111 conversion service.
///
/// Provides context-rich logging with pipeline stage and model/hour
/// identifiers, timestamps, and severity levels. Supports both console
/// output and file-based logging for cron-driven operational runs.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::FetchError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Index,
    Encode,
    Chop,
    Ops,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "FETCH"),
            Stage::Index => write!(f, "INDEX"),
            Stage::Encode => write!(f, "ENCODE"),
            Stage::Chop => write!(f, "CHOP"),
            Stage::Ops => write!(f, "OPS"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the hour may simply not be published yet, or the
    /// model run was curtailed
    Expected,
    /// Unexpected failure - indicates service degradation or a local problem
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(logger);
        }
    }

    /// Log a message with the global logger
    fn log(&self, level: LogLevel, stage: &Stage, context: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

        let context_part = context.map(|c| format!(" [{}]", c)).unwrap_or_default();
        let log_entry = format!(
            "{} {} {}{}: {}",
            timestamp, level, stage, context_part, message
        );

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info => println!("{}", log_entry),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", stage, context_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", stage, context_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => {} // Skip debug in non-timestamp mode
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

/// Log a general informational message
pub fn info(stage: Stage, context: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(LogLevel::Info, &stage, context, message);
        }
    }
}

/// Log a warning message
pub fn warn(stage: Stage, context: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(LogLevel::Warning, &stage, context, message);
        }
    }
}

/// Log an error message
pub fn error(stage: Stage, context: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(LogLevel::Error, &stage, context, message);
        }
    }
}

/// Log a debug message
pub fn debug(stage: Stage, context: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(LogLevel::Debug, &stage, context, message);
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a per-hour download failure based on the error type.
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        // A 404 near cycle time usually means the hour has not been
        // published yet, or the run was cut short upstream.
        FetchError::HttpStatus(404) | FetchError::HttpStatus(403) => FailureType::Expected,
        // Other HTTP errors indicate archive-side problems.
        FetchError::HttpStatus(_) => FailureType::Unexpected,
        // Transport failures suggest connectivity problems on our side.
        FetchError::Transport(_) => FailureType::Unexpected,
        // Disk failures are always a local configuration problem.
        FetchError::Disk(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a per-hour download failure with automatic classification.
pub fn log_fetch_failure(model_id: &str, hour: u16, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    let context = format!("{} f{:03}", model_id, hour);
    let message = format!("download failed [{}]: {}", failure_type, err);

    match failure_type {
        FailureType::Expected => warn(Stage::Fetch, Some(&context), &message),
        FailureType::Unexpected => error(Stage::Fetch, Some(&context), &message),
        FailureType::Unknown => warn(Stage::Fetch, Some(&context), &message),
    }
}

// ---------------------------------------------------------------------------
// Cycle Download Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one cycle's download, naming any missing hours so the
/// operator can account for gaps in the encoded series.
pub fn log_download_summary(model_id: &str, total: usize, retrieved: usize, gap_hours: &[u16]) {
    let message = if gap_hours.is_empty() {
        format!("Cycle download complete: {}/{} hours retrieved", retrieved, total)
    } else {
        let hours: Vec<String> = gap_hours.iter().map(|h| format!("f{:03}", h)).collect();
        format!(
            "Cycle download complete: {}/{} hours retrieved, missing: {}",
            retrieved,
            total,
            hours.join(", ")
        )
    };

    if gap_hours.is_empty() {
        info(Stage::Fetch, Some(model_id), &message);
    } else if retrieved == 0 {
        error(Stage::Fetch, Some(model_id), &message);
    } else {
        warn(Stage::Fetch, Some(model_id), &message);
    }
}
