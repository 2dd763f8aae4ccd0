//! Application constants for the BMS ETL core
//!
//! Report layout markers, null sentinels, default thresholds and column
//! naming conventions shared by the parser, the cleaning stages and the CLI.

// =============================================================================
// Report Layout
// =============================================================================

/// Marker that opens the data header row once quotes are stripped
pub const DATA_HEADER_MARKER: &str = "<>Date";

/// Token prefixed to the date column name in the data header row
pub const DATE_COLUMN_PREFIX: &str = "<>";

/// Canonical name of the date column after renaming
pub const DATE_COLUMN: &str = "Date";

/// Name of the time-of-day column in the data header row
pub const TIME_COLUMN: &str = "Time";

/// Name of the merged timestamp column in every frame
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Format of `Date + " " + Time` in report files
pub const DATE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Header row index used when no `<>Date` marker is found.
///
/// Scheduler-use reports carry 211 metadata lines before the data header.
pub const DEFAULT_FALLBACK_HEADER_LINE: usize = 211;

/// Cell values that mean "no reading" (compared case-insensitively)
pub const NULL_SENTINELS: &[&str] = &["", "no data", "na", "null"];

// =============================================================================
// Cleaning Defaults
// =============================================================================

/// Default resampling interval
pub const DEFAULT_RESAMPLE_INTERVAL: &str = "5m";

/// Default number of samples in the frozen-sensor rolling window
pub const DEFAULT_FROZEN_WINDOW: usize = 6;

/// Rolling standard deviation below which a reading counts as frozen
pub const FROZEN_STD_THRESHOLD: f64 = 0.001;

/// Column-name fragments that make a column a frozen-detection candidate
pub const FROZEN_CANDIDATE_MARKERS: &[&str] = &["kw", "temp"];

/// Suffix of the per-column frozen flag
pub const FROZEN_SUFFIX: &str = "_frozen";

/// Default dry-bulb and relative-humidity columns for wet-bulb derivation
pub const DEFAULT_DRY_BULB_COLUMN: &str = "temp_db_out";
pub const DEFAULT_HUMIDITY_COLUMN: &str = "rh_out";

/// Derived wet-bulb temperature column
pub const WET_BULB_COLUMN: &str = "temp_wb_out";

/// Default relative tolerance of the heat-balance check
pub const DEFAULT_HEAT_BALANCE_TOLERANCE: f64 = 0.15;

/// Divisor turning `flow * delta_t` into refrigeration tons (GPM and °F)
pub const DEFAULT_HEAT_BALANCE_FACTOR: f64 = 24.0;

/// Default relative tolerance of the affinity-law check
pub const DEFAULT_AFFINITY_TOLERANCE: f64 = 0.20;

/// Default load column for steady-state detection
pub const DEFAULT_LOAD_COLUMN: &str = "CH_0_RT";

/// Default steady-state window and allowed change
pub const DEFAULT_STEADY_WINDOW_MINUTES: i64 = 15;
pub const DEFAULT_STEADY_MAX_CHANGE_PCT: f64 = 5.0;

/// Name fragments used to auto-detect pump frequency and power columns
pub const PUMP_FREQUENCY_PATTERNS: &[&str] =
    &["pump_freq", "pump_hz", "chwp_hz", "cwp_hz", "hz", "frequency"];
pub const PUMP_POWER_PATTERNS: &[&str] = &["pump_kw", "chwp_kw", "cwp_kw", "pump_power"];

// =============================================================================
// Validation Flag Columns
// =============================================================================

pub mod flags {
    pub const HEAT_BALANCE_INVALID: &str = "heat_balance_invalid";
    pub const AFFINITY_LAW_INVALID: &str = "affinity_law_invalid";
    pub const IS_STEADY_STATE: &str = "is_steady_state";
}

// =============================================================================
// Batch Processing
// =============================================================================

/// Default glob pattern for report discovery
pub const DEFAULT_FILE_PATTERN: &str = "*.csv";

/// Fraction of used memory above which the worker pool is halved
pub const MEMORY_PRESSURE_THRESHOLD: f64 = 0.8;
