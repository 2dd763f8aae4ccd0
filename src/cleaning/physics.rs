//! Physics-based derivations and consistency checks for chiller plant data.
//!
//! Every pass takes a frame and returns a new frame with one added column,
//! or reports why it was skipped. Passes never fail on missing inputs and
//! never touch columns computed earlier.

use crate::constants::{
    DEFAULT_AFFINITY_TOLERANCE, DEFAULT_HEAT_BALANCE_FACTOR, DEFAULT_HEAT_BALANCE_TOLERANCE,
    DEFAULT_LOAD_COLUMN, DEFAULT_STEADY_MAX_CHANGE_PCT, DEFAULT_STEADY_WINDOW_MINUTES,
    PUMP_FREQUENCY_PATTERNS, PUMP_POWER_PATTERNS, WET_BULB_COLUMN, flags,
};
use crate::error::Result;
use crate::frame::{Column, ColumnValues, TimeSeriesFrame};
use crate::models::ColumnType;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Inputs of the heat-balance check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatBalanceParams {
    pub flow_column: String,
    /// Entering (return) water temperature
    pub temp_in_column: String,
    /// Leaving (supply) water temperature
    pub temp_out_column: String,
    /// Reported load, in refrigeration tons
    pub load_column: String,
    /// Divisor turning `flow * delta_t` into load units
    pub factor: f64,
    pub tolerance: f64,
}

impl HeatBalanceParams {
    pub fn new(
        flow_column: impl Into<String>,
        temp_in_column: impl Into<String>,
        temp_out_column: impl Into<String>,
        load_column: impl Into<String>,
    ) -> Self {
        Self {
            flow_column: flow_column.into(),
            temp_in_column: temp_in_column.into(),
            temp_out_column: temp_out_column.into(),
            load_column: load_column.into(),
            factor: DEFAULT_HEAT_BALANCE_FACTOR,
            tolerance: DEFAULT_HEAT_BALANCE_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }
}

/// Inputs of the pump affinity-law check; unset columns are auto-detected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinityParams {
    pub frequency_column: Option<String>,
    pub power_column: Option<String>,
    pub tolerance: f64,
}

impl Default for AffinityParams {
    fn default() -> Self {
        Self {
            frequency_column: None,
            power_column: None,
            tolerance: DEFAULT_AFFINITY_TOLERANCE,
        }
    }
}

impl AffinityParams {
    pub fn with_columns(mut self, frequency: impl Into<String>, power: impl Into<String>) -> Self {
        self.frequency_column = Some(frequency.into());
        self.power_column = Some(power.into());
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Inputs of steady-state detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateParams {
    pub load_column: String,
    pub window_minutes: i64,
    pub max_change_pct: f64,
}

impl Default for SteadyStateParams {
    fn default() -> Self {
        Self {
            load_column: DEFAULT_LOAD_COLUMN.to_string(),
            window_minutes: DEFAULT_STEADY_WINDOW_MINUTES,
            max_change_pct: DEFAULT_STEADY_MAX_CHANGE_PCT,
        }
    }
}

impl SteadyStateParams {
    pub fn with_load_column(mut self, column: impl Into<String>) -> Self {
        self.load_column = column.into();
        self
    }

    pub fn with_window_minutes(mut self, minutes: i64) -> Self {
        self.window_minutes = minutes;
        self
    }

    pub fn with_max_change_pct(mut self, pct: f64) -> Self {
        self.max_change_pct = pct;
        self
    }
}

/// Identifies a physics pass in warnings and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationPass {
    WetBulb,
    SteadyState,
    HeatBalance,
    AffinityLaw,
}

impl fmt::Display for ValidationPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationPass::WetBulb => "wet-bulb",
            ValidationPass::SteadyState => "steady-state",
            ValidationPass::HeatBalance => "heat-balance",
            ValidationPass::AffinityLaw => "affinity-law",
        };
        f.write_str(name)
    }
}

/// Result of one pass
#[derive(Debug, Clone)]
pub enum Validation {
    Applied(TimeSeriesFrame),
    Skipped { reason: String },
}

fn missing_columns(frame: &TimeSeriesFrame, required: &[&str]) -> Option<Validation> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| !frame.has_column(c))
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(Validation::Skipped {
            reason: format!("missing columns: {}", missing.join(", ")),
        })
    }
}

/// Stull (2011) wet-bulb approximation, `temp` in °C and `rh` in percent
pub fn stull_wet_bulb(temp: f64, rh: f64) -> f64 {
    temp * (0.151977 * (rh + 8.313659).sqrt()).atan() + (temp + rh).atan()
        - (rh - 1.676331).atan()
        + 0.00391838 * rh.powf(1.5) * (0.023101 * rh).atan()
        - 4.686035
}

/// Median of the finite values, midpoint for even counts
fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// First numeric column matching a frequency pattern and first matching a power pattern
pub fn detect_pump_columns(frame: &TimeSeriesFrame) -> (Option<String>, Option<String>) {
    let mut frequency = None;
    let mut power = None;

    for column in frame.columns().iter() {
        if !matches!(column.column_type(), ColumnType::Float | ColumnType::Integer) {
            continue;
        }
        let lower = column.name().to_lowercase();
        if frequency.is_none() && PUMP_FREQUENCY_PATTERNS.iter().any(|p| lower.contains(p)) {
            frequency = Some(column.name().to_string());
        }
        if power.is_none() && PUMP_POWER_PATTERNS.iter().any(|p| lower.contains(p)) {
            power = Some(column.name().to_string());
        }
    }

    (frequency, power)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicsValidator;

impl PhysicsValidator {
    pub fn new() -> Self {
        Self
    }

    /// Derive `temp_wb_out` from dry-bulb temperature and relative humidity
    pub fn wet_bulb(
        &self,
        frame: &TimeSeriesFrame,
        dry_bulb_column: &str,
        humidity_column: &str,
    ) -> Result<Validation> {
        if let Some(skip) = missing_columns(frame, &[dry_bulb_column, humidity_column]) {
            return Ok(skip);
        }
        let temp = frame.numeric(dry_bulb_column).unwrap_or_default();
        let rh = frame.numeric(humidity_column).unwrap_or_default();

        let wet_bulb: Vec<Option<f64>> = temp
            .iter()
            .zip(&rh)
            .map(|(t, h)| match (t, h) {
                (Some(t), Some(h)) => Some(stull_wet_bulb(*t, *h)).filter(|v| v.is_finite()),
                _ => None,
            })
            .collect();

        debug!("Derived {} from {} and {}", WET_BULB_COLUMN, dry_bulb_column, humidity_column);
        Ok(Validation::Applied(
            frame.with_column(Column::float(WET_BULB_COLUMN, wet_bulb))?,
        ))
    }

    /// Flag rows whose load varies by at most `max_change_pct` over the window.
    ///
    /// The window spans `window_minutes / interval` rows (at least one).
    /// Rows without a full window of values count as steady.
    pub fn steady_state(
        &self,
        frame: &TimeSeriesFrame,
        params: &SteadyStateParams,
        interval: Duration,
    ) -> Result<Validation> {
        if let Some(skip) = missing_columns(frame, &[params.load_column.as_str()]) {
            return Ok(skip);
        }
        let load = frame.numeric(&params.load_column).unwrap_or_default();

        let interval_secs = interval.num_seconds().max(1);
        let window_secs = params.window_minutes.saturating_mul(60);
        let window = usize::try_from((window_secs / interval_secs).max(1)).unwrap_or(usize::MAX);

        let steady: Vec<Option<bool>> = (0..load.len())
            .map(|i| {
                if i + 1 < window {
                    return Some(true);
                }
                let slice = &load[i + 1 - window..=i];
                let Some(values) = slice.iter().copied().collect::<Option<Vec<f64>>>() else {
                    return Some(true);
                };
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let change_pct = (max - min) / ((max + min) / 2.0 + 1e-6) * 100.0;
                Some(change_pct <= params.max_change_pct)
            })
            .collect();

        let steady_rows = steady.iter().filter(|s| **s == Some(true)).count();
        info!(
            "Steady state detection: {}/{} rows steady (window {} rows)",
            steady_rows,
            steady.len(),
            window
        );

        Ok(Validation::Applied(
            frame.with_column(Column::flag(flags::IS_STEADY_STATE, steady))?,
        ))
    }

    /// Flag rows whose reported load disagrees with `flow * delta_t / factor`
    pub fn heat_balance(
        &self,
        frame: &TimeSeriesFrame,
        params: &HeatBalanceParams,
    ) -> Result<Validation> {
        if let Some(skip) = missing_columns(
            frame,
            &[
                params.flow_column.as_str(),
                params.temp_in_column.as_str(),
                params.temp_out_column.as_str(),
                params.load_column.as_str(),
            ],
        ) {
            return Ok(skip);
        }
        let flow = frame.numeric(&params.flow_column).unwrap_or_default();
        let temp_in = frame.numeric(&params.temp_in_column).unwrap_or_default();
        let temp_out = frame.numeric(&params.temp_out_column).unwrap_or_default();
        let reported = frame.numeric(&params.load_column).unwrap_or_default();

        let invalid: Vec<Option<bool>> = (0..frame.len())
            .map(|i| {
                let (flow, t_in, t_out, load) = (flow[i]?, temp_in[i]?, temp_out[i]?, reported[i]?);
                if load == 0.0 {
                    return Some(true);
                }
                let expected = flow * (t_in - t_out) / params.factor;
                let deviation = (expected - load).abs() / load;
                Some(!deviation.is_finite() || deviation > params.tolerance)
            })
            .collect();

        let flagged = invalid.iter().filter(|f| **f == Some(true)).count();
        info!("Heat balance: {} of {} rows invalid", flagged, invalid.len());

        Ok(Validation::Applied(
            frame.with_column(Column::flag(flags::HEAT_BALANCE_INVALID, invalid))?,
        ))
    }

    /// Flag rows whose `power / frequency^3` strays from the series median
    pub fn affinity_law(
        &self,
        frame: &TimeSeriesFrame,
        params: &AffinityParams,
    ) -> Result<Validation> {
        let (frequency_column, power_column) =
            match (&params.frequency_column, &params.power_column) {
                (Some(f), Some(p)) => (f.clone(), p.clone()),
                _ => {
                    let (detected_f, detected_p) = detect_pump_columns(frame);
                    match (
                        params.frequency_column.clone().or(detected_f),
                        params.power_column.clone().or(detected_p),
                    ) {
                        (Some(f), Some(p)) => {
                            info!("Auto-detected pump columns: {}, {}", f, p);
                            (f, p)
                        }
                        _ => {
                            return Ok(Validation::Skipped {
                                reason: "could not detect pump frequency/power columns"
                                    .to_string(),
                            });
                        }
                    }
                }
            };

        if let Some(skip) = missing_columns(frame, &[frequency_column.as_str(), power_column.as_str()])
        {
            return Ok(skip);
        }
        let frequency = frame.numeric(&frequency_column).unwrap_or_default();
        let power = frame.numeric(&power_column).unwrap_or_default();

        // None: missing input; NaN: zero frequency or non-finite ratio
        let ratios: Vec<Option<f64>> = frequency
            .iter()
            .zip(&power)
            .map(|(f, p)| match (f, p) {
                (Some(f), Some(p)) if *f != 0.0 => Some(p / f.powi(3)),
                (Some(_), Some(_)) => Some(f64::NAN),
                _ => None,
            })
            .collect();

        let finite: Vec<f64> = ratios.iter().flatten().copied().filter(|r| r.is_finite()).collect();
        let baseline = match median(&finite) {
            Some(m) if m != 0.0 => m,
            other => {
                return Ok(Validation::Skipped {
                    reason: format!("degenerate baseline ratio {:?}", other),
                });
            }
        };

        let invalid: Vec<Option<bool>> = ratios
            .iter()
            .map(|ratio| {
                ratio.map(|r| !r.is_finite() || (r - baseline).abs() / baseline > params.tolerance)
            })
            .collect();

        let flagged = invalid.iter().filter(|f| **f == Some(true)).count();
        info!(
            "Affinity law ({} vs {}): {} of {} rows invalid, baseline ratio {:.6e}",
            power_column,
            frequency_column,
            flagged,
            invalid.len(),
            baseline
        );

        Ok(Validation::Applied(
            frame.with_column(Column::flag(flags::AFFINITY_LAW_INVALID, invalid))?,
        ))
    }
}

/// Which checks ran, and therefore which flags may remove rows
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AppliedChecks {
    pub heat_balance: bool,
    pub steady_state: bool,
    pub affinity_law: bool,
}

/// Drop rows failing an applied check; unknown (null) flags keep the row
pub fn filter_invalid_rows(frame: &TimeSeriesFrame, checks: AppliedChecks) -> TimeSeriesFrame {
    let flag = |enabled: bool, name: &str| -> Option<Vec<Option<bool>>> {
        if !enabled {
            return None;
        }
        match frame.column(name)?.values() {
            ColumnValues::Boolean(v) => Some(v.clone()),
            _ => None,
        }
    };
    let heat = flag(checks.heat_balance, flags::HEAT_BALANCE_INVALID);
    let steady = flag(checks.steady_state, flags::IS_STEADY_STATE);
    let affinity = flag(checks.affinity_law, flags::AFFINITY_LAW_INVALID);

    let keep: Vec<usize> = (0..frame.len())
        .filter(|&i| {
            let heat_bad = heat.as_ref().is_some_and(|v| v[i] == Some(true));
            let unsteady = steady.as_ref().is_some_and(|v| v[i] == Some(false));
            let affinity_bad = affinity.as_ref().is_some_and(|v| v[i] == Some(true));
            !(heat_bad || unsteady || affinity_bad)
        })
        .collect();

    info!(
        "Filtered invalid rows: {} -> {} rows",
        frame.len(),
        keep.len()
    );
    if keep.len() == frame.len() {
        frame.clone()
    } else {
        frame.take_rows(&keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn timeline(n: usize) -> Vec<Option<NaiveDateTime>> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        (0..n)
            .map(|i| Some(start + Duration::minutes(5 * i as i64)))
            .collect()
    }

    fn frame(columns: Vec<Column>) -> TimeSeriesFrame {
        let rows = columns.first().map(Column::len).unwrap_or(0);
        TimeSeriesFrame::new(timeline(rows), columns).unwrap()
    }

    fn applied(validation: Validation) -> TimeSeriesFrame {
        match validation {
            Validation::Applied(frame) => frame,
            Validation::Skipped { reason } => panic!("pass skipped: {reason}"),
        }
    }

    fn flag_values(frame: &TimeSeriesFrame, name: &str) -> Vec<Option<bool>> {
        match frame.column(name).unwrap().values() {
            ColumnValues::Boolean(v) => v.clone(),
            other => panic!("not a flag column: {:?}", other),
        }
    }

    #[test]
    fn test_stull_wet_bulb() {
        assert!((stull_wet_bulb(20.0, 50.0) - 13.7).abs() < 0.01);
    }

    #[test]
    fn test_wet_bulb_pass() {
        let input = frame(vec![
            Column::float("temp_db_out", vec![Some(20.0), None]),
            Column::float("rh_out", vec![Some(50.0), Some(60.0)]),
        ]);
        let out = applied(
            PhysicsValidator::new()
                .wet_bulb(&input, "temp_db_out", "rh_out")
                .unwrap(),
        );
        let wb = out.numeric(WET_BULB_COLUMN).unwrap();
        assert!((wb[0].unwrap() - 13.7).abs() < 0.01);
        assert_eq!(wb[1], None);
    }

    #[test]
    fn test_wet_bulb_skips_missing_inputs() {
        let input = frame(vec![Column::float("temp_db_out", vec![Some(20.0)])]);
        let result = PhysicsValidator::new()
            .wet_bulb(&input, "temp_db_out", "rh_out")
            .unwrap();
        match result {
            Validation::Skipped { reason } => assert!(reason.contains("rh_out")),
            Validation::Applied(_) => panic!("expected skip"),
        }
    }

    #[test]
    fn test_heat_balance() {
        // expected load = 240 * 5 / 24 = 50
        let input = frame(vec![
            Column::float("flow", vec![Some(240.0), Some(240.0), Some(240.0), None]),
            Column::float("t_in", vec![Some(12.0), Some(12.0), Some(12.0), Some(12.0)]),
            Column::float("t_out", vec![Some(7.0), Some(7.0), Some(7.0), Some(7.0)]),
            Column::float("load", vec![Some(52.0), Some(80.0), Some(0.0), Some(50.0)]),
        ]);
        let params = HeatBalanceParams::new("flow", "t_in", "t_out", "load");
        let out = applied(PhysicsValidator::new().heat_balance(&input, &params).unwrap());
        assert_eq!(
            flag_values(&out, flags::HEAT_BALANCE_INVALID),
            vec![Some(false), Some(true), Some(true), None]
        );
    }

    #[test]
    fn test_affinity_law_uses_median_baseline() {
        // ratio 0.001 everywhere except the noisy first sample and a zero frequency
        let input = frame(vec![
            Column::float(
                "CHWP_HZ_1",
                vec![Some(10.0), Some(20.0), Some(30.0), Some(40.0), Some(0.0), None],
            ),
            Column::float(
                "CHWP_KW_1",
                vec![Some(5.0), Some(8.0), Some(27.0), Some(64.0), Some(1.0), Some(3.0)],
            ),
        ]);
        let out = applied(
            PhysicsValidator::new()
                .affinity_law(&input, &AffinityParams::default())
                .unwrap(),
        );
        assert_eq!(
            flag_values(&out, flags::AFFINITY_LAW_INVALID),
            vec![Some(true), Some(false), Some(false), Some(false), Some(true), None]
        );
    }

    #[test]
    fn test_affinity_law_skips_without_pump_columns() {
        let input = frame(vec![Column::float("CH_1_KW", vec![Some(1.0)])]);
        let result = PhysicsValidator::new()
            .affinity_law(&input, &AffinityParams::default())
            .unwrap();
        assert!(matches!(result, Validation::Skipped { .. }));
    }

    #[test]
    fn test_detect_pump_columns() {
        let input = frame(vec![
            Column::float("CH_1_KW", vec![Some(1.0)]),
            Column::float("CWP_HZ_2", vec![Some(1.0)]),
            Column::float("CHWP_KW_1", vec![Some(1.0)]),
            Column::float("CHWP_HZ_1", vec![Some(1.0)]),
        ]);
        assert_eq!(
            detect_pump_columns(&input),
            (Some("CWP_HZ_2".to_string()), Some("CHWP_KW_1".to_string()))
        );
    }

    #[test]
    fn test_steady_state() {
        let input = frame(vec![Column::float(
            "CH_0_RT",
            vec![Some(100.0), Some(101.0), Some(102.0), Some(150.0), Some(151.0), None],
        )]);
        // 15 minute window over 5 minute rows -> 3 rows
        let out = applied(
            PhysicsValidator::new()
                .steady_state(&input, &SteadyStateParams::default(), Duration::minutes(5))
                .unwrap(),
        );
        assert_eq!(
            flag_values(&out, flags::IS_STEADY_STATE),
            vec![Some(true), Some(true), Some(true), Some(false), Some(false), Some(true)]
        );
    }

    #[test]
    fn test_steady_state_window_longer_than_data() {
        let input = frame(vec![Column::float(
            "CH_0_RT",
            vec![Some(100.0), Some(150.0), Some(300.0)],
        )]);
        let params = SteadyStateParams::default().with_window_minutes(i64::MAX);
        let out = applied(
            PhysicsValidator::new()
                .steady_state(&input, &params, Duration::minutes(5))
                .unwrap(),
        );
        assert_eq!(flag_values(&out, flags::IS_STEADY_STATE), vec![Some(true); 3]);
    }

    #[test]
    fn test_steady_state_skips_missing_load() {
        let input = frame(vec![Column::float("CH_1_KW", vec![Some(1.0)])]);
        let result = PhysicsValidator::new()
            .steady_state(&input, &SteadyStateParams::default(), Duration::minutes(5))
            .unwrap();
        assert!(matches!(result, Validation::Skipped { .. }));
    }

    #[test]
    fn test_filter_invalid_rows_only_for_applied_checks() {
        let input = frame(vec![
            Column::float("CH_1_KW", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            Column::flag(
                flags::HEAT_BALANCE_INVALID,
                vec![Some(true), Some(false), None, Some(false)],
            ),
            Column::flag(
                flags::IS_STEADY_STATE,
                vec![Some(true), Some(true), Some(true), Some(false)],
            ),
        ]);

        let heat_only = filter_invalid_rows(
            &input,
            AppliedChecks {
                heat_balance: true,
                ..Default::default()
            },
        );
        assert_eq!(
            heat_only.numeric("CH_1_KW").unwrap(),
            vec![Some(2.0), Some(3.0), Some(4.0)]
        );

        let both = filter_invalid_rows(
            &input,
            AppliedChecks {
                heat_balance: true,
                steady_state: true,
                affinity_law: true,
            },
        );
        assert_eq!(both.numeric("CH_1_KW").unwrap(), vec![Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN]), None);
    }
}
