//! Cleaning pipeline: frozen detection, resampling and physics validation.
//!
//! [`CleaningPipeline::clean`] runs, in order: frozen-sensor flags on the
//! raw readings, resampling onto the configured interval, wet-bulb
//! derivation, then the optional steady-state, heat-balance and
//! affinity-law checks, and finally optional row filtering. Every stage
//! returns a new frame; with `keep_intermediate` set the output of each
//! stage is kept for inspection.

pub mod frozen;
pub mod physics;
pub mod resample;

use crate::constants::{
    DEFAULT_DRY_BULB_COLUMN, DEFAULT_FROZEN_WINDOW, DEFAULT_HUMIDITY_COLUMN,
    DEFAULT_RESAMPLE_INTERVAL, FROZEN_SUFFIX,
};
use crate::error::{EtlError, Result};
use crate::frame::TimeSeriesFrame;
use crate::models::ColumnType;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

pub use frozen::{FrozenDetector, RollingWindow, default_candidates};
pub use physics::{
    AffinityParams, AppliedChecks, HeatBalanceParams, PhysicsValidator, SteadyStateParams,
    Validation, ValidationPass, detect_pump_columns, filter_invalid_rows,
};
pub use resample::{Resampled, Resampler, parse_interval};

/// Caller-facing cleaning switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningOptions {
    /// Resampling interval, e.g. `5m`
    pub interval: String,

    /// Rolling window (samples) of the frozen-sensor check
    pub frozen_window: usize,

    /// Columns to check for frozen readings; `None` picks power/temperature columns
    pub frozen_columns: Option<Vec<String>>,

    pub dry_bulb_column: String,
    pub humidity_column: String,

    pub steady_state: Option<SteadyStateParams>,
    pub heat_balance: Option<HeatBalanceParams>,
    pub affinity: Option<AffinityParams>,

    /// Remove rows failing an applied check instead of only flagging them
    pub filter_invalid: bool,

    /// Keep each stage's output frame in [`CleanedFrame::intermediates`]
    pub keep_intermediate: bool,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RESAMPLE_INTERVAL.to_string(),
            frozen_window: DEFAULT_FROZEN_WINDOW,
            frozen_columns: None,
            dry_bulb_column: DEFAULT_DRY_BULB_COLUMN.to_string(),
            humidity_column: DEFAULT_HUMIDITY_COLUMN.to_string(),
            steady_state: None,
            heat_balance: None,
            affinity: None,
            filter_invalid: false,
            keep_intermediate: false,
        }
    }
}

impl CleaningOptions {
    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = interval.into();
        self
    }

    pub fn with_frozen_window(mut self, window: usize) -> Self {
        self.frozen_window = window;
        self
    }

    pub fn with_frozen_columns(mut self, columns: Vec<String>) -> Self {
        self.frozen_columns = Some(columns);
        self
    }

    pub fn with_wet_bulb_inputs(
        mut self,
        dry_bulb: impl Into<String>,
        humidity: impl Into<String>,
    ) -> Self {
        self.dry_bulb_column = dry_bulb.into();
        self.humidity_column = humidity.into();
        self
    }

    pub fn with_steady_state(mut self, params: SteadyStateParams) -> Self {
        self.steady_state = Some(params);
        self
    }

    pub fn with_heat_balance(mut self, params: HeatBalanceParams) -> Self {
        self.heat_balance = Some(params);
        self
    }

    pub fn with_affinity(mut self, params: AffinityParams) -> Self {
        self.affinity = Some(params);
        self
    }

    pub fn with_filter_invalid(mut self, filter: bool) -> Self {
        self.filter_invalid = filter;
        self
    }

    pub fn with_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediate = keep;
        self
    }

    pub fn validate(&self) -> Result<()> {
        parse_interval(&self.interval)?;
        if self.frozen_window < 2 {
            return Err(EtlError::Configuration {
                message: format!(
                    "frozen window must hold at least 2 samples, got {}",
                    self.frozen_window
                ),
            });
        }
        if self
            .steady_state
            .as_ref()
            .is_some_and(|steady| {
                steady.window_minutes <= 0
                    || chrono::Duration::try_minutes(steady.window_minutes).is_none()
            })
        {
            return Err(EtlError::Configuration {
                message: "steady-state window must be a positive number of minutes".to_string(),
            });
        }
        let tolerances = [
            self.heat_balance.as_ref().map(|p| p.tolerance),
            self.affinity.as_ref().map(|p| p.tolerance),
        ];
        if tolerances.iter().flatten().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(EtlError::Configuration {
                message: "validation tolerances must be positive".to_string(),
            });
        }
        if self
            .heat_balance
            .as_ref()
            .is_some_and(|params| params.factor == 0.0)
        {
            return Err(EtlError::Configuration {
                message: "heat balance factor must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CleaningStage {
    FrozenDetection,
    Resample,
    WetBulb,
    SteadyState,
    HeatBalance,
    AffinityLaw,
    FilterInvalid,
}

impl From<ValidationPass> for CleaningStage {
    fn from(pass: ValidationPass) -> Self {
        match pass {
            ValidationPass::WetBulb => CleaningStage::WetBulb,
            ValidationPass::SteadyState => CleaningStage::SteadyState,
            ValidationPass::HeatBalance => CleaningStage::HeatBalance,
            ValidationPass::AffinityLaw => CleaningStage::AffinityLaw,
        }
    }
}

/// Recovered conditions met while cleaning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CleaningWarning {
    NullTimestampsDropped { count: usize },
    FrozenColumnMissing { column: String },
    PassSkipped { pass: ValidationPass, reason: String },
}

impl fmt::Display for CleaningWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleaningWarning::NullTimestampsDropped { count } => {
                write!(f, "{} rows with null timestamps dropped", count)
            }
            CleaningWarning::FrozenColumnMissing { column } => {
                write!(f, "frozen-detection column '{}' not found", column)
            }
            CleaningWarning::PassSkipped { pass, reason } => {
                write!(f, "{} check skipped: {}", pass, reason)
            }
        }
    }
}

/// Which configured feature names the cleaned data can provide
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureAvailability {
    pub available: Vec<String>,
    pub missing: Vec<String>,
}

/// Output of the cleaning pipeline
#[derive(Debug, Clone)]
pub struct CleanedFrame {
    pub frame: TimeSeriesFrame,
    pub warnings: Vec<CleaningWarning>,
    /// Stages that ran and produced output
    pub stages: Vec<CleaningStage>,
    /// Per-stage snapshots, only with `keep_intermediate`
    pub intermediates: Vec<(CleaningStage, TimeSeriesFrame)>,
    pub rows_in: usize,
    pub rows_filtered: usize,
}

impl CleanedFrame {
    /// Numeric sensor columns (not flags) holding at least one value
    pub fn feature_columns(&self) -> Vec<&str> {
        self.frame
            .columns()
            .iter()
            .filter(|c| matches!(c.column_type(), ColumnType::Float | ColumnType::Integer))
            .filter(|c| !c.name().ends_with(FROZEN_SUFFIX))
            .filter(|c| c.values().non_null_count() > 0)
            .map(|c| c.name())
            .collect()
    }

    /// Split configured feature names into available and missing, keeping their order
    pub fn intersect_features<S: AsRef<str>>(&self, wanted: &[S]) -> FeatureAvailability {
        let present = self.feature_columns();
        let mut availability = FeatureAvailability::default();
        for name in wanted {
            let name = name.as_ref();
            if present.contains(&name) {
                availability.available.push(name.to_string());
            } else {
                availability.missing.push(name.to_string());
            }
        }
        availability
    }
}

/// Runs the configured stages over one frame
#[derive(Debug, Clone)]
pub struct CleaningPipeline {
    options: CleaningOptions,
    resampler: Resampler,
    frozen: FrozenDetector,
    physics: PhysicsValidator,
}

impl CleaningPipeline {
    pub fn new(options: CleaningOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            resampler: Resampler::parse(&options.interval)?,
            frozen: FrozenDetector::new(options.frozen_window),
            physics: PhysicsValidator::new(),
            options,
        })
    }

    pub fn options(&self) -> &CleaningOptions {
        &self.options
    }

    pub fn clean(&self, frame: &TimeSeriesFrame) -> Result<CleanedFrame> {
        info!(
            "Starting cleaning pipeline on {} rows, {} columns",
            frame.len(),
            frame.columns().len()
        );
        let mut run = Run::new(frame.len(), self.options.keep_intermediate);

        // sensor columns are numeric from here on; unparseable text becomes null
        let frame = &frame.map_columns(|c| {
            if c.is_flag() {
                c.clone()
            } else {
                c.cast(ColumnType::Float)
            }
        });

        // frozen flags on the raw readings
        let candidates = match &self.options.frozen_columns {
            Some(columns) => columns
                .iter()
                .filter(|c| {
                    let present = frame.has_column(c);
                    if !present {
                        warn!("Frozen detection column '{}' not found", c);
                        run.warnings.push(CleaningWarning::FrozenColumnMissing {
                            column: c.to_string(),
                        });
                    }
                    present
                })
                .cloned()
                .collect(),
            None => default_candidates(frame),
        };
        let current = self.frozen.detect_all(frame, &candidates)?;
        run.record(CleaningStage::FrozenDetection, &current);

        let resampled = self.resampler.resample(&current)?;
        if resampled.dropped_rows > 0 {
            run.warnings.push(CleaningWarning::NullTimestampsDropped {
                count: resampled.dropped_rows,
            });
        }
        let mut current = resampled.frame;
        run.record(CleaningStage::Resample, &current);

        let mut checks = AppliedChecks::default();

        let wet_bulb = self.physics.wet_bulb(
            &current,
            &self.options.dry_bulb_column,
            &self.options.humidity_column,
        )?;
        current = run.apply(ValidationPass::WetBulb, wet_bulb, current);

        if let Some(params) = &self.options.steady_state {
            let validation = self
                .physics
                .steady_state(&current, params, self.resampler.interval())?;
            checks.steady_state = matches!(validation, Validation::Applied(_));
            current = run.apply(ValidationPass::SteadyState, validation, current);
        }

        if let Some(params) = &self.options.heat_balance {
            let validation = self.physics.heat_balance(&current, params)?;
            checks.heat_balance = matches!(validation, Validation::Applied(_));
            current = run.apply(ValidationPass::HeatBalance, validation, current);
        }

        if let Some(params) = &self.options.affinity {
            let validation = self.physics.affinity_law(&current, params)?;
            checks.affinity_law = matches!(validation, Validation::Applied(_));
            current = run.apply(ValidationPass::AffinityLaw, validation, current);
        }

        let mut rows_filtered = 0;
        if self.options.filter_invalid {
            let before = current.len();
            current = filter_invalid_rows(&current, checks);
            rows_filtered = before - current.len();
            run.record(CleaningStage::FilterInvalid, &current);
        }

        info!(
            "Cleaning pipeline complete: {} rows, {} columns, {} warnings",
            current.len(),
            current.columns().len(),
            run.warnings.len()
        );

        Ok(CleanedFrame {
            frame: current,
            warnings: run.warnings,
            stages: run.stages,
            intermediates: run.intermediates,
            rows_in: run.rows_in,
            rows_filtered,
        })
    }
}

/// Bookkeeping for one pipeline run
struct Run {
    rows_in: usize,
    keep_intermediate: bool,
    warnings: Vec<CleaningWarning>,
    stages: Vec<CleaningStage>,
    intermediates: Vec<(CleaningStage, TimeSeriesFrame)>,
}

impl Run {
    fn new(rows_in: usize, keep_intermediate: bool) -> Self {
        Self {
            rows_in,
            keep_intermediate,
            warnings: Vec::new(),
            stages: Vec::new(),
            intermediates: Vec::new(),
        }
    }

    fn record(&mut self, stage: CleaningStage, frame: &TimeSeriesFrame) {
        self.stages.push(stage);
        if self.keep_intermediate {
            self.intermediates.push((stage, frame.clone()));
        }
    }

    /// Take the new frame of an applied pass, or keep `current` and warn
    fn apply(
        &mut self,
        pass: ValidationPass,
        validation: Validation,
        current: TimeSeriesFrame,
    ) -> TimeSeriesFrame {
        match validation {
            Validation::Applied(frame) => {
                self.record(pass.into(), &frame);
                frame
            }
            Validation::Skipped { reason } => {
                warn!("Skipping {} check: {}", pass, reason);
                self.warnings.push(CleaningWarning::PassSkipped { pass, reason });
                current
            }
        }
    }
}

/// Clean one frame with the given options
pub fn clean(frame: &TimeSeriesFrame, options: &CleaningOptions) -> Result<CleanedFrame> {
    CleaningPipeline::new(options.clone())?.clean(frame)
}
