//! Frozen-sensor detection.
//!
//! A stuck sensor or a dead communication link shows up as a run of
//! identical readings. Each candidate column gets a `<column>_frozen` flag
//! that is true where the rolling sample standard deviation over the last
//! `window` readings is below [`FROZEN_STD_THRESHOLD`].

use crate::constants::{FROZEN_CANDIDATE_MARKERS, FROZEN_STD_THRESHOLD, FROZEN_SUFFIX};
use crate::error::Result;
use crate::frame::{Column, TimeSeriesFrame};
use crate::models::ColumnType;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Fixed-capacity window over the most recent samples.
///
/// Statistics are only defined once the window is full and holds no nulls;
/// the first `capacity - 1` positions are therefore "insufficient data".
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<Option<f64>>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: Option<f64>) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// Sample standard deviation (n - 1), or `None` if the window is not usable
    pub fn std_dev(&self) -> Option<f64> {
        if self.capacity < 2 || !self.is_full() {
            return None;
        }
        let mut samples = Vec::with_capacity(self.capacity);
        for value in &self.values {
            samples.push((*value)?);
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let sum_sq: f64 = samples.iter().map(|v| (v - mean).powi(2)).sum();
        Some((sum_sq / (n - 1.0)).sqrt())
    }
}

#[derive(Debug, Clone)]
pub struct FrozenDetector {
    window: usize,
    threshold: f64,
}

impl FrozenDetector {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            threshold: FROZEN_STD_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Per-row frozen flags for one series
    pub fn flags(&self, values: &[Option<f64>]) -> Vec<bool> {
        let mut window = RollingWindow::new(self.window);
        values
            .iter()
            .map(|value| {
                window.push(*value);
                window.std_dev().is_some_and(|std| std < self.threshold)
            })
            .collect()
    }

    /// Add `<column>_frozen` for one column; a missing column leaves the frame as is
    pub fn detect(&self, frame: &TimeSeriesFrame, column: &str) -> Result<TimeSeriesFrame> {
        let Some(values) = frame.numeric(column) else {
            warn!("Frozen detection skipped: column '{}' not found", column);
            return Ok(frame.clone());
        };

        let flags = self.flags(&values);
        let frozen = flags.iter().filter(|f| **f).count();
        if frozen > 0 {
            debug!("{}: {} of {} rows frozen", column, frozen, flags.len());
        }

        frame.with_column(Column::flag(
            format!("{}{}", column, FROZEN_SUFFIX),
            flags.into_iter().map(Some).collect(),
        ))
    }

    /// Run [`Self::detect`] for each column in turn
    pub fn detect_all(&self, frame: &TimeSeriesFrame, columns: &[String]) -> Result<TimeSeriesFrame> {
        let mut current = frame.clone();
        for column in columns {
            current = self.detect(&current, column)?;
        }
        Ok(current)
    }
}

/// Numeric columns whose name mentions power or temperature
pub fn default_candidates(frame: &TimeSeriesFrame) -> Vec<String> {
    frame
        .columns()
        .iter()
        .filter(|c| matches!(c.column_type(), ColumnType::Float | ColumnType::Integer))
        .map(|c| c.name())
        .filter(|name| !name.ends_with(FROZEN_SUFFIX))
        .filter(|name| {
            let lower = name.to_lowercase();
            FROZEN_CANDIDATE_MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(str::to_string)
        .collect()
}
