//! Fixed-interval resampling with per-class aggregation.
//!
//! Buckets are left-closed, `interval` wide and anchored at the first valid
//! timestamp of the series. Each column is aggregated according to its
//! semantic class: cumulative counters keep their last reading, status
//! flags keep their maximum and instantaneous readings are averaged. Empty
//! buckets are not synthesized.

use crate::error::{EtlError, Result};
use crate::frame::{Column, ColumnValues, TimeSeriesFrame};
use crate::models::ColumnSemanticClass;
use chrono::{Duration, NaiveDateTime};
use std::ops::Range;
use tracing::{debug, info, warn};

/// Parse an interval string such as `30s`, `5m`, `1h` or `1d`
pub fn parse_interval(interval: &str) -> Result<Duration> {
    let invalid = |reason: &str| EtlError::InvalidInterval {
        interval: interval.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = interval.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| invalid("missing unit (expected s, m, h or d)"))?;
    let (amount, unit) = trimmed.split_at(split);

    let amount: i64 = amount
        .parse()
        .map_err(|_| invalid("missing or invalid amount"))?;
    if amount <= 0 {
        return Err(invalid("interval must be positive"));
    }

    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => return Err(invalid("unknown unit (expected s, m, h or d)")),
    };
    duration.ok_or_else(|| invalid("interval out of range"))
}

/// Resampled frame plus the number of rows dropped for a null timestamp
#[derive(Debug, Clone)]
pub struct Resampled {
    pub frame: TimeSeriesFrame,
    pub dropped_rows: usize,
}

#[derive(Debug, Clone)]
pub struct Resampler {
    interval: Duration,
}

impl Resampler {
    pub fn new(interval: Duration) -> Result<Self> {
        if interval.num_milliseconds() <= 0 {
            return Err(EtlError::InvalidInterval {
                interval: interval.to_string(),
                reason: "interval must be positive".to_string(),
            });
        }
        Ok(Self { interval })
    }

    pub fn parse(interval: &str) -> Result<Self> {
        Self::new(parse_interval(interval)?)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn resample(&self, frame: &TimeSeriesFrame) -> Result<Resampled> {
        let timestamps = frame.timestamps().ok_or(EtlError::NoTimestamp)?;
        if frame.is_empty() {
            return Ok(Resampled {
                frame: frame.clone(),
                dropped_rows: 0,
            });
        }

        let valid: Vec<usize> = (0..timestamps.len())
            .filter(|&i| timestamps[i].is_some())
            .collect();
        let dropped_rows = timestamps.len() - valid.len();
        if valid.is_empty() {
            return Err(EtlError::EmptyAfterFilter {
                dropped: dropped_rows,
            });
        }
        if dropped_rows > 0 {
            warn!("Dropped {} rows with null timestamps before resampling", dropped_rows);
        }

        let sorted = frame.take_rows(&valid).sorted_by_timestamp();
        let times: Vec<NaiveDateTime> = sorted
            .timestamps()
            .unwrap_or_default()
            .iter()
            .flatten()
            .copied()
            .collect();

        let (starts, ranges) = self.buckets(&times);
        log_class_summary(&sorted);

        let columns: Vec<Column> = sorted
            .columns()
            .iter()
            .map(|column| aggregate_column(column, &ranges))
            .collect();

        let resampled = TimeSeriesFrame::new(starts.into_iter().map(Some).collect(), columns)?;
        info!(
            "Resampled from {} to {} rows (interval {})",
            frame.len(),
            resampled.len(),
            self.interval
        );

        Ok(Resampled {
            frame: resampled,
            dropped_rows,
        })
    }

    /// Bucket start times and row ranges for a sorted, null-free timeline
    fn buckets(&self, times: &[NaiveDateTime]) -> (Vec<NaiveDateTime>, Vec<Range<usize>>) {
        let Some(&origin) = times.first() else {
            return (Vec::new(), Vec::new());
        };
        let width = self.interval.num_milliseconds();

        let mut starts = Vec::new();
        let mut ranges: Vec<Range<usize>> = Vec::new();
        let mut current: Option<i64> = None;

        for (idx, t) in times.iter().enumerate() {
            let bucket = (*t - origin).num_milliseconds() / width;
            if current == Some(bucket) {
                if let Some(range) = ranges.last_mut() {
                    range.end = idx + 1;
                }
            } else {
                current = Some(bucket);
                starts.push(origin + Duration::milliseconds(bucket * width));
                ranges.push(idx..idx + 1);
            }
        }

        (starts, ranges)
    }
}

/// Aggregation rule applied to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregation {
    Last,
    Max,
    Mean,
}

impl Aggregation {
    fn for_column(column: &Column) -> Self {
        if column.is_flag() {
            return Aggregation::Max;
        }
        match column.class() {
            ColumnSemanticClass::Cumulative => Aggregation::Last,
            ColumnSemanticClass::Status => Aggregation::Max,
            ColumnSemanticClass::Instantaneous => Aggregation::Mean,
        }
    }
}

fn aggregate_column(column: &Column, ranges: &[Range<usize>]) -> Column {
    let rule = Aggregation::for_column(column);
    let values = match column.values() {
        ColumnValues::Boolean(v) => ColumnValues::Boolean(
            ranges
                .iter()
                .map(|r| v[r.clone()].iter().flatten().copied().reduce(|a, b| a || b))
                .collect(),
        ),
        // text has no numeric aggregate; keep the latest reading
        ColumnValues::Text(v) => ColumnValues::Text(
            ranges
                .iter()
                .map(|r| v[r.clone()].iter().rev().flatten().next().cloned())
                .collect(),
        ),
        numeric => {
            let series = numeric.to_f64();
            ColumnValues::Float(
                ranges
                    .iter()
                    .map(|r| aggregate(&series[r.clone()], rule))
                    .collect(),
            )
        }
    };
    column.with_values(values)
}

fn aggregate(values: &[Option<f64>], rule: Aggregation) -> Option<f64> {
    let present = values.iter().flatten().copied();
    match rule {
        Aggregation::Last => values.iter().rev().flatten().next().copied(),
        Aggregation::Max => present.reduce(f64::max),
        Aggregation::Mean => {
            let (sum, count) = present.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            (count > 0).then(|| sum / count as f64)
        }
    }
}

fn log_class_summary(frame: &TimeSeriesFrame) {
    let mut last = 0;
    let mut max = 0;
    let mut mean = 0;
    for column in frame.columns().iter() {
        match Aggregation::for_column(column) {
            Aggregation::Last => last += 1,
            Aggregation::Max => max += 1,
            Aggregation::Mean => mean += 1,
        }
    }
    debug!(
        "Aggregation plan: {} cumulative (last), {} status (max), {} instantaneous (mean)",
        last, max, mean
    );
}
