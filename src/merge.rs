//! Batch merging: stack reconciled frames into one ordered time series.

use crate::error::{EtlError, Result};
use crate::frame::{Column, TimeSeriesFrame};
use crate::models::ColumnType;
use crate::schema::{SchemaConflict, SchemaReconciler, UnifiedSchema};
use tracing::{debug, info};

/// Merged frame plus reconciliation details
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub frame: TimeSeriesFrame,
    pub schema: UnifiedSchema,
    pub conflicts: Vec<SchemaConflict>,
    /// Rows dropped because an earlier row had the same timestamp
    pub duplicates_removed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchMerger {
    reconciler: SchemaReconciler,
}

impl BatchMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile, stack by column name, sort, dedup and force numeric.
    ///
    /// Frames are taken in input order; on a duplicate timestamp the row
    /// from the earliest frame (then the earliest row within it) is kept.
    /// Null timestamps are never treated as duplicates and sort last.
    pub fn merge(&self, frames: Vec<TimeSeriesFrame>) -> Result<MergeOutcome> {
        if frames.is_empty() {
            return Err(EtlError::NoValidFiles { attempted: 0 });
        }
        if frames.iter().any(|f| f.timestamps().is_none()) {
            return Err(EtlError::NoTimestamp);
        }

        let input_frames = frames.len();
        let reconciled = self.reconciler.reconcile(frames)?;
        let stacked = stack(&reconciled.frames)?;
        let sorted = stacked.sorted_by_timestamp();

        let keep = first_occurrences(sorted.timestamps().unwrap_or_default());
        let duplicates_removed = sorted.len() - keep.len();
        let deduped = if duplicates_removed > 0 {
            sorted.take_rows(&keep)
        } else {
            sorted
        };

        let frame = deduped.map_columns(|c| c.cast(ColumnType::Float));

        if duplicates_removed > 0 {
            debug!("Removed {} duplicate timestamps", duplicates_removed);
        }
        info!(
            "Merged {} frames into {} rows x {} columns",
            input_frames,
            frame.len(),
            frame.columns().len()
        );

        Ok(MergeOutcome {
            frame,
            schema: reconciled.schema,
            conflicts: reconciled.conflicts,
            duplicates_removed,
        })
    }
}

/// Concatenate frames that already share one column set
fn stack(frames: &[TimeSeriesFrame]) -> Result<TimeSeriesFrame> {
    let Some(first) = frames.first() else {
        return Ok(TimeSeriesFrame::empty());
    };

    let total_rows = frames.iter().map(TimeSeriesFrame::len).sum();
    let mut timestamps = Vec::with_capacity(total_rows);
    for frame in frames {
        timestamps.extend_from_slice(frame.timestamps().unwrap_or_default());
    }

    let columns: Vec<Column> = first
        .columns()
        .iter()
        .map(|template| {
            let mut values = template.values().clone();
            for frame in &frames[1..] {
                if let Some(column) = frame.column(template.name()) {
                    values.append(column.values());
                }
            }
            template.with_values(values)
        })
        .collect();

    TimeSeriesFrame::new(timestamps, columns)
}

/// Indices of rows to keep in a timestamp-sorted vector
fn first_occurrences(timestamps: &[Option<chrono::NaiveDateTime>]) -> Vec<usize> {
    let mut keep = Vec::with_capacity(timestamps.len());
    let mut previous = None;
    for (idx, ts) in timestamps.iter().enumerate() {
        match ts {
            Some(t) if previous == Some(*t) => continue,
            Some(t) => {
                previous = Some(*t);
                keep.push(idx);
            }
            None => keep.push(idx),
        }
    }
    keep
}
