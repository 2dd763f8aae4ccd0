//! Schema reconciliation across parsed report frames.
//!
//! Files from the same site rarely agree on columns or types: a sensor may be
//! missing from one export, or arrive as text (`"334.0"`) in another. The
//! reconciler computes one target type per column name and casts/pads every
//! frame to the same column set before they are stacked.

use crate::error::Result;
use crate::frame::{Column, ColumnValues, TimeSeriesFrame};
use crate::models::ColumnType;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// Target type for a column given every type it was observed with.
///
/// Numeric wins over text: any float or integer observation makes the
/// column float64. Text survives only if every frame carries text; any
/// other combination falls back to float64.
pub fn resolve_column_type(observed: &BTreeSet<ColumnType>) -> ColumnType {
    if observed.contains(&ColumnType::Float) || observed.contains(&ColumnType::Integer) {
        ColumnType::Float
    } else if !observed.is_empty() && observed.iter().all(|t| *t == ColumnType::Text) {
        ColumnType::Text
    } else {
        ColumnType::Float
    }
}

/// Ordered column name -> target type mapping shared by all frames
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnifiedSchema {
    columns: Vec<(String, ColumnType)>,
}

impl UnifiedSchema {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(n, t)| (n.as_str(), *t))
    }
}

/// A column seen with more than one type, resolved by the widening rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaConflict {
    pub column: String,
    pub observed: BTreeSet<ColumnType>,
    pub resolved: ColumnType,
    /// Non-null values that became null during the cast
    pub nulled_values: usize,
}

impl fmt::Display for SchemaConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "column '{}' observed as {:?}, resolved to {:?} ({} values nulled)",
            self.column, self.observed, self.resolved, self.nulled_values
        )
    }
}

/// Frames cast to one schema, plus what had to be resolved
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub frames: Vec<TimeSeriesFrame>,
    pub schema: UnifiedSchema,
    pub conflicts: Vec<SchemaConflict>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaReconciler;

impl SchemaReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Collect observed types per column (first appearance order) and resolve them
    pub fn unify(&self, frames: &[TimeSeriesFrame]) -> (UnifiedSchema, Vec<BTreeSet<ColumnType>>) {
        let mut order: Vec<String> = Vec::new();
        let mut observed: HashMap<String, BTreeSet<ColumnType>> = HashMap::new();

        for frame in frames {
            for column in frame.columns().iter() {
                let entry = observed.entry(column.name().to_string()).or_insert_with(|| {
                    order.push(column.name().to_string());
                    BTreeSet::new()
                });
                entry.insert(column.column_type());
            }
        }

        let mut sets = Vec::with_capacity(order.len());
        let columns = order
            .into_iter()
            .map(|name| {
                let types = observed.remove(&name).unwrap_or_default();
                let resolved = resolve_column_type(&types);
                sets.push(types);
                (name, resolved)
            })
            .collect();

        (UnifiedSchema { columns }, sets)
    }

    /// Cast every frame to the unified schema; absent columns become all-null
    pub fn reconcile(&self, frames: Vec<TimeSeriesFrame>) -> Result<Reconciled> {
        let (schema, observed) = self.unify(&frames);
        let mut nulled: HashMap<&str, usize> = HashMap::new();

        let mut reconciled = Vec::with_capacity(frames.len());
        for frame in &frames {
            let mut columns = Vec::with_capacity(schema.len());
            for (name, target) in schema.iter() {
                let column = match frame.column(name) {
                    Some(existing) => {
                        let (values, lost) = existing.values().cast_counting_losses(target);
                        *nulled.entry(name).or_default() += lost;
                        existing.with_values(values)
                    }
                    None => Column::new(name, ColumnValues::nulls(target, frame.len())),
                };
                columns.push(column);
            }
            reconciled.push(frame.with_columns(columns)?);
        }

        let conflicts: Vec<SchemaConflict> = schema
            .iter()
            .zip(observed)
            .filter(|(_, types)| types.len() > 1)
            .map(|((name, resolved), types)| SchemaConflict {
                column: name.to_string(),
                observed: types,
                resolved,
                nulled_values: nulled.get(name).copied().unwrap_or_default(),
            })
            .collect();

        for conflict in &conflicts {
            warn!("Schema conflict: {}", conflict);
        }
        debug!(
            "Reconciled {} frames onto {} columns ({} conflicts)",
            reconciled.len(),
            schema.len(),
            conflicts.len()
        );

        Ok(Reconciled {
            frames: reconciled,
            schema,
            conflicts,
        })
    }
}
