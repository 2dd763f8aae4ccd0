//! Canonical in-memory time series representation.
//!
//! A [`TimeSeriesFrame`] pairs one timestamp vector with a [`ColumnSet`]:
//! an ordered list of named, typed, nullable columns, each carrying the
//! semantic class derived from its name when the column is created. Every
//! stage takes a frame by reference and returns a new one, so earlier
//! stages stay inspectable.

use crate::constants::TIMESTAMP_COLUMN;
use crate::error::{EtlError, Result};
use crate::models::{CellValue, ColumnSemanticClass, ColumnType, parse_numeric};
use chrono::NaiveDateTime;
use polars::prelude::{DataFrame, DataType, IntoColumn, NamedFrom, Series, TimeUnit};
use std::cmp::Ordering;

/// Values of one column, stored by type
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Float(Vec<Option<f64>>),
    Integer(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
    Boolean(Vec<Option<bool>>),
}

impl ColumnValues {
    /// All-null column of the given type
    pub fn nulls(column_type: ColumnType, len: usize) -> Self {
        match column_type {
            ColumnType::Float => ColumnValues::Float(vec![None; len]),
            ColumnType::Integer => ColumnValues::Integer(vec![None; len]),
            ColumnType::Text => ColumnValues::Text(vec![None; len]),
            ColumnType::Boolean => ColumnValues::Boolean(vec![None; len]),
        }
    }

    /// Build a column from parsed cells, inferring its type.
    ///
    /// Any text cell makes the column text; otherwise any float makes it
    /// float; otherwise integers stay integers. All-null columns are float.
    pub fn from_cells(cells: Vec<CellValue>) -> Self {
        let mut has_text = false;
        let mut has_float = false;
        let mut has_integer = false;
        for cell in &cells {
            match cell {
                CellValue::Text(_) => has_text = true,
                CellValue::Number(_) => has_float = true,
                CellValue::Integer(_) => has_integer = true,
                CellValue::Null => {}
            }
        }

        if has_text {
            ColumnValues::Text(
                cells
                    .into_iter()
                    .map(|cell| match cell {
                        CellValue::Null => None,
                        CellValue::Integer(v) => Some(v.to_string()),
                        CellValue::Number(v) => Some(v.to_string()),
                        CellValue::Text(s) => Some(s),
                    })
                    .collect(),
            )
        } else if has_float || !has_integer {
            ColumnValues::Float(
                cells
                    .into_iter()
                    .map(|cell| match cell {
                        CellValue::Integer(v) => Some(v as f64),
                        CellValue::Number(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            )
        } else {
            ColumnValues::Integer(
                cells
                    .into_iter()
                    .map(|cell| match cell {
                        CellValue::Integer(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            )
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Integer(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValues::Float(_) => ColumnType::Float,
            ColumnValues::Integer(_) => ColumnType::Integer,
            ColumnValues::Text(_) => ColumnType::Text,
            ColumnValues::Boolean(_) => ColumnType::Boolean,
        }
    }

    /// Number of non-null values
    pub fn non_null_count(&self) -> usize {
        match self {
            ColumnValues::Float(v) => v.iter().filter(|x| x.is_some()).count(),
            ColumnValues::Integer(v) => v.iter().filter(|x| x.is_some()).count(),
            ColumnValues::Text(v) => v.iter().filter(|x| x.is_some()).count(),
            ColumnValues::Boolean(v) => v.iter().filter(|x| x.is_some()).count(),
        }
    }

    /// Lossy cast to another type; values that cannot be represented become null
    pub fn cast(&self, target: ColumnType) -> ColumnValues {
        match target {
            ColumnType::Float => ColumnValues::Float(self.to_f64()),
            ColumnType::Integer => ColumnValues::Integer(match self {
                ColumnValues::Integer(v) => v.clone(),
                ColumnValues::Float(v) => v.iter().map(|x| x.and_then(float_to_integer)).collect(),
                ColumnValues::Text(v) => v
                    .iter()
                    .map(|x| x.as_deref().and_then(parse_numeric).and_then(float_to_integer))
                    .collect(),
                ColumnValues::Boolean(v) => v.iter().map(|x| x.map(i64::from)).collect(),
            }),
            ColumnType::Text => ColumnValues::Text(match self {
                ColumnValues::Text(v) => v.clone(),
                ColumnValues::Float(v) => v.iter().map(|x| x.map(|f| f.to_string())).collect(),
                ColumnValues::Integer(v) => v.iter().map(|x| x.map(|i| i.to_string())).collect(),
                ColumnValues::Boolean(v) => v.iter().map(|x| x.map(|b| b.to_string())).collect(),
            }),
            ColumnType::Boolean => ColumnValues::Boolean(match self {
                ColumnValues::Boolean(v) => v.clone(),
                ColumnValues::Float(v) => v.iter().map(|x| x.map(|f| f != 0.0)).collect(),
                ColumnValues::Integer(v) => v.iter().map(|x| x.map(|i| i != 0)).collect(),
                ColumnValues::Text(v) => v
                    .iter()
                    .map(|x| x.as_deref().and_then(parse_bool))
                    .collect(),
            }),
        }
    }

    /// Cast and count the non-null values that were lost on the way
    pub fn cast_counting_losses(&self, target: ColumnType) -> (ColumnValues, usize) {
        let cast = self.cast(target);
        let lost = self.non_null_count().saturating_sub(cast.non_null_count());
        (cast, lost)
    }

    /// Numeric view of the column
    pub fn to_f64(&self) -> Vec<Option<f64>> {
        match self {
            ColumnValues::Float(v) => v.clone(),
            ColumnValues::Integer(v) => v.iter().map(|x| x.map(|i| i as f64)).collect(),
            ColumnValues::Text(v) => v.iter().map(|x| x.as_deref().and_then(parse_numeric)).collect(),
            ColumnValues::Boolean(v) => v
                .iter()
                .map(|x| x.map(|b| if b { 1.0 } else { 0.0 }))
                .collect(),
        }
    }

    /// Append another column's values, casting them to this column's type
    pub fn append(&mut self, other: &ColumnValues) {
        match self {
            ColumnValues::Float(a) => a.extend(other.to_f64()),
            ColumnValues::Integer(a) => {
                if let ColumnValues::Integer(b) = other.cast(ColumnType::Integer) {
                    a.extend(b);
                }
            }
            ColumnValues::Text(a) => {
                if let ColumnValues::Text(b) = other.cast(ColumnType::Text) {
                    a.extend(b);
                }
            }
            ColumnValues::Boolean(a) => {
                if let ColumnValues::Boolean(b) = other.cast(ColumnType::Boolean) {
                    a.extend(b);
                }
            }
        }
    }

    /// Pad with nulls up to `len` rows
    pub fn pad_to(&mut self, len: usize) {
        match self {
            ColumnValues::Float(v) => v.resize(len.max(v.len()), None),
            ColumnValues::Integer(v) => v.resize(len.max(v.len()), None),
            ColumnValues::Text(v) => v.resize(len.max(v.len()), None),
            ColumnValues::Boolean(v) => v.resize(len.max(v.len()), None),
        }
    }

    /// Rows at the given indices, in order
    pub fn take(&self, indices: &[usize]) -> ColumnValues {
        match self {
            ColumnValues::Float(v) => ColumnValues::Float(indices.iter().map(|&i| v[i]).collect()),
            ColumnValues::Integer(v) => {
                ColumnValues::Integer(indices.iter().map(|&i| v[i]).collect())
            }
            ColumnValues::Text(v) => {
                ColumnValues::Text(indices.iter().map(|&i| v[i].clone()).collect())
            }
            ColumnValues::Boolean(v) => {
                ColumnValues::Boolean(indices.iter().map(|&i| v[i]).collect())
            }
        }
    }
}

fn float_to_integer(value: f64) -> Option<i64> {
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" => Some(true),
        "false" | "off" => Some(false),
        other => parse_numeric(other).map(|v| v != 0.0),
    }
}

/// A named column with its semantic class
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    class: ColumnSemanticClass,
    values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        let name = name.into();
        let class = ColumnSemanticClass::classify(&name);
        Self {
            name,
            class,
            values,
        }
    }

    pub fn float(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnValues::Float(values))
    }

    /// Boolean validation flag column
    pub fn flag(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        Self::new(name, ColumnValues::Boolean(values))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> ColumnSemanticClass {
        self.class
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn column_type(&self) -> ColumnType {
        self.values.column_type()
    }

    pub fn is_flag(&self) -> bool {
        matches!(self.values, ColumnValues::Boolean(_))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_f64(&self) -> Vec<Option<f64>> {
        self.values.to_f64()
    }

    /// Same column with values cast to `target`
    pub fn cast(&self, target: ColumnType) -> Column {
        Column {
            name: self.name.clone(),
            class: self.class,
            values: self.values.cast(target),
        }
    }

    pub(crate) fn with_values(&self, values: ColumnValues) -> Column {
        Column {
            name: self.name.clone(),
            class: self.class,
            values,
        }
    }

    pub(crate) fn values_mut(&mut self) -> &mut ColumnValues {
        &mut self.values
    }
}

/// Ordered set of uniquely named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSet {
    columns: Vec<Column>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Insert a column, replacing an existing column of the same name in place
    pub fn insert(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        let index = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(index))
    }
}

impl IntoIterator for ColumnSet {
    type Item = Column;
    type IntoIter = std::vec::IntoIter<Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl FromIterator<Column> for ColumnSet {
    fn from_iter<T: IntoIterator<Item = Column>>(iter: T) -> Self {
        let mut set = ColumnSet::new();
        for column in iter {
            set.insert(column);
        }
        set
    }
}

/// Timestamp vector plus columns of equal length
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFrame {
    timestamps: Option<Vec<Option<NaiveDateTime>>>,
    columns: ColumnSet,
    rows: usize,
}

impl TimeSeriesFrame {
    /// Create a frame; shorter columns are null-padded to the timestamp length
    pub fn new(timestamps: Vec<Option<NaiveDateTime>>, columns: Vec<Column>) -> Result<Self> {
        let rows = timestamps.len();
        let mut set = ColumnSet::new();
        for mut column in columns {
            if column.len() > rows {
                return Err(EtlError::Configuration {
                    message: format!(
                        "column '{}' has {} rows but the frame has {} timestamps",
                        column.name(),
                        column.len(),
                        rows
                    ),
                });
            }
            column.values_mut().pad_to(rows);
            set.insert(column);
        }
        Ok(Self {
            timestamps: Some(timestamps),
            columns: set,
            rows,
        })
    }

    /// Frame with no timestamp column, e.g. assembled by an external caller
    pub fn untimed(columns: Vec<Column>) -> Self {
        let rows = columns.iter().map(Column::len).max().unwrap_or(0);
        let set = columns
            .into_iter()
            .map(|mut column| {
                column.values_mut().pad_to(rows);
                column
            })
            .collect();
        Self {
            timestamps: None,
            columns: set,
            rows,
        }
    }

    pub fn empty() -> Self {
        Self {
            timestamps: Some(Vec::new()),
            columns: ColumnSet::new(),
            rows: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn timestamps(&self) -> Option<&[Option<NaiveDateTime>]> {
        self.timestamps.as_deref()
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.names()
    }

    /// Numeric view of a column, if present
    pub fn numeric(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name).map(Column::to_f64)
    }

    /// Copy of this frame with `column` added or replaced
    pub fn with_column(&self, column: Column) -> Result<Self> {
        if column.len() != self.rows {
            return Err(EtlError::Configuration {
                message: format!(
                    "column '{}' has {} rows, frame has {}",
                    column.name(),
                    column.len(),
                    self.rows
                ),
            });
        }
        let mut frame = self.clone();
        frame.columns.insert(column);
        Ok(frame)
    }

    /// Same timestamps with an entirely new column list
    pub fn with_columns(&self, columns: Vec<Column>) -> Result<Self> {
        if let Some(bad) = columns.iter().find(|c| c.len() != self.rows) {
            return Err(EtlError::Configuration {
                message: format!(
                    "column '{}' has {} rows, frame has {}",
                    bad.name(),
                    bad.len(),
                    self.rows
                ),
            });
        }
        Ok(Self {
            timestamps: self.timestamps.clone(),
            columns: columns.into_iter().collect(),
            rows: self.rows,
        })
    }

    /// Copy of this frame with every column mapped through `f`
    pub fn map_columns<F>(&self, f: F) -> Self
    where
        F: Fn(&Column) -> Column,
    {
        Self {
            timestamps: self.timestamps.clone(),
            columns: self.columns.iter().map(f).collect(),
            rows: self.rows,
        }
    }

    /// Rows at the given indices, in order
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            timestamps: self
                .timestamps
                .as_ref()
                .map(|ts| indices.iter().map(|&i| ts[i]).collect()),
            columns: self
                .columns
                .iter()
                .map(|c| c.with_values(c.values().take(indices)))
                .collect(),
            rows: indices.len(),
        }
    }

    /// Stable ascending sort by timestamp; null timestamps go last
    pub fn sorted_by_timestamp(&self) -> Self {
        let Some(timestamps) = &self.timestamps else {
            return self.clone();
        };
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.sort_by(|&a, &b| compare_timestamps(timestamps[a], timestamps[b]));
        if order.iter().enumerate().all(|(pos, &idx)| pos == idx) {
            return self.clone();
        }
        self.take_rows(&order)
    }

    /// Convert into a polars `DataFrame` (`timestamp` as millisecond datetime)
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut series = Vec::with_capacity(self.columns.len() + 1);

        if let Some(timestamps) = &self.timestamps {
            let millis: Vec<Option<i64>> = timestamps
                .iter()
                .map(|ts| ts.map(|t| t.and_utc().timestamp_millis()))
                .collect();
            let ts = Series::new(TIMESTAMP_COLUMN.into(), millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            series.push(ts.into_column());
        }

        for column in self.columns.iter() {
            let name = column.name().into();
            let s = match column.values() {
                ColumnValues::Float(v) => Series::new(name, v.clone()),
                ColumnValues::Integer(v) => Series::new(name, v.clone()),
                ColumnValues::Text(v) => Series::new(name, v.clone()),
                ColumnValues::Boolean(v) => Series::new(name, v.clone()),
            };
            series.push(s.into_column());
        }

        Ok(DataFrame::new(series)?)
    }
}

/// Ascending order with nulls last
pub(crate) fn compare_timestamps(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
