//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of FileFlow.
//! The FileFlow project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! you may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # FileFlow Record Module
//!
//! Rows are the unit of data moved between endpoints. A [`FlowRow`] maps
//! column names to [`FlowValue`]s; all rows produced by one read share the
//! same key set (the projection of that read).
//!
//! ## Canonical Text
//!
//! Every value has a canonical text form used by the delimited codec:
//!
//! - integers in plain decimal
//! - floats in shortest round-trip form, always with a `.` or an exponent
//! - dates as ISO-8601 `YYYY-MM-DD`
//! - null as the empty string
//!
//! Parsing the canonical text with the value's column type gives back the
//! same value.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::schema::{FlowColumnType, FlowProjection};

/// ISO-8601 calendar date format used for canonical dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum FlowValue {
    Null,
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    String(String),
}

impl FlowValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FlowValue::Null)
    }

    /// Canonical text representation.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FlowValue::Null => Cow::Borrowed(""),
            FlowValue::Integer(v) => Cow::Owned(v.to_string()),
            FlowValue::Float(v) => Cow::Owned(canonical_float(*v)),
            FlowValue::Date(d) => Cow::Owned(d.format(DATE_FORMAT).to_string()),
            FlowValue::String(s) => Cow::Borrowed(s.as_str()),
        }
    }

    /// Parses delimited text according to a column type.
    ///
    /// Empty text is null for typed columns. Text that does not parse as the
    /// requested type is kept as a string so no input is lost.
    pub fn from_text(text: &str, column_type: FlowColumnType) -> Self {
        match column_type {
            FlowColumnType::String | FlowColumnType::Unknown => FlowValue::String(text.to_string()),
            _ if text.is_empty() => FlowValue::Null,
            FlowColumnType::Integer => text
                .parse::<i64>()
                .map(FlowValue::Integer)
                .unwrap_or_else(|_| FlowValue::String(text.to_string())),
            FlowColumnType::Float => text
                .parse::<f64>()
                .map(FlowValue::Float)
                .unwrap_or_else(|_| FlowValue::String(text.to_string())),
            FlowColumnType::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
                .map(FlowValue::Date)
                .unwrap_or_else(|_| FlowValue::String(text.to_string())),
        }
    }

    /// Type of this value, `Unknown` for null.
    pub fn column_type(&self) -> FlowColumnType {
        match self {
            FlowValue::Null => FlowColumnType::Unknown,
            FlowValue::Integer(_) => FlowColumnType::Integer,
            FlowValue::Float(_) => FlowColumnType::Float,
            FlowValue::Date(_) => FlowColumnType::Date,
            FlowValue::String(_) => FlowColumnType::String,
        }
    }
}

impl fmt::Display for FlowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl Serialize for FlowValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FlowValue::Null => serializer.serialize_none(),
            FlowValue::Integer(v) => serializer.serialize_i64(*v),
            FlowValue::Float(v) => serializer.serialize_f64(*v),
            FlowValue::Date(_) => serializer.serialize_str(&self.as_text()),
            FlowValue::String(s) => serializer.serialize_str(s),
        }
    }
}

impl From<i64> for FlowValue {
    fn from(v: i64) -> Self {
        FlowValue::Integer(v)
    }
}

impl From<f64> for FlowValue {
    fn from(v: f64) -> Self {
        FlowValue::Float(v)
    }
}

impl From<NaiveDate> for FlowValue {
    fn from(v: NaiveDate) -> Self {
        FlowValue::Date(v)
    }
}

impl From<&str> for FlowValue {
    fn from(v: &str) -> Self {
        FlowValue::String(v.to_string())
    }
}

impl From<String> for FlowValue {
    fn from(v: String) -> Self {
        FlowValue::String(v)
    }
}

impl<T: Into<FlowValue>> From<Option<T>> for FlowValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FlowValue::Null)
    }
}

/// Shortest round-trip form that still reads back as a float.
pub fn canonical_float(v: f64) -> String {
    let text = format!("{v:?}");
    if text.contains(['.', 'e', 'E']) || !v.is_finite() {
        text
    } else {
        format!("{text}.0")
    }
}

/// Mapping from column name to value.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlowRow {
    values: BTreeMap<String, FlowValue>,
}

impl FlowRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FlowValue>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FlowValue>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FlowValue> {
        self.values.get(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlowValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Restricts the row to the projected columns; absent columns become null.
    pub fn project(mut self, projection: &FlowProjection) -> FlowRow {
        let mut values = BTreeMap::new();
        for column in projection.columns() {
            let value = self.values.remove(column).unwrap_or(FlowValue::Null);
            values.insert(column.clone(), value);
        }
        FlowRow { values }
    }

    /// Values in the given column order, null for absent columns.
    pub fn values_in<'a>(&'a self, columns: &'a [String]) -> impl Iterator<Item = &'a FlowValue> + 'a {
        const NULL: &FlowValue = &FlowValue::Null;
        columns.iter().map(|c| self.values.get(c).unwrap_or(NULL))
    }
}

impl FromIterator<(String, FlowValue)> for FlowRow {
    fn from_iter<I: IntoIterator<Item = (String, FlowValue)>>(iter: I) -> Self {
        FlowRow {
            values: iter.into_iter().collect(),
        }
    }
}

/// Convenience alias for a chunk of rows.
pub type FlowRowBatch = Vec<FlowRow>;
