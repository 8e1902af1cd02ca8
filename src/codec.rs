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

//! # FileFlow Delimited Codec
//!
//! Parses and serializes the flat delimited format using the `csv` crate.
//!
//! ## Parsing
//!
//! - Blank lines are discarded; the first non-blank line is the header.
//! - Fields are trimmed and unwrapped from one layer of double quotes.
//! - Short lines yield empty values, extra fields are ignored.
//! - Empty header names become `column_<n>` and repeated names get a
//!   `_<k>` suffix, so the column count always equals the header width.
//! - Blankness is judged on the raw line: a line of whitespace is skipped,
//!   while a quoted empty field (`""`) is a row with one empty value.
//!
//! ## Serialization
//!
//! Fields are quoted only when they contain the delimiter, a double quote or
//! a line break; embedded quotes are doubled.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::io::{Cursor, Read};

use csv::{QuoteStyle, ReaderBuilder, StringRecord, StringRecordsIntoIter, Terminator, Trim, WriterBuilder};

use crate::endpoint::FlowFileEndpoint;
use crate::errors::{FlowError, Result};
use crate::record::{FlowRow, FlowValue};
use crate::schema::{FlowColumn, FlowColumnType, FlowSchema};

/// Delimited text codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowDelimitedCodec {
    delimiter: u8,
    has_header: bool,
}

impl Default for FlowDelimitedCodec {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
        }
    }
}

impl FlowDelimitedCodec {
    pub fn new(delimiter: u8, has_header: bool) -> Self {
        Self {
            delimiter,
            has_header,
        }
    }

    /// Codec matching a file endpoint's delimiter and header settings.
    pub fn for_file(file: &FlowFileEndpoint) -> Result<Self> {
        Ok(Self::new(file.delimiter_byte()?, file.has_header))
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    /// Parses in-memory text.
    pub fn parse(&self, text: &str) -> Result<(FlowSchema, FlowCsvRows<Cursor<Vec<u8>>>)> {
        self.parse_reader(Cursor::new(text.as_bytes().to_vec()))
    }

    /// Reads the header from `reader` and returns the remaining rows lazily.
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<(FlowSchema, FlowCsvRows<R>)> {
        let mut records = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(Trim::None)
            .from_reader(reader)
            .into_records();

        let first = loop {
            match records.next() {
                Some(record) => {
                    let mut record = record?;
                    if !is_blank(&record) {
                        record.trim();
                        break record;
                    }
                }
                None => return Err(FlowError::format("input is empty: no header line found")),
            }
        };

        let (names, pending) = if self.has_header {
            (header_names(&first)?, None)
        } else {
            let names = (1..=first.len()).map(|n| format!("column_{n}")).collect();
            (names, Some(first))
        };

        let schema = FlowSchema::new(
            names
                .iter()
                .map(|name| FlowColumn::new(name.clone(), FlowColumnType::Unknown))
                .collect(),
        )?;

        let rows = FlowCsvRows {
            records,
            columns: names,
            types: None,
            pending,
        };
        Ok((schema, rows))
    }

    fn line_writer(&self) -> csv::Writer<Vec<u8>> {
        WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new())
    }

    fn finish_writer(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
        writer
            .into_inner()
            .map_err(|err| FlowError::io(format!("csv writer failed: {}", err.error())))
    }

    /// Header line bytes, newline terminated.
    pub fn encode_header(&self, columns: &[String]) -> Result<Vec<u8>> {
        let mut writer = self.line_writer();
        writer.write_record(columns)?;
        Self::finish_writer(writer)
    }

    /// Bytes for a whole chunk, one newline-terminated line per row.
    pub fn encode_rows<T: Borrow<FlowRow>>(&self, columns: &[String], rows: &[T]) -> Result<Vec<u8>> {
        let mut writer = self.line_writer();
        for row in rows {
            writer.write_record(row.borrow().values_in(columns).map(|v| v.as_text().into_owned()))?;
        }
        Self::finish_writer(writer)
    }

    /// Lazily serializes rows into text lines, starting with the header.
    pub fn serialize_lines<I>(&self, columns: Vec<String>, rows: I) -> FlowCsvLines<I::IntoIter>
    where
        I: IntoIterator,
        I::Item: Borrow<FlowRow>,
    {
        FlowCsvLines {
            codec: *self,
            columns,
            rows: rows.into_iter(),
            header_pending: self.has_header,
        }
    }

    fn encode_line(&self, bytes: Vec<u8>) -> Result<String> {
        let mut text =
            String::from_utf8(bytes).map_err(|err| FlowError::internal(format!("non utf-8 output: {err}")))?;
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }
}

/// Called on untrimmed records. The reader already drops empty lines, and a
/// lone `""` field comes back empty rather than as whitespace, so only
/// whitespace-only lines land here.
fn is_blank(record: &StringRecord) -> bool {
    match record.len() {
        0 => true,
        1 => record
            .get(0)
            .map_or(true, |field| !field.is_empty() && field.trim().is_empty()),
        _ => false,
    }
}

fn header_names(record: &StringRecord) -> Result<Vec<String>> {
    if record.iter().all(str::is_empty) {
        return Err(FlowError::format("header line has no column names"));
    }

    let mut used = HashSet::new();
    let mut names = Vec::with_capacity(record.len());
    for (index, token) in record.iter().enumerate() {
        let base = if token.is_empty() {
            format!("column_{}", index + 1)
        } else {
            token.to_string()
        };
        let mut name = base.clone();
        let mut suffix = 2;
        while used.contains(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        used.insert(name.clone());
        names.push(name);
    }
    Ok(names)
}

/// Lazy iterator over parsed data rows.
pub struct FlowCsvRows<R> {
    records: StringRecordsIntoIter<R>,
    columns: Vec<String>,
    types: Option<Vec<FlowColumnType>>,
    pending: Option<StringRecord>,
}

impl<R: Read> FlowCsvRows<R> {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Coerces fields to the schema's inferred types instead of plain strings.
    pub fn with_types(mut self, schema: &FlowSchema) -> Self {
        self.types = Some(self.columns.iter().map(|c| schema.type_of(c)).collect());
        self
    }

    fn to_row(&self, record: &StringRecord) -> FlowRow {
        self.columns
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let text = record.get(index).unwrap_or("");
                let column_type = self
                    .types
                    .as_ref()
                    .and_then(|types| types.get(index).copied())
                    .unwrap_or(FlowColumnType::String);
                (name.clone(), FlowValue::from_text(text, column_type))
            })
            .collect()
    }
}

impl<R: Read> Iterator for FlowCsvRows<R> {
    type Item = Result<FlowRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.pending.take() {
            return Some(Ok(self.to_row(&record)));
        }
        loop {
            match self.records.next()? {
                Ok(record) if is_blank(&record) => continue,
                Ok(mut record) => {
                    record.trim();
                    return Some(Ok(self.to_row(&record)));
                }
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

/// Lazy iterator over serialized text lines.
pub struct FlowCsvLines<I> {
    codec: FlowDelimitedCodec,
    columns: Vec<String>,
    rows: I,
    header_pending: bool,
}

impl<I> Iterator for FlowCsvLines<I>
where
    I: Iterator,
    I::Item: Borrow<FlowRow>,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.header_pending {
            self.header_pending = false;
            return Some(
                self.codec
                    .encode_header(&self.columns)
                    .and_then(|bytes| self.codec.encode_line(bytes)),
            );
        }
        let row = self.rows.next()?;
        Some(
            self.codec
                .encode_rows(&self.columns, std::slice::from_ref(row.borrow()))
                .and_then(|bytes| self.codec.encode_line(bytes)),
        )
    }
}
