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

//! # FileFlow Error Module
//!
//! This module defines the error taxonomy shared by every FileFlow component.
//! Each variant corresponds to one failure class the transfer engine has to
//! report to its observers, so a failed job always carries exactly one
//! classified error.
//!
//! ## Error Categories
//!
//! - **Validation**: Bad or missing configuration, caught before any I/O
//! - **Connection**: Store unreachable or credential rejected
//! - **Format**: Unparseable delimited header or malformed payload
//! - **SchemaMismatch**: Destination table shape conflicts with the incoming rows
//! - **Io**: Read or write failure in the middle of a stream
//! - **Cancelled**: The caller asked the engine to stop
//! - **Serde**: Configuration or payload (de)serialization failures
//! - **Internal**: Unexpected internal failures
//!
//! ## Usage
//!
//! ```rust
//! use fileflow::errors::{FlowError, Result};
//!
//! fn check_table(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(FlowError::validation("destination table name is required"));
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type used throughout FileFlow.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Canonical error enumeration for FileFlow.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum FlowError {
    /// Invalid parameters or incomplete configuration.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The store could not be reached or refused the credential.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Delimited input that cannot produce a header.
    #[error("format error: {message}")]
    Format { message: String },

    /// An existing destination table has a different shape.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Errors originating from file or network streams.
    #[error("io error: {0}")]
    Io(String),

    /// The caller cancelled the running transfer.
    #[error("cancelled: {message}")]
    Cancelled { message: String },

    /// Wrapper for serde-style serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Catch-all variant for unexpected situations.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`FlowError`], stable across messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowErrorKind {
    Validation,
    Connection,
    Format,
    SchemaMismatch,
    Io,
    Cancelled,
    Internal,
}

impl FlowErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowErrorKind::Validation => "validation",
            FlowErrorKind::Connection => "connection",
            FlowErrorKind::Format => "format",
            FlowErrorKind::SchemaMismatch => "schema_mismatch",
            FlowErrorKind::Io => "io",
            FlowErrorKind::Cancelled => "cancelled",
            FlowErrorKind::Internal => "internal",
        }
    }
}

impl From<io::Error> for FlowError {
    fn from(err: io::Error) -> Self {
        FlowError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for FlowError {
    fn from(err: serde_yaml::Error) -> Self {
        FlowError::Serde(err.to_string())
    }
}

impl From<csv::Error> for FlowError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            FlowError::Io(format!("csv error: {err}"))
        } else {
            FlowError::format(format!("csv error: {err}"))
        }
    }
}

impl From<arrow2::error::Error> for FlowError {
    fn from(err: arrow2::error::Error) -> Self {
        FlowError::Internal(format!("arrow error: {err}"))
    }
}

#[cfg(feature = "clickhouse")]
impl From<reqwest::Error> for FlowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            FlowError::connection(format!("store request failed: {err}"))
        } else {
            FlowError::Io(format!("store request failed: {err}"))
        }
    }
}

impl FlowError {
    /// Helper to construct simple validation errors.
    pub fn validation<T: Into<String>>(message: T) -> Self {
        FlowError::Validation {
            message: message.into(),
        }
    }

    /// Helper to construct connection errors.
    pub fn connection<T: Into<String>>(message: T) -> Self {
        FlowError::Connection {
            message: message.into(),
        }
    }

    /// Helper to construct format errors.
    pub fn format<T: Into<String>>(message: T) -> Self {
        FlowError::Format {
            message: message.into(),
        }
    }

    /// Helper to construct schema mismatch errors.
    pub fn schema_mismatch<T: Into<String>>(message: T) -> Self {
        FlowError::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Helper to construct io errors from a message.
    pub fn io<T: Into<String>>(message: T) -> Self {
        FlowError::Io(message.into())
    }

    /// Helper to construct cancellation errors.
    pub fn cancelled<T: Into<String>>(message: T) -> Self {
        FlowError::Cancelled {
            message: message.into(),
        }
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        FlowError::Internal(message.into())
    }

    /// Returns the failure class of this error.
    pub fn kind(&self) -> FlowErrorKind {
        match self {
            FlowError::Validation { .. } => FlowErrorKind::Validation,
            FlowError::Connection { .. } => FlowErrorKind::Connection,
            FlowError::Format { .. } | FlowError::Serde(_) => FlowErrorKind::Format,
            FlowError::SchemaMismatch { .. } => FlowErrorKind::SchemaMismatch,
            FlowError::Io(_) => FlowErrorKind::Io,
            FlowError::Cancelled { .. } => FlowErrorKind::Cancelled,
            FlowError::Internal(_) => FlowErrorKind::Internal,
        }
    }

    /// Message without the category prefix, suitable for status lines.
    pub fn reason(&self) -> &str {
        match self {
            FlowError::Validation { message }
            | FlowError::Connection { message }
            | FlowError::Format { message }
            | FlowError::SchemaMismatch { message }
            | FlowError::Cancelled { message } => message,
            FlowError::Io(message) | FlowError::Serde(message) | FlowError::Internal(message) => {
                message
            }
        }
    }
}
