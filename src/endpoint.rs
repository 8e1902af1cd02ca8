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

//! # FileFlow Endpoint Module
//!
//! Concrete sources and destinations of row data: a delimited file (on disk
//! or in memory), a store table, or a raw store query.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::{FlowError, Result};

/// In-memory byte stream shared between a caller and a file endpoint.
#[derive(Clone, Debug, Default)]
pub struct FlowSharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl FlowSharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes.into())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Identity of the underlying allocation, stable across clones.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.bytes) as *const () as usize
    }
}

impl PartialEq for FlowSharedBuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

struct FlowBufferWriter(FlowSharedBuffer);

impl Write for FlowBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where the bytes of a file endpoint live.
#[derive(Clone, Debug, PartialEq)]
pub enum FlowFileHandle {
    Path(PathBuf),
    Buffer(FlowSharedBuffer),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlowCompression {
    None,
    Gzip,
    Zstd,
}

impl FlowCompression {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => FlowCompression::Gzip,
            Some(ext) if ext.eq_ignore_ascii_case("zst") => FlowCompression::Zstd,
            _ => FlowCompression::None,
        }
    }
}

impl FlowFileHandle {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        FlowFileHandle::Path(path.into())
    }

    /// Display name of the handle, empty when no path was chosen.
    pub fn name(&self) -> String {
        match self {
            FlowFileHandle::Path(path) => path.display().to_string(),
            FlowFileHandle::Buffer(buffer) => format!("<memory:{:x}>", buffer.id()),
        }
    }

    pub fn is_named(&self) -> bool {
        match self {
            FlowFileHandle::Path(path) => !path.as_os_str().is_empty(),
            FlowFileHandle::Buffer(_) => true,
        }
    }

    /// Opens the handle for reading, decompressing `.gz` and `.zst` paths.
    pub fn open_read(&self) -> Result<Box<dyn Read + Send>> {
        match self {
            FlowFileHandle::Buffer(buffer) => Ok(Box::new(Cursor::new(buffer.to_vec()))),
            FlowFileHandle::Path(path) => {
                let file = File::open(path).map_err(|err| {
                    FlowError::io(format!("failed to open {}: {err}", path.display()))
                })?;
                let reader = BufReader::new(file);
                match FlowCompression::from_path(path) {
                    FlowCompression::None => Ok(Box::new(reader)),
                    #[cfg(feature = "compression")]
                    FlowCompression::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(reader))),
                    #[cfg(feature = "compression")]
                    FlowCompression::Zstd => Ok(Box::new(zstd::stream::read::Decoder::new(reader)?)),
                    #[cfg(not(feature = "compression"))]
                    _ => Err(compression_disabled(path)),
                }
            }
        }
    }

    /// Opens the handle for writing, truncating existing content.
    pub fn open_write(&self) -> Result<FlowFileWriter> {
        let kind = match self {
            FlowFileHandle::Buffer(buffer) => {
                buffer.clear();
                FlowWriterKind::Buffer(FlowBufferWriter(buffer.clone()))
            }
            FlowFileHandle::Path(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|err| {
                        FlowError::io(format!("failed to create {}: {err}", path.display()))
                    })?;
                let writer = BufWriter::new(file);
                match FlowCompression::from_path(path) {
                    FlowCompression::None => FlowWriterKind::Plain(writer),
                    #[cfg(feature = "compression")]
                    FlowCompression::Gzip => FlowWriterKind::Gzip(flate2::write::GzEncoder::new(
                        writer,
                        flate2::Compression::default(),
                    )),
                    #[cfg(feature = "compression")]
                    FlowCompression::Zstd => {
                        FlowWriterKind::Zstd(zstd::stream::write::Encoder::new(writer, 0)?)
                    }
                    #[cfg(not(feature = "compression"))]
                    _ => return Err(compression_disabled(path)),
                }
            }
        };
        Ok(FlowFileWriter { kind })
    }
}

enum FlowWriterKind {
    Buffer(FlowBufferWriter),
    Plain(BufWriter<File>),
    #[cfg(feature = "compression")]
    Gzip(flate2::write::GzEncoder<BufWriter<File>>),
    #[cfg(feature = "compression")]
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<File>>),
}

/// Write side of a [`FlowFileHandle`].
///
/// Compressed output is only complete once [`FlowFileWriter::finish`] has
/// written the trailer; dropping the writer instead may leave it truncated.
pub struct FlowFileWriter {
    kind: FlowWriterKind,
}

impl FlowFileWriter {
    /// Completes any compression frame and flushes everything to the handle.
    pub fn finish(self) -> Result<()> {
        let buffered = match self.kind {
            FlowWriterKind::Buffer(mut writer) => return writer.flush().map_err(FlowError::from),
            FlowWriterKind::Plain(writer) => writer,
            #[cfg(feature = "compression")]
            FlowWriterKind::Gzip(encoder) => encoder.finish()?,
            #[cfg(feature = "compression")]
            FlowWriterKind::Zstd(encoder) => encoder.finish()?,
        };
        let mut file = buffered
            .into_inner()
            .map_err(|err| FlowError::io(format!("failed to flush output: {}", err.error())))?;
        file.flush()?;
        Ok(())
    }

    fn inner(&mut self) -> &mut dyn Write {
        match &mut self.kind {
            FlowWriterKind::Buffer(writer) => writer,
            FlowWriterKind::Plain(writer) => writer,
            #[cfg(feature = "compression")]
            FlowWriterKind::Gzip(encoder) => encoder,
            #[cfg(feature = "compression")]
            FlowWriterKind::Zstd(encoder) => encoder,
        }
    }
}

impl Write for FlowFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }
}

#[cfg(not(feature = "compression"))]
fn compression_disabled(path: &Path) -> FlowError {
    FlowError::validation(format!(
        "{} is compressed but the compression feature is disabled",
        path.display()
    ))
}

/// A delimited flat file.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowFileEndpoint {
    pub handle: FlowFileHandle,
    pub delimiter: char,
    pub has_header: bool,
}

impl FlowFileEndpoint {
    pub fn new(handle: FlowFileHandle) -> Self {
        Self {
            handle,
            delimiter: ',',
            has_header: true,
        }
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::new(FlowFileHandle::path(path))
    }

    pub fn buffer(buffer: FlowSharedBuffer) -> Self {
        Self::new(FlowFileHandle::Buffer(buffer))
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// The delimiter as a byte, rejecting anything the codec cannot quote.
    pub fn delimiter_byte(&self) -> Result<u8> {
        let c = self.delimiter;
        if !c.is_ascii() || matches!(c, '"' | '\r' | '\n') {
            return Err(FlowError::validation(format!(
                "invalid delimiter {c:?}: expected one ASCII character other than a quote or line break"
            )));
        }
        Ok(c as u8)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.handle.is_named() {
            return Err(FlowError::validation("file name is required"));
        }
        self.delimiter_byte().map(|_| ())
    }
}

/// Opaque store secret. Never printed or serialized in clear.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct FlowCredential(String);

impl FlowCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for FlowCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl fmt::Display for FlowCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl Serialize for FlowCredential {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

impl From<&str> for FlowCredential {
    fn from(secret: &str) -> Self {
        FlowCredential::new(secret)
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static identifier pattern"))
}

/// Table names must be plain identifiers.
pub fn validate_table_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FlowError::validation("table name is required"));
    }
    if !identifier_pattern().is_match(name) {
        return Err(FlowError::validation(format!(
            "invalid table name '{name}': use letters, digits and underscores, not starting with a digit"
        )));
    }
    Ok(())
}

/// Connection settings for a store, optionally naming a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowStoreEndpoint {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub credential: FlowCredential,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub secure: bool,
}

impl FlowStoreEndpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            credential: FlowCredential::new(credential),
            table: None,
            secure: false,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Every connection field must be filled in.
    pub fn validate_connection(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if self.database.trim().is_empty() {
            missing.push("database");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.credential.is_empty() {
            missing.push("credential");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FlowError::validation(format!(
                "incomplete connection settings: missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Connection fields plus a valid table identifier.
    pub fn validate_table(&self) -> Result<&str> {
        self.validate_connection()?;
        let table = self.table.as_deref().unwrap_or("");
        validate_table_identifier(table)?;
        Ok(table)
    }

    /// Identity of the session this endpoint needs; excludes the credential.
    pub fn session_key(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }

    /// Same server, database, user and credential.
    pub fn same_session(&self, other: &FlowStoreEndpoint) -> bool {
        self.session_key() == other.session_key() && self.credential == other.credential
    }
}

/// A raw query against a store, usable only as a transfer source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowQueryEndpoint {
    pub store: FlowStoreEndpoint,
    pub sql: String,
}

impl FlowQueryEndpoint {
    pub fn new(store: FlowStoreEndpoint, sql: impl Into<String>) -> Self {
        Self {
            store,
            sql: sql.into(),
        }
    }
}

/// A concrete source or destination of row data.
#[derive(Clone, Debug, PartialEq)]
pub enum FlowEndpoint {
    File(FlowFileEndpoint),
    Store(FlowStoreEndpoint),
    Query(FlowQueryEndpoint),
}

impl FlowEndpoint {
    /// Identity used for schema caching and in-use checks.
    pub fn key(&self) -> String {
        match self {
            FlowEndpoint::File(file) => format!("file:{}", file.handle.name()),
            FlowEndpoint::Store(store) => format!(
                "store:{}/{}",
                store.session_key(),
                store.table.as_deref().unwrap_or("")
            ),
            FlowEndpoint::Query(query) => {
                format!("query:{}:{}", query.store.session_key(), query.sql.trim())
            }
        }
    }

    /// Human-readable name for status messages.
    pub fn describe(&self) -> String {
        match self {
            FlowEndpoint::File(file) => file.handle.name(),
            FlowEndpoint::Store(store) => format!(
                "{}.{}",
                store.database,
                store.table.as_deref().unwrap_or("")
            ),
            FlowEndpoint::Query(query) => format!("query on {}", query.store.database),
        }
    }

    pub fn store(&self) -> Option<&FlowStoreEndpoint> {
        match self {
            FlowEndpoint::File(_) => None,
            FlowEndpoint::Store(store) => Some(store),
            FlowEndpoint::Query(query) => Some(&query.store),
        }
    }

    pub fn validate_as_source(&self) -> Result<()> {
        match self {
            FlowEndpoint::File(file) => file.validate(),
            FlowEndpoint::Store(store) => store.validate_table().map(|_| ()),
            FlowEndpoint::Query(query) => {
                query.store.validate_connection()?;
                if query.sql.trim().is_empty() {
                    return Err(FlowError::validation("query text is required"));
                }
                Ok(())
            }
        }
    }

    pub fn validate_as_destination(&self) -> Result<()> {
        match self {
            FlowEndpoint::File(file) => file.validate(),
            FlowEndpoint::Store(store) => store.validate_table().map(|_| ()),
            FlowEndpoint::Query(_) => Err(FlowError::validation(
                "a query can only be used as a transfer source",
            )),
        }
    }
}

impl From<FlowFileEndpoint> for FlowEndpoint {
    fn from(file: FlowFileEndpoint) -> Self {
        FlowEndpoint::File(file)
    }
}

impl From<FlowStoreEndpoint> for FlowEndpoint {
    fn from(store: FlowStoreEndpoint) -> Self {
        FlowEndpoint::Store(store)
    }
}

impl From<FlowQueryEndpoint> for FlowEndpoint {
    fn from(query: FlowQueryEndpoint) -> Self {
        FlowEndpoint::Query(query)
    }
}
