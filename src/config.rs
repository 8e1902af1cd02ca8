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

//! # FileFlow Configuration
//!
//! Engine, connector and logging settings loaded from YAML or JSON.
//!
//! ```yaml
//! engine:
//!   chunk_size: 500
//! log:
//!   level: debug
//! store:
//!   host: localhost
//!   port: 8123
//!   database: default
//!   username: default
//!   credential: secret
//! ```

use std::path::Path;

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::endpoint::FlowStoreEndpoint;
use crate::errors::{FlowError, Result};
use crate::ingest::inference::DEFAULT_SAMPLE_ROWS;

#[cfg(feature = "clickhouse")]
use crate::store::clickhouse::FlowClickHouseConfig;

/// Default number of rows per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Transfer engine tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowEngineConfig {
    pub chunk_size: usize,
    pub sample_rows: usize,
    pub preview_rows: usize,
}

impl Default for FlowEngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            preview_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

/// Logging threshold for the `log` facade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowLogConfig {
    pub level: String,
}

impl Default for FlowLogConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
        }
    }
}

impl FlowLogConfig {
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.to_ascii_uppercase().as_str() {
            "OFF" => LevelFilter::Off,
            "ERROR" => LevelFilter::Error,
            "WARN" | "WARNING" => LevelFilter::Warn,
            "DEBUG" => LevelFilter::Debug,
            "TRACE" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }

    /// Sets the global maximum level of the `log` facade.
    pub fn apply(&self) {
        log::set_max_level(self.level_filter());
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub engine: FlowEngineConfig,
    #[cfg(feature = "clickhouse")]
    pub clickhouse: FlowClickHouseConfig,
    pub log: FlowLogConfig,
    /// Connection used when none is given explicitly.
    pub store: Option<FlowStoreEndpoint>,
}

impl FlowConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: FlowConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: FlowConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `.yaml`, `.yml` or `.json` files.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(FlowError::validation(format!(
                "unsupported configuration file {}: expected .yaml, .yml or .json",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.chunk_size == 0 {
            return Err(FlowError::validation("engine.chunk_size must be greater than zero"));
        }
        if self.engine.sample_rows == 0 {
            return Err(FlowError::validation("engine.sample_rows must be greater than zero"));
        }
        if self.engine.preview_rows == 0 {
            return Err(FlowError::validation("engine.preview_rows must be greater than zero"));
        }
        Ok(())
    }
}

/// Partial configuration merged over the defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FlowConfigBuilder {
    pub chunk_size: Option<usize>,
    pub sample_rows: Option<usize>,
    pub preview_rows: Option<usize>,
    pub log_level: Option<String>,
    #[cfg(feature = "clickhouse")]
    pub clickhouse: Option<FlowClickHouseConfig>,
    pub store: Option<FlowStoreEndpoint>,
}

impl FlowConfigBuilder {
    pub fn build(self) -> FlowConfig {
        let base = FlowConfig::default();
        FlowConfig {
            engine: FlowEngineConfig {
                chunk_size: self.chunk_size.unwrap_or(base.engine.chunk_size),
                sample_rows: self.sample_rows.unwrap_or(base.engine.sample_rows),
                preview_rows: self.preview_rows.unwrap_or(base.engine.preview_rows),
            },
            #[cfg(feature = "clickhouse")]
            clickhouse: self.clickhouse.unwrap_or(base.clickhouse),
            log: FlowLogConfig {
                level: self.log_level.unwrap_or(base.log.level),
            },
            store: self.store.or(base.store),
        }
    }

    /// Builds from a JSON object, falling back to defaults when it does not parse.
    pub fn from_json(value: &Value) -> FlowConfig {
        let builder: FlowConfigBuilder =
            serde_json::from_value(value.clone()).unwrap_or_else(|_| FlowConfigBuilder::default());
        builder.build()
    }
}
