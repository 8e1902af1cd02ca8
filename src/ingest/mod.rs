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

//! # Data Ingestion Module
//!
//! This module covers the read side of a transfer: discovering what a source
//! looks like and streaming its rows.
//!
//! ## Module Components
//!
//! - **Inference** ([inference.rs](inference/index.html)): Sampled schema inference and previews
//! - **Reader** ([reader.rs](reader/index.html)): File and store row sources
//!
//! ## Usage Patterns
//!
//! ### Inferring a File Schema
//!
//! ```rust
//! use fileflow::endpoint::FlowFileEndpoint;
//! use fileflow::ingest::FlowSchemaInferencer;
//!
//! let file = FlowFileEndpoint::path("people.csv");
//! let schema = FlowSchemaInferencer::default().infer_from_file(&file)?;
//! ```
//!
//! ### Streaming a Projection
//!
//! ```rust
//! use fileflow::ingest::{FlowFileSource, FlowSourceReader};
//! use fileflow::schema::FlowProjection;
//!
//! let source = FlowFileSource::new(file);
//! let rows = source.rows(&FlowProjection::new(["id", "name"])).await?;
//! ```

pub mod inference;
pub mod reader;

pub use inference::{FlowPreview, FlowSchemaInferencer, DEFAULT_SAMPLE_ROWS};
pub use reader::{FlowFileSource, FlowSourceReader, FlowStoreSource, FlowStoreTarget};
