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

//! # Data Export Module
//!
//! This module covers the write side of a transfer.
//!
//! ## Module Components
//!
//! - **Writer** ([writer.rs](writer/index.html)): File and store sinks with chunked writes
//!
//! ## Usage Patterns
//!
//! ```rust
//! use fileflow::endpoint::FlowFileEndpoint;
//! use fileflow::export::{FlowFileSink, FlowSinkWriter};
//!
//! let mut sink = FlowFileSink::new(FlowFileEndpoint::path("out.csv"));
//! let report = sink.write(&schema, rows, 1000).await;
//! ```

pub mod writer;

pub use writer::{next_chunk, FlowFileSink, FlowSinkWriter, FlowStoreSink, FlowWriteReport};
