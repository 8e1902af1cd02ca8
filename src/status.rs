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

//! # FileFlow Status Module
//!
//! Connection and transfer lifecycles observable through a
//! `tokio::sync::watch` channel. Every change replaces the whole
//! [`FlowStatusSnapshot`], so observers always see a consistent view.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::errors::{FlowError, FlowErrorKind};

/// Store connection lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Failed,
}

/// Coarse transfer lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowTransferStatus {
    #[default]
    Idle,
    Transferring,
    Completed,
    Failed,
}

/// Fine-grained transfer phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowTransferPhase {
    #[default]
    Idle,
    Validating,
    Transferring,
    Completed,
    Failed,
}

impl FlowTransferPhase {
    /// Validation counts as transferring for observers of the coarse status.
    pub fn status(&self) -> FlowTransferStatus {
        match self {
            FlowTransferPhase::Idle => FlowTransferStatus::Idle,
            FlowTransferPhase::Validating | FlowTransferPhase::Transferring => FlowTransferStatus::Transferring,
            FlowTransferPhase::Completed => FlowTransferStatus::Completed,
            FlowTransferPhase::Failed => FlowTransferStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowTransferPhase::Completed | FlowTransferPhase::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, FlowTransferPhase::Validating | FlowTransferPhase::Transferring)
    }
}

/// A classified error as shown to observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatusError {
    pub kind: FlowErrorKind,
    pub message: String,
}

impl From<&FlowError> for FlowStatusError {
    fn from(err: &FlowError) -> Self {
        Self {
            kind: err.kind(),
            message: err.reason().to_string(),
        }
    }
}

/// Everything an observer needs to render the current state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatusSnapshot {
    pub connection: FlowConnectionStatus,
    pub transfer: FlowTransferStatus,
    pub phase: FlowTransferPhase,
    pub rows_processed: usize,
    pub message: String,
    pub error: Option<FlowStatusError>,
}

impl FlowStatusSnapshot {
    /// The single line a status panel should show.
    ///
    /// Transfer state wins over connection state; a plain message is shown
    /// only when neither has anything to say.
    pub fn headline(&self) -> Option<String> {
        let message = (!self.message.is_empty()).then(|| self.message.clone());
        match self.transfer {
            FlowTransferStatus::Transferring => {
                return Some(message.unwrap_or_else(|| format!("Transferring: {} rows", self.rows_processed)))
            }
            FlowTransferStatus::Completed => {
                return Some(message.unwrap_or_else(|| format!("Transferred {} rows", self.rows_processed)))
            }
            FlowTransferStatus::Failed => {
                let reason = self.error.as_ref().map(|e| e.message.clone());
                return Some(message.or(reason).unwrap_or_else(|| "Transfer failed".to_string()));
            }
            FlowTransferStatus::Idle => {}
        }
        match self.connection {
            FlowConnectionStatus::Connecting => Some("Connecting...".to_string()),
            FlowConnectionStatus::Connected => Some("Connected".to_string()),
            FlowConnectionStatus::Failed => {
                let reason = self.error.as_ref().map(|e| e.message.clone());
                Some(match reason {
                    Some(reason) => format!("Connection failed: {reason}"),
                    None => "Connection failed".to_string(),
                })
            }
            FlowConnectionStatus::Idle => message,
        }
    }
}

/// Owner side of the status channel.
#[derive(Debug)]
pub struct FlowStatusBoard {
    sender: watch::Sender<FlowStatusSnapshot>,
}

impl Default for FlowStatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowStatusBoard {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(FlowStatusSnapshot::default());
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowStatusSnapshot> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> FlowStatusSnapshot {
        self.sender.borrow().clone()
    }

    /// Applies `change` and notifies observers.
    pub fn update(&self, change: impl FnOnce(&mut FlowStatusSnapshot)) {
        self.sender.send_modify(change);
    }

    pub fn set_connection(&self, connection: FlowConnectionStatus, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.connection = connection;
            s.message = message;
            if connection != FlowConnectionStatus::Failed && !s.phase.is_terminal() {
                s.error = None;
            }
        });
    }

    pub fn connection_failed(&self, err: &FlowError) {
        self.update(|s| {
            s.connection = FlowConnectionStatus::Failed;
            s.message = format!("Connection failed: {}", err.reason());
            s.error = Some(err.into());
        });
    }

    pub fn set_phase(&self, phase: FlowTransferPhase, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.phase = phase;
            s.transfer = phase.status();
            s.message = message;
        });
    }

    /// Starts a new job view: phase `Validating`, zero rows, no error.
    pub fn begin_job(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.phase = FlowTransferPhase::Validating;
            s.transfer = FlowTransferStatus::Transferring;
            s.rows_processed = 0;
            s.error = None;
            s.message = message;
        });
    }

    pub fn set_progress(&self, rows_processed: usize) {
        self.update(|s| {
            s.rows_processed = rows_processed;
            s.message = format!("Transferring: {rows_processed} rows");
        });
    }

    pub fn job_failed(&self, err: &FlowError, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.phase = FlowTransferPhase::Failed;
            s.transfer = FlowTransferStatus::Failed;
            s.error = Some(err.into());
            s.message = message;
        });
    }

    pub fn reset(&self) {
        self.update(|s| {
            let connection = s.connection;
            *s = FlowStatusSnapshot {
                connection,
                ..FlowStatusSnapshot::default()
            };
        });
    }
}
