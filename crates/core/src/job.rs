// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job records: long-running operations with progress and cancellation.

use crate::clock::Clock;
use crate::error::ErrorCode;
use crate::instance::InstanceId;
use crate::rights::{Rights, RightsType};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a job.
    pub struct JobId("job-");
}

/// The (type, bit) pair a caller must hold to cancel a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRight {
    pub rights_type: RightsType,
    pub right: Rights,
}

/// Terminal outcome of a job. Exactly one is recorded with `stopped_at_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Errored {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
        message: String,
    },
    Cancelled,
}

crate::simple_display! {
    JobOutcome {
        Completed => "completed",
        Errored { .. } => "errored",
        Cancelled => "cancelled",
    }
}

/// Persistent record of one long-running operation.
///
/// Jobs never restart. Progress is monotonic non-decreasing; a terminal
/// transition records exactly one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// `None` for daemon-scope jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceId>,
    pub description: String,
    pub started_by: String,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_right: Option<CancelRight>,
    /// 0–100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    #[serde(default)]
    pub cancel_requested: bool,
    /// Set when the executor failed to stop within the cancel grace window.
    /// The job slot is released regardless.
    #[serde(default)]
    pub abandoned: bool,
}

impl Job {
    pub fn new(
        instance: Option<InstanceId>,
        description: impl Into<String>,
        started_by: impl Into<String>,
        cancel_right: Option<CancelRight>,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id: JobId::generate(),
            instance,
            description: description.into(),
            started_by: started_by.into(),
            started_at_ms: clock.epoch_ms(),
            stopped_at_ms: None,
            cancel_right,
            progress: 0,
            outcome: None,
            cancel_requested: false,
            abandoned: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Apply a progress report, keeping the stored value monotonic.
    pub fn report_progress(&mut self, pct: u8) {
        let pct = pct.min(100);
        if pct > self.progress {
            self.progress = pct;
        }
    }

    /// Record the terminal outcome. A second terminal transition is ignored.
    pub fn finish(&mut self, outcome: JobOutcome, epoch_ms: u64) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
            self.stopped_at_ms = Some(epoch_ms);
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
