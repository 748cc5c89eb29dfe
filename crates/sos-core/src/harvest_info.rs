//! Run status and result tracking for harvest and processing runs.
//!
//! Every stage returns an immutable value that the caller folds into a
//! running aggregate; nothing is mutated through shared references.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Final status of a harvest or processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
    /// Cancelled before anything was written, or after a batch failed.
    Canceled,
    /// Cancelled, but every dispatched batch completed successfully.
    CanceledSuccess,
}

impl RunStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
            RunStatus::CanceledSuccess => "canceled_success",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunStatus::Canceled | RunStatus::CanceledSuccess)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "canceled" => Ok(RunStatus::Canceled),
            "canceled_success" => Ok(RunStatus::CanceledSuccess),
            _ => Err(AppError::Generic(format!("invalid run status: {}", s))),
        }
    }
}

/// Which verbatim collection a run targets and how much of the source it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestMode {
    /// Re-harvest the entire id span and replace the verbatim collection.
    #[default]
    Full,
    /// Incremental run on the instance currently serving queries.
    IncrementalActive,
    /// Incremental run on the idle secondary instance.
    IncrementalInactive,
}

impl HarvestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarvestMode::Full => "full",
            HarvestMode::IncrementalActive => "incremental_active",
            HarvestMode::IncrementalInactive => "incremental_inactive",
        }
    }

    pub fn is_incremental(&self) -> bool {
        !matches!(self, HarvestMode::Full)
    }

    /// How far back deleted and rejected sightings are looked up.
    ///
    /// The inactive instance may have been idle for a long time, so it looks
    /// back a full day. The active instance runs every few minutes.
    pub fn deletion_lookback(&self) -> Option<Duration> {
        match self {
            HarvestMode::Full => None,
            HarvestMode::IncrementalActive => Some(Duration::hours(1)),
            HarvestMode::IncrementalInactive => Some(Duration::hours(24)),
        }
    }
}

impl fmt::Display for HarvestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HarvestMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "full" => Ok(HarvestMode::Full),
            "incremental_active" | "incremental" => Ok(HarvestMode::IncrementalActive),
            "incremental_inactive" => Ok(HarvestMode::IncrementalInactive),
            _ => Err(AppError::ConfigError(format!(
                "Unknown harvest mode: '{}'. Valid options: full, incremental-active, incremental-inactive",
                s
            ))),
        }
    }
}

/// Count returned by a harvest that found nothing to do.
pub const NOTHING_TO_HARVEST: i64 = -1;

/// Result record of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestInfo {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub count: i64,
    pub notes: Option<String>,
}

impl HarvestInfo {
    /// Starts a new record. Status is `Failed` until the run says otherwise.
    pub fn new(id: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start,
            end: None,
            status: RunStatus::Failed,
            count: 0,
            notes: None,
        }
    }

    /// Returns a finished copy of this record.
    pub fn finish(self, status: RunStatus, count: i64, end: DateTime<Utc>) -> Self {
        Self {
            status,
            count,
            end: Some(end),
            ..self
        }
    }

    pub fn with_note(self, note: impl Into<String>) -> Self {
        Self {
            notes: Some(note.into()),
            ..self
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// What one chunk contributed to a run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub batch_index: usize,
    pub result: Result<usize, AppError>,
}

/// Running aggregate of batch outcomes.
#[derive(Debug, Default)]
pub struct HarvestTally {
    pub count: usize,
    pub succeeded: usize,
    pub failed_batches: Vec<usize>,
    pub first_error: Option<AppError>,
}

impl HarvestTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one batch outcome into the tally.
    pub fn record(mut self, outcome: BatchOutcome) -> Self {
        match outcome.result {
            Ok(count) => {
                self.count += count;
                self.succeeded += 1;
            }
            Err(e) => {
                self.failed_batches.push(outcome.batch_index);
                if self.first_error.is_none() {
                    self.first_error = Some(e);
                }
            }
        }
        self
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_batches.is_empty()
    }

    /// Status of a run that dispatched these batches.
    pub fn status(&self, cancelled: bool) -> RunStatus {
        match (cancelled, self.has_failures()) {
            (false, false) => RunStatus::Success,
            (false, true) => RunStatus::Failed,
            (true, false) if self.succeeded > 0 => RunStatus::CanceledSuccess,
            (true, _) => RunStatus::Canceled,
        }
    }
}
