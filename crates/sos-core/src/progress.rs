//! Progress reporting for harvest and processing runs.
//!
//! Runs emit [`HarvestEvent`]s through a [`ProgressReporter`] instead of
//! logging directly, so the CLI can log them while tests stay silent or
//! record them.

use tracing::{info, warn};

use crate::harvest_info::{HarvestInfo, HarvestMode};

// =============================================================================
// Harvest Events
// =============================================================================

/// Events emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    /// A run started.
    Started { harvest: &'a str, mode: HarvestMode },
    /// The work was split into chunks.
    ChunksPlanned { harvest: &'a str, chunks: usize },
    /// Documents for deleted or rejected sightings were removed.
    DeletionsApplied { count: u64 },
    /// A chunk was fetched, cast and stored.
    ChunkCompleted {
        batch_index: usize,
        count: usize,
        completed: usize,
        total: usize,
    },
    /// A chunk failed. Other chunks keep running.
    ChunkFailed { batch_index: usize, error: &'a str },
    /// The run stopped dispatching chunks after a cancellation request.
    Cancelled {
        harvest: &'a str,
        completed: usize,
        total: usize,
    },
    /// The run finished and produced its result record.
    Completed { info: &'a HarvestInfo },
}

// =============================================================================
// Progress Reporter Trait
// =============================================================================

pub trait ProgressReporter: Send + Sync {
    /// Called for every event. The default implementation does nothing.
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Reporter that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::Started { harvest, mode } => {
                info!(harvest, mode = mode.as_str(), "Harvest started");
            }
            HarvestEvent::ChunksPlanned { harvest, chunks } => {
                info!(harvest, chunks, "Chunks planned");
            }
            HarvestEvent::DeletionsApplied { count } => {
                info!(count, "Deleted and rejected observations removed");
            }
            HarvestEvent::ChunkCompleted {
                batch_index,
                count,
                completed,
                total,
            } => {
                tracing::debug!(batch_index, count, completed, total, "Chunk completed");
            }
            HarvestEvent::ChunkFailed { batch_index, error } => {
                warn!(batch_index, error, "Chunk failed");
            }
            HarvestEvent::Cancelled {
                harvest,
                completed,
                total,
            } => {
                info!(harvest, completed, total, "Harvest cancelled");
            }
            HarvestEvent::Completed { info } => {
                info!(
                    harvest = info.id.as_str(),
                    status = info.status.as_str(),
                    count = info.count,
                    "Harvest finished"
                );
            }
        }
    }
}
