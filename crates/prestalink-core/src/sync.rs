//! Batch import statistics.
//!
//! Pure bookkeeping for CLI summaries, decoupled from I/O.

use crate::importer::ImportOutcome;

/// Statistics for a batch of imports.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub created: usize,
    pub updated: usize,
    /// Imports that hit a transport error and left a checkpoint.
    pub checkpointed: usize,
    /// Imports that aborted with an unrecovered error.
    pub failed: usize,
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: ImportOutcome) {
        match outcome {
            ImportOutcome::Created(_) => self.created += 1,
            ImportOutcome::Updated(_) => self.updated += 1,
            ImportOutcome::Checkpointed => self.checkpointed += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Returns the total number of processed entities.
    pub fn total(&self) -> usize {
        self.created + self.updated + self.checkpointed + self.failed
    }

    /// Returns the number of entities now imported locally.
    pub fn successful(&self) -> usize {
        self.created + self.updated
    }

    /// True if some entities need a human look.
    pub fn needs_attention(&self) -> bool {
        self.checkpointed + self.failed > 0
    }
}
