use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use store::{KeyedRecordStore, ObjectStore};
use tracing::{debug, error, info};

use crate::RosterError;

/// Whether the backends are known to be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    /// Nothing loaded since the last successful clear.
    Pristine,
    /// A load has run (successfully or not) since the last successful clear,
    /// or the process has not cleared yet.
    Dirty,
}

/// Process-wide readers-writer guard over the backends.
///
/// Loads and clears hold it exclusively; queries share it. Access is scoped:
/// the lock is released when the returned handle drops, on every exit path.
#[derive(Debug)]
pub struct StateGuard {
    phase: RwLock<StorePhase>,
}

impl Default for StateGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl StateGuard {
    /// Starts dirty: whatever the backends hold at startup is unknown.
    pub fn new() -> Self {
        Self::with_phase(StorePhase::Dirty)
    }

    pub fn with_phase(phase: StorePhase) -> Self {
        Self {
            phase: RwLock::new(phase),
        }
    }

    pub fn exclusive(&self) -> ExclusiveAccess<'_> {
        // The phase is a plain flag; a panicking holder cannot leave it torn.
        ExclusiveAccess {
            phase: self.phase.write().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn shared(&self) -> SharedAccess<'_> {
        SharedAccess {
            phase: self.phase.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn phase(&self) -> StorePhase {
        *self.shared().phase
    }

    /// Retire the current table generation and the archival object, then
    /// start an empty generation.
    ///
    /// A no-op when already pristine. Steps are not retried and not undone:
    /// a failure leaves the phase dirty and the backends wherever the failing
    /// step left them.
    pub fn clear(
        &self,
        table: &dyn KeyedRecordStore,
        objects: &dyn ObjectStore,
    ) -> Result<ClearOutcome, RosterError> {
        let mut access = self.exclusive();
        if access.phase() == StorePhase::Pristine {
            debug!("clear skipped, store already pristine");
            return Ok(ClearOutcome::AlreadyPristine);
        }

        let retired = table.table_name();
        table.delete_table().map_err(|err| {
            error!(error = %err, "clear failed deleting table");
            RosterError::backend("error while deleting table", err)
        })?;
        objects.delete().map_err(|err| {
            error!(error = %err, "clear failed deleting archival object");
            RosterError::backend("error while deleting blob object", err)
        })?;
        let table_name = table.create_table().map_err(|err| {
            error!(error = %err, "clear failed creating table");
            RosterError::backend("error while creating table after deletion", err)
        })?;

        access.mark_pristine();
        info!(
            retired = retired.as_deref().unwrap_or("<none>"),
            table = %table_name,
            "cleared table and archival object"
        );
        Ok(ClearOutcome::Cleared { table_name })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    AlreadyPristine,
    Cleared { table_name: String },
}

pub struct ExclusiveAccess<'a> {
    phase: RwLockWriteGuard<'a, StorePhase>,
}

impl ExclusiveAccess<'_> {
    pub fn phase(&self) -> StorePhase {
        *self.phase
    }

    pub fn mark_dirty(&mut self) {
        *self.phase = StorePhase::Dirty;
    }

    fn mark_pristine(&mut self) {
        *self.phase = StorePhase::Pristine;
    }
}

pub struct SharedAccess<'a> {
    phase: RwLockReadGuard<'a, StorePhase>,
}
