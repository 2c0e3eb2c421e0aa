use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, Result};

struct WorkloadCell {
    active: Mutex<u32>,
    max: u32,
}

/// Tracks per-technician assignment counts
///
/// Every mutation of a technician's counter goes through that technician's
/// own lock, so concurrent writers are serialized per technician and the
/// capacity check and increment happen as one step. The count can never
/// exceed the technician's capacity and never goes below zero.
pub struct WorkloadLedger {
    cells: DashMap<Uuid, Arc<WorkloadCell>>,
}

impl WorkloadLedger {
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    /// Register a technician with their capacity and current load
    pub fn register(&self, technician_id: Uuid, active: u32, max: u32) {
        self.cells.insert(
            technician_id,
            Arc::new(WorkloadCell {
                active: Mutex::new(active.min(max)),
                max,
            }),
        );
    }

    pub fn remove(&self, technician_id: Uuid) {
        self.cells.remove(&technician_id);
    }

    /// Current active count for a technician
    pub fn active(&self, technician_id: Uuid) -> Option<u32> {
        self.cells
            .get(&technician_id)
            .map(|cell| *cell.active.lock())
    }

    /// Reserve one assignment slot; returns the new active count
    ///
    /// Capacity is re-checked under the technician's lock, so a candidate
    /// that looked free when ranked can still be rejected here.
    pub fn reserve(&self, technician_id: Uuid) -> Result<u32> {
        let cell = self.cell(technician_id)?;
        let mut active = cell.active.lock();

        if *active >= cell.max {
            return Err(EngineError::NoAvailableTechnician(format!(
                "Technician {} is at capacity ({}/{})",
                technician_id, *active, cell.max
            )));
        }
        *active += 1;
        debug!(%technician_id, active = *active, "Reserved assignment slot");
        Ok(*active)
    }

    /// Release one assignment slot; returns the new active count
    pub fn release(&self, technician_id: Uuid) -> Result<u32> {
        let cell = self.cell(technician_id)?;
        let mut active = cell.active.lock();

        *active = active.saturating_sub(1);
        debug!(%technician_id, active = *active, "Released assignment slot");
        Ok(*active)
    }

    fn cell(&self, technician_id: Uuid) -> Result<Arc<WorkloadCell>> {
        self.cells
            .get(&technician_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                EngineError::NotFound(format!("Technician {} is not registered", technician_id))
            })
    }
}

impl Default for WorkloadLedger {
    fn default() -> Self {
        Self::new()
    }
}
