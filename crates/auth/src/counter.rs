//! Per-principal revocation counter.
//!
//! The counter is the single source of truth for "is this refresh credential
//! still the latest one issued". Refresh credentials embed the value current
//! at issuance; bumping the counter invalidates all of them at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use gatekeep_core::PrincipalId;

use crate::CounterError;

/// Monotonic per-principal counter.
///
/// Implementations must make `increment_and_get` linearizable per principal:
/// N concurrent increments return N distinct successive values. Different
/// principals must not contend with each other.
#[async_trait]
pub trait RevocationCounter: Send + Sync {
    /// Current value; 0 when the principal has no entry yet.
    async fn get(&self, principal_id: PrincipalId) -> Result<u64, CounterError>;

    /// Create-or-increment, returning the new value.
    async fn increment_and_get(&self, principal_id: PrincipalId) -> Result<u64, CounterError>;

    /// Drop the entry of a deleted principal.
    ///
    /// Only meaningful once the principal can no longer be issued
    /// credentials; a concurrent issue may otherwise recreate the entry.
    /// The id must not be reused afterwards: the counter restarts at zero.
    async fn remove(&self, principal_id: PrincipalId) -> Result<(), CounterError>;
}

/// In-memory counter for tests/dev and single-process deployments.
///
/// - One atomic cell per principal; the map lock is only held long enough to
///   find (or, once, create) the cell.
/// - Every operation completes without an await point, so a cancelled
///   caller either sees the increment land or not at all.
#[derive(Debug, Default)]
pub struct InMemoryRevocationCounter {
    cells: RwLock<HashMap<PrincipalId, Arc<AtomicU64>>>,
}

impl InMemoryRevocationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, principal_id: PrincipalId) -> Result<Option<Arc<AtomicU64>>, CounterError> {
        let cells = self.cells.read().map_err(|_| CounterError::Poisoned)?;
        Ok(cells.get(&principal_id).cloned())
    }

    fn cell_or_create(&self, principal_id: PrincipalId) -> Result<Arc<AtomicU64>, CounterError> {
        if let Some(cell) = self.cell(principal_id)? {
            return Ok(cell);
        }
        let mut cells = self.cells.write().map_err(|_| CounterError::Poisoned)?;
        Ok(cells.entry(principal_id).or_default().clone())
    }
}

#[async_trait]
impl RevocationCounter for InMemoryRevocationCounter {
    async fn get(&self, principal_id: PrincipalId) -> Result<u64, CounterError> {
        Ok(self
            .cell(principal_id)?
            .map(|cell| cell.load(Ordering::SeqCst))
            .unwrap_or(0))
    }

    async fn increment_and_get(&self, principal_id: PrincipalId) -> Result<u64, CounterError> {
        let cell = self.cell_or_create(principal_id)?;
        Ok(cell.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn remove(&self, principal_id: PrincipalId) -> Result<(), CounterError> {
        let mut cells = self.cells.write().map_err(|_| CounterError::Poisoned)?;
        cells.remove(&principal_id);
        Ok(())
    }
}
