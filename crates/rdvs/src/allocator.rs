//! Persistent identity → slot allocation store.
//!
//! Slot assignments are permanent: once an identity is mapped to a slot the
//! record is never mutated or reused for another identity. New records are
//! committed with immediate durability before the slot is returned, so a
//! crash after commit cannot lose an assignment and a crash before commit
//! cannot leak one.

use rdv_common::Identity;
use redb::{Database, Durability, ReadableTable, TableDefinition};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

const ALLOCATIONS: TableDefinition<&[u8], u64> = TableDefinition::new("allocations");

/// Errors from the allocation store.
#[derive(Debug, Error)]
pub enum AllocError {
    /// Every slot in the configured pool is taken.
    #[error("address pool exhausted")]
    Exhausted,
    /// The underlying database failed.
    #[error("allocation store error: {0}")]
    Storage(#[from] redb::Error),
}

/// Durable allocator handing out the smallest free slot per new identity.
pub struct IdentAllocator {
    db: Database,
    capacity: u64,
    used: BTreeSet<u64>,
}

impl IdentAllocator {
    /// Opens (or creates) the store at `path` for a pool of `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Storage`] if the database cannot be opened or
    /// read.
    pub fn open(path: &Path, capacity: u64) -> Result<Self, AllocError> {
        let db = Database::create(path).map_err(redb::Error::from)?;

        // Create the table up front so later reads never miss it.
        let txn = db.begin_write().map_err(redb::Error::from)?;
        txn.open_table(ALLOCATIONS).map_err(redb::Error::from)?;
        txn.commit().map_err(redb::Error::from)?;

        let mut used = BTreeSet::new();
        let read = db.begin_read().map_err(redb::Error::from)?;
        let table = read.open_table(ALLOCATIONS).map_err(redb::Error::from)?;
        for entry in table.iter().map_err(redb::Error::from)? {
            let (_, slot) = entry.map_err(redb::Error::from)?;
            let slot = slot.value();
            if slot >= capacity {
                warn!(slot, capacity, "stored allocation lies outside the configured pool");
            }
            used.insert(slot);
        }

        Ok(Self { db, capacity, used })
    }

    /// Returns the slot for `identity`, allocating the smallest free one on
    /// first sight.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Exhausted`] when the identity is new and no
    /// slot remains; existing assignments are unaffected.
    pub fn allocate(&mut self, identity: &Identity) -> Result<u64, AllocError> {
        if let Some(slot) = self.lookup(identity)? {
            return Ok(slot);
        }

        let slot = self.smallest_free().ok_or(AllocError::Exhausted)?;

        let mut txn = self.db.begin_write().map_err(redb::Error::from)?;
        txn.set_durability(Durability::Immediate);
        {
            let mut table = txn.open_table(ALLOCATIONS).map_err(redb::Error::from)?;
            table
                .insert(identity.as_bytes(), slot)
                .map_err(redb::Error::from)?;
        }
        txn.commit().map_err(redb::Error::from)?;

        self.used.insert(slot);
        Ok(slot)
    }

    /// Looks up the slot assigned to `identity`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Storage`] if the database read fails.
    pub fn lookup(&self, identity: &Identity) -> Result<Option<u64>, AllocError> {
        let read = self.db.begin_read().map_err(redb::Error::from)?;
        let table = read.open_table(ALLOCATIONS).map_err(redb::Error::from)?;
        Ok(table
            .get(identity.as_bytes())
            .map_err(redb::Error::from)?
            .map(|guard| guard.value()))
    }

    /// All records, ordered by slot, for operator inspection.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Storage`] if the database read fails.
    pub fn entries(&self) -> Result<Vec<(Identity, u64)>, AllocError> {
        let read = self.db.begin_read().map_err(redb::Error::from)?;
        let table = read.open_table(ALLOCATIONS).map_err(redb::Error::from)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(redb::Error::from)? {
            let (key, slot) = entry.map_err(redb::Error::from)?;
            match Identity::new(key.value().to_vec()) {
                Ok(identity) => out.push((identity, slot.value())),
                Err(e) => warn!(error = %e, "skipping malformed identity in allocation store"),
            }
        }
        out.sort_by_key(|(_, slot)| *slot);
        Ok(out)
    }

    /// Number of assigned slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Returns `true` if nothing has been allocated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Total slots the pool offers.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Smallest slot not yet assigned, scanning the ordered used set.
    fn smallest_free(&self) -> Option<u64> {
        let mut candidate = 0u64;
        for &slot in &self.used {
            if slot == candidate {
                candidate += 1;
            } else if slot > candidate {
                break;
            }
        }
        (candidate < self.capacity).then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity(bytes: &[u8]) -> Identity {
        Identity::new(bytes.to_vec()).unwrap()
    }

    fn open_in(dir: &TempDir, capacity: u64) -> IdentAllocator {
        IdentAllocator::open(&dir.path().join("allocations.redb"), capacity).unwrap()
    }

    #[test]
    fn allocation_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut alloc = open_in(&dir, 8);
        let a = alloc.allocate(&identity(b"node-A")).unwrap();
        let again = alloc.allocate(&identity(b"node-A")).unwrap();
        assert_eq!(a, again);
        assert_eq!(alloc.len(), 1);
    }

    #[test]
    fn distinct_identities_get_distinct_ascending_slots() {
        let dir = TempDir::new().unwrap();
        let mut alloc = open_in(&dir, 8);
        assert_eq!(alloc.allocate(&identity(b"node-A")).unwrap(), 0);
        assert_eq!(alloc.allocate(&identity(b"node-B")).unwrap(), 1);
        assert_eq!(alloc.allocate(&identity(b"node-C")).unwrap(), 2);
    }

    #[test]
    fn exhaustion_leaves_existing_assignments_intact() {
        let dir = TempDir::new().unwrap();
        let mut alloc = open_in(&dir, 2);
        let a = alloc.allocate(&identity(b"node-A")).unwrap();
        let b = alloc.allocate(&identity(b"node-B")).unwrap();

        let err = alloc.allocate(&identity(b"node-C")).unwrap_err();
        assert!(matches!(err, AllocError::Exhausted));

        assert_eq!(alloc.allocate(&identity(b"node-A")).unwrap(), a);
        assert_eq!(alloc.allocate(&identity(b"node-B")).unwrap(), b);
        assert_eq!(alloc.len(), 2);
    }

    #[test]
    fn assignments_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let (a, b) = {
            let mut alloc = open_in(&dir, 8);
            (
                alloc.allocate(&identity(b"node-A")).unwrap(),
                alloc.allocate(&identity(b"node-B")).unwrap(),
            )
        };

        let mut alloc = open_in(&dir, 8);
        assert_eq!(alloc.allocate(&identity(b"node-A")).unwrap(), a);
        assert_eq!(alloc.allocate(&identity(b"node-B")).unwrap(), b);
        assert_eq!(alloc.allocate(&identity(b"node-C")).unwrap(), 2);
    }

    #[test]
    fn entries_list_is_ordered_by_slot() {
        let dir = TempDir::new().unwrap();
        let mut alloc = open_in(&dir, 8);
        alloc.allocate(&identity(b"node-B")).unwrap();
        alloc.allocate(&identity(b"node-A")).unwrap();

        let entries = alloc.entries().unwrap();
        assert_eq!(
            entries,
            vec![(identity(b"node-B"), 0), (identity(b"node-A"), 1)]
        );
    }

    #[test]
    fn empty_store_reports_empty() {
        let dir = TempDir::new().unwrap();
        let alloc = open_in(&dir, 4);
        assert!(alloc.is_empty());
        assert_eq!(alloc.capacity(), 4);
        assert!(alloc.entries().unwrap().is_empty());
    }
}
