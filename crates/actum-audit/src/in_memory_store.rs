use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use actum_core::{
    ActumError, ActumResult, AuditEvent, AuditFilter, AuditOverride, AuditStore, ChainTail,
    DecisionCounts, EventId,
};

#[derive(Default)]
struct Tables {
    /// Ascending by sequence.
    events: Vec<AuditEvent>,
    by_id: HashMap<EventId, usize>,
    overrides: Vec<AuditOverride>,
}

/// In-memory audit store.
///
/// Events are pushed fully formed under the write lock, so readers never
/// observe a partial event.
#[derive(Default)]
pub struct InMemoryAuditStore {
    tables: RwLock<Tables>,
}

fn read(lock: &RwLock<Tables>) -> ActumResult<RwLockReadGuard<'_, Tables>> {
    lock.read()
        .map_err(|e| ActumError::Storage(format!("lock poisoned: {}", e)))
}

fn write(lock: &RwLock<Tables>) -> ActumResult<RwLockWriteGuard<'_, Tables>> {
    lock.write()
        .map_err(|e| ActumError::Storage(format!("lock poisoned: {}", e)))
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> ActumResult<usize> {
        Ok(read(&self.tables)?.events.len())
    }

    pub fn is_empty(&self) -> ActumResult<bool> {
        Ok(self.len()? == 0)
    }

    fn position(tables: &Tables, sequence: u64) -> Option<usize> {
        tables
            .events
            .binary_search_by_key(&sequence, |e| e.sequence)
            .ok()
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, event: &AuditEvent) -> ActumResult<()> {
        let mut tables = write(&self.tables)?;
        if tables.by_id.contains_key(&event.event_id) {
            return Err(ActumError::Conflict(format!(
                "event id {} already committed",
                event.event_id
            )));
        }
        if let Some(last) = tables.events.last() {
            if event.sequence <= last.sequence {
                return Err(ActumError::Conflict(format!(
                    "sequence {} is not after {}",
                    event.sequence, last.sequence
                )));
            }
        }
        let index = tables.events.len();
        tables.by_id.insert(event.event_id.clone(), index);
        tables.events.push(event.clone());
        Ok(())
    }

    fn tail(&self) -> ActumResult<Option<ChainTail>> {
        let tables = read(&self.tables)?;
        Ok(tables.events.last().map(|e| ChainTail {
            sequence: e.sequence,
            signature: e.signature.clone(),
        }))
    }

    fn get(&self, event_id: &EventId) -> ActumResult<Option<AuditEvent>> {
        let tables = read(&self.tables)?;
        Ok(tables
            .by_id
            .get(event_id)
            .and_then(|&i| tables.events.get(i))
            .cloned())
    }

    fn get_by_sequence(&self, sequence: u64) -> ActumResult<Option<AuditEvent>> {
        let tables = read(&self.tables)?;
        Ok(Self::position(&tables, sequence).map(|i| tables.events[i].clone()))
    }

    fn scan(&self, start: u64, max: usize) -> ActumResult<Vec<AuditEvent>> {
        let tables = read(&self.tables)?;
        let from = tables.events.partition_point(|e| e.sequence < start);
        Ok(tables.events[from..].iter().take(max).cloned().collect())
    }

    fn query(&self, filter: &AuditFilter) -> ActumResult<Vec<AuditEvent>> {
        let tables = read(&self.tables)?;
        Ok(tables
            .events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect())
    }

    fn counts(&self) -> ActumResult<DecisionCounts> {
        let tables = read(&self.tables)?;
        let mut counts = DecisionCounts::default();
        for e in &tables.events {
            counts.record(e.decision.decision);
        }
        Ok(counts)
    }

    fn append_override(&self, record: &AuditOverride) -> ActumResult<()> {
        let mut tables = write(&self.tables)?;
        if tables
            .overrides
            .iter()
            .any(|o| o.override_id == record.override_id)
        {
            return Err(ActumError::Conflict(format!(
                "override id {} already recorded",
                record.override_id
            )));
        }
        tables.overrides.push(record.clone());
        Ok(())
    }

    fn overrides_for(&self, event_id: &EventId) -> ActumResult<Vec<AuditOverride>> {
        let tables = read(&self.tables)?;
        Ok(tables
            .overrides
            .iter()
            .filter(|o| &o.original_event_id == event_id)
            .cloned()
            .collect())
    }
}
