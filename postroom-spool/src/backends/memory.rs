use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use postroom_common::{Envelope, EnvelopeId, internal};
use postroom_tracing::traced;
use tokio::sync::Notify;

use crate::{
    SpoolError,
    filter::{AcceptFilter, EntryInfo},
    r#trait::SpoolStore,
};

#[derive(Debug)]
struct Entry {
    envelope: Envelope,
    locked: bool,
}

/// In-memory spool.
///
/// Entries live in a `BTreeMap` keyed by id, so scans visit them oldest
/// first. Writers and unlocks wake any task blocked in `accept`.
///
/// # Capacity Management
/// With a capacity set, storing a *new* entry beyond it fails with
/// [`SpoolError::CapacityExceeded`]; replacing an existing entry always
/// succeeds.
#[derive(Debug, Clone)]
pub struct MemorySpool {
    entries: Arc<Mutex<BTreeMap<EnvelopeId, Entry>>>,
    changed: Arc<Notify>,
    capacity: Option<usize>,
}

impl MemorySpool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            changed: Arc::new(Notify::new()),
            capacity: None,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Whether the entry exists and is currently locked.
    #[must_use]
    pub fn is_locked(&self, id: &EnvelopeId) -> bool {
        self.entries.lock().get(id).is_some_and(|entry| entry.locked)
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    /// One pass over the unlocked entries, locking the first one accepted.
    fn scan(&self, filter: &mut (dyn AcceptFilter + Send)) -> Option<Envelope> {
        let mut entries = self.entries.lock();

        entries
            .values_mut()
            .filter(|entry| !entry.locked)
            .find(|entry| {
                filter.accept(&EntryInfo {
                    id: entry.envelope.id(),
                    state: entry.envelope.state().clone(),
                    last_updated: entry.envelope.last_updated(),
                    error_message: entry.envelope.error_message().map(str::to_string),
                })
            })
            .map(|entry| {
                entry.locked = true;
                entry.envelope.clone()
            })
    }
}

impl Default for MemorySpool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpoolStore for MemorySpool {
    async fn store(&self, envelope: &Envelope) -> crate::Result<EnvelopeId> {
        let id = envelope.id();

        {
            let mut entries = self.entries.lock();

            if let Some(entry) = entries.get_mut(&id) {
                entry.envelope = envelope.clone();
            } else {
                if let Some(capacity) = self.capacity
                    && entries.len() >= capacity
                {
                    return Err(SpoolError::CapacityExceeded {
                        len: entries.len(),
                        capacity,
                    });
                }

                entries.insert(
                    id,
                    Entry {
                        envelope: envelope.clone(),
                        locked: false,
                    },
                );
            }
        }

        internal!(envelope_id = %id, state = %envelope.state(), "Stored envelope");
        self.changed.notify_waiters();

        Ok(id)
    }

    async fn retrieve(&self, id: &EnvelopeId) -> crate::Result<Envelope> {
        self.entries
            .lock()
            .get(id)
            .map(|entry| entry.envelope.clone())
            .ok_or(SpoolError::NotFound(*id))
    }

    async fn remove(&self, id: &EnvelopeId) -> crate::Result<()> {
        self.entries
            .lock()
            .remove(id)
            .ok_or(SpoolError::NotFound(*id))?;

        internal!(envelope_id = %id, "Removed envelope");
        Ok(())
    }

    async fn list(&self) -> crate::Result<Vec<EnvelopeId>> {
        Ok(self.entries.lock().keys().copied().collect())
    }

    async fn lock(&self, id: &EnvelopeId) -> crate::Result<bool> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(id).ok_or(SpoolError::NotFound(*id))?;

        if entry.locked {
            return Ok(false);
        }

        entry.locked = true;
        Ok(true)
    }

    async fn unlock(&self, id: &EnvelopeId) -> crate::Result<()> {
        {
            let mut entries = self.entries.lock();
            let entry = entries.get_mut(id).ok_or(SpoolError::NotFound(*id))?;

            if !entry.locked {
                return Err(SpoolError::NotLocked(*id));
            }

            entry.locked = false;
        }

        self.changed.notify_waiters();
        Ok(())
    }

    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing(precision = "ms"))]
    async fn accept(&self, filter: &mut (dyn AcceptFilter + Send)) -> crate::Result<Envelope> {
        loop {
            // Register interest before scanning so a store that lands between
            // the scan and the wait still wakes us.
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Some(envelope) = self.scan(filter) {
                internal!(envelope_id = %envelope.id(), state = %envelope.state(), "Accepted envelope");
                return Ok(envelope);
            }

            match filter.wait_time() {
                None => changed.await,
                Some(wait) => {
                    tokio::select! {
                        () = &mut changed => {},
                        () = tokio::time::sleep(wait) => {},
                    }
                }
            }
        }
    }
}
