use async_trait::async_trait;
use postroom_common::{Envelope, EnvelopeId};

use crate::filter::AcceptFilter;

/// Key-addressable store of pending envelopes.
///
/// Entries carry a lock flag so that several consumers can draw from the same
/// spool: [`SpoolStore::accept`] only hands out unlocked entries and locks
/// them before returning. Whoever holds the lock is expected to either
/// [`remove`](SpoolStore::remove) the entry or [`store`](SpoolStore::store)
/// its new version and then [`unlock`](SpoolStore::unlock) it.
#[async_trait]
pub trait SpoolStore: Send + Sync + std::fmt::Debug {
    /// Persist `envelope` under its own id, replacing any previous version.
    ///
    /// Storing an entry keeps its lock state; new entries start unlocked.
    async fn store(&self, envelope: &Envelope) -> crate::Result<EnvelopeId>;

    async fn retrieve(&self, id: &EnvelopeId) -> crate::Result<Envelope>;

    async fn remove(&self, id: &EnvelopeId) -> crate::Result<()>;

    /// Ids of every stored entry, oldest first.
    async fn list(&self) -> crate::Result<Vec<EnvelopeId>>;

    /// Try to take the lock on an entry. `Ok(false)` if someone else holds it.
    async fn lock(&self, id: &EnvelopeId) -> crate::Result<bool>;

    async fn unlock(&self, id: &EnvelopeId) -> crate::Result<()>;

    /// Block until an unlocked entry satisfies `filter`, then lock and return it.
    ///
    /// While nothing is eligible the call waits for the spool to change, or
    /// for [`AcceptFilter::wait_time`] to elapse when the filter deferred an
    /// entry. Dropping the future cancels the wait.
    async fn accept(&self, filter: &mut (dyn AcceptFilter + Send)) -> crate::Result<Envelope>;
}
