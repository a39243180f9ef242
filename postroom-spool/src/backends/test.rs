use std::sync::Arc;

use async_trait::async_trait;
use postroom_common::{Envelope, EnvelopeId};
use tokio::sync::Notify;

use super::memory::MemorySpool;
use crate::{SpoolError, filter::AcceptFilter, r#trait::SpoolStore};

/// Memory spool with hooks for tests.
///
/// Every `store` and `remove` pings a [`Notify`], so a test can wait for the
/// spool to reach an expected size instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct TestSpool {
    pub(crate) inner: MemorySpool,
    notify: Arc<Notify>,
}

impl TestSpool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until at least `expected` envelopes are stored, with timeout.
    ///
    /// # Errors
    /// Returns an error if the timeout is reached before the expected count
    pub async fn wait_for_count(
        &self,
        expected: usize,
        timeout: std::time::Duration,
    ) -> crate::Result<()> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.inner.len() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
        .map_err(|e| SpoolError::Internal(format!("Timeout waiting for envelopes: {e}")))
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn message_count(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_locked(&self, id: &EnvelopeId) -> bool {
        self.inner.is_locked(id)
    }

    /// Every stored envelope, oldest first.
    ///
    /// # Errors
    /// If an entry disappears while the spool is being read
    pub async fn envelopes(&self) -> crate::Result<Vec<Envelope>> {
        let mut envelopes = Vec::new();
        for id in self.inner.list().await? {
            envelopes.push(self.inner.retrieve(&id).await?);
        }
        Ok(envelopes)
    }
}

#[async_trait]
impl SpoolStore for TestSpool {
    async fn store(&self, envelope: &Envelope) -> crate::Result<EnvelopeId> {
        let id = self.inner.store(envelope).await?;
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn retrieve(&self, id: &EnvelopeId) -> crate::Result<Envelope> {
        self.inner.retrieve(id).await
    }

    async fn remove(&self, id: &EnvelopeId) -> crate::Result<()> {
        self.inner.remove(id).await?;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn list(&self) -> crate::Result<Vec<EnvelopeId>> {
        self.inner.list().await
    }

    async fn lock(&self, id: &EnvelopeId) -> crate::Result<bool> {
        self.inner.lock(id).await
    }

    async fn unlock(&self, id: &EnvelopeId) -> crate::Result<()> {
        self.inner.unlock(id).await
    }

    async fn accept(&self, filter: &mut (dyn AcceptFilter + Send)) -> crate::Result<Envelope> {
        self.inner.accept(filter).await
    }
}
