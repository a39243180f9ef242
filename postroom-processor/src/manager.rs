//! Fetch-and-dispatch loop between the spool and the processors.

use std::{sync::Arc, time::Duration};

use postroom_common::{Envelope, Signal, State, internal};
use postroom_spool::{SpoolError, SpoolStore};
use postroom_tracing::traced;
use tokio::{sync::broadcast, task::JoinSet};

use crate::{
    config::ManagerConfig,
    error::{ProcessorError, describe},
    registry::ProcessorRegistry,
};

/// Pause after a failed `accept` before asking the spool again.
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Runs a pool of workers that take envelopes from the spool and hand each
/// to the processor registered for its state.
#[derive(Debug)]
pub struct SpoolManager {
    spool: Arc<dyn SpoolStore>,
    registry: Arc<ProcessorRegistry>,
    config: ManagerConfig,
}

impl SpoolManager {
    pub const fn new(
        spool: Arc<dyn SpoolStore>,
        registry: Arc<ProcessorRegistry>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            spool,
            registry,
            config,
        }
    }

    pub const fn spool(&self) -> &Arc<dyn SpoolStore> {
        &self.spool
    }

    pub const fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    /// Serves the spool until a shutdown signal arrives.
    ///
    /// Each worker stops taking new envelopes on shutdown; an envelope that
    /// is already being processed is finished first. The registry's
    /// processors are disposed once every worker has stopped.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing(precision = "s"))]
    pub async fn serve(self: Arc<Self>, shutdown: broadcast::Receiver<Signal>) {
        let threads = self.config.threads.max(1);
        internal!(level = INFO, threads, "Spool manager starting");

        let mut workers = JoinSet::new();
        for worker in 0..threads {
            let manager = Arc::clone(&self);
            let shutdown = shutdown.resubscribe();
            workers.spawn(async move { manager.work(worker, shutdown).await });
        }
        drop(shutdown);

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "Spool manager worker failed");
            }
        }

        self.registry.dispose();
        internal!(level = INFO, "Spool manager stopped");
    }

    async fn work(&self, worker: usize, mut shutdown: broadcast::Receiver<Signal>) {
        let mut filter = self.config.filter();

        loop {
            tokio::select! {
                accepted = self.spool.accept(&mut filter) => match accepted {
                    Ok(envelope) => {
                        let id = envelope.id();
                        if let Err(err) = self.process(envelope).await {
                            tracing::error!(worker, envelope_id = %id, error = %err, "Failed to return envelope to the spool");
                        }
                    }
                    Err(err) => {
                        tracing::error!(worker, error = %err, "Failed to accept from the spool");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!(worker, "Spool manager worker received shutdown signal");
                        }
                        Err(err) => {
                            tracing::error!(worker, error = %err, "Spool manager shutdown channel error");
                        }
                    }
                    break;
                }
            }
        }
    }

    /// Services one locked envelope and settles its spool entry.
    ///
    /// Finished envelopes are removed, everything else is stored back in its
    /// new state and unlocked.
    ///
    /// # Errors
    ///
    /// The spool rejected the final store, remove, or unlock.
    pub async fn process(&self, mut envelope: Envelope) -> Result<(), SpoolError> {
        let id = envelope.id();
        let state = envelope.state().clone();

        match self.registry.get(&state) {
            None => {
                let message = format!("Unable to find processor {state}");
                tracing::error!(envelope_id = %id, state = %state, "{message}");
                envelope.set_error_message(message);
                envelope.set_state(State::ERROR);
            }
            Some(processor) => {
                let fallback = envelope.clone();
                match processor.service(envelope).await {
                    Ok(report) => {
                        internal!(
                            envelope_id = %id,
                            state = %report.original.state(),
                            stored = report.stored.len(),
                            disposed = report.disposed.len(),
                            failures = report.failures.len(),
                            "Serviced envelope"
                        );
                        envelope = report.original;
                    }
                    Err(err) => {
                        let message = describe(&format!("processor {state}"), &err);
                        tracing::error!(envelope_id = %id, state = %state, "{message}");
                        envelope = fallback;

                        // Recipients already handed off stay where they are.
                        if let ProcessorError::Spool { settled, .. } = &err {
                            let remaining: Vec<_> = envelope
                                .recipients()
                                .iter()
                                .filter(|recipient| !settled.contains(recipient))
                                .cloned()
                                .collect();
                            if remaining.is_empty() {
                                return self.spool.remove(&id).await;
                            }
                            envelope.set_recipients(remaining);
                        }

                        envelope.set_error_message(message);
                        envelope.set_state(State::ERROR);
                    }
                }
            }
        }

        if envelope.state().is_ghost() {
            return self.spool.remove(&id).await;
        }

        // The retry delay counts from the moment the envelope is put back.
        envelope.touch();
        self.spool.store(&envelope).await?;
        self.spool.unlock(&id).await
    }
}
