use std::{
    path::Path,
    sync::{Arc, LazyLock},
};

use postroom_common::{MailAddress, Signal, internal, logging};
use postroom_processor::{
    Loader, LoaderConfig, ManagerConfig, ProcessingContext, ProcessorConfig, ProcessorError,
    ProcessorRegistry, SpoolManager,
};
use postroom_spool::SpoolConfig;
use postroom_tracing::traced;
use serde::Deserialize;
use tokio::sync::broadcast;

mod defaults {
    pub fn server_name() -> String {
        "localhost".to_string()
    }
}

/// Top-level configuration, and the entry point that runs it.
///
/// ```ron
/// Postroom(
///     postmaster: "postmaster@example.com",
///     server_name: "mx.example.com",
///     spool: Memory(capacity: Some(10000)),
///     manager: (threads: 4),
///     processors: [
///         (name: "root", stages: [(mailet: "ToProcessor", params: { "processor": "transport" })]),
///         (name: "transport", stages: [(mailet: "Null")]),
///         (name: "error"),
///     ],
/// )
/// ```
#[derive(Debug, Deserialize)]
pub struct Postroom {
    postmaster: MailAddress,

    #[serde(default = "defaults::server_name")]
    server_name: String,

    #[serde(default)]
    spool: SpoolConfig,

    #[serde(default)]
    manager: ManagerConfig,

    #[serde(default)]
    loader: LoaderConfig,

    #[serde(alias = "processor")]
    processors: Vec<ProcessorConfig>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[traced(instrument(level = tracing::Level::TRACE))]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Postroom {
    /// Reads a RON configuration file.
    ///
    /// # Errors
    ///
    /// The file cannot be read or is not a valid configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;

        ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {}", path.display(), e))
    }

    /// Builds the spool, loads every processor and wires them to a
    /// [`SpoolManager`], without starting it.
    ///
    /// # Errors
    ///
    /// Any processor fails to load, or the processor set is invalid.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all), timing(precision = "ms"))]
    pub fn engine(self) -> Result<Arc<SpoolManager>, ProcessorError> {
        let spool = self.spool.into_store();
        let context = Arc::new(ProcessingContext::new(
            Arc::clone(&spool),
            self.postmaster,
            self.server_name,
        ));

        let loader = Loader::with_builtins(self.loader, context);
        let registry = ProcessorRegistry::from_config(&self.processors, &loader)?;

        Ok(Arc::new(SpoolManager::new(
            spool,
            Arc::new(registry),
            self.manager,
        )))
    }

    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if the processors fail to load, or
    /// the shutdown signal handlers cannot be installed.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "s"))]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let manager = self.engine()?;
        internal!(
            level = INFO,
            processors = ?manager.registry().names(),
            "Controller running"
        );

        let ret = tokio::select! {
            () = Arc::clone(&manager).serve(SHUTDOWN_BROADCAST.subscribe()) => {
                Ok(())
            }
            r = shutdown() => {
                r
            }
        };

        // A forced shutdown skips the manager's own cleanup.
        manager.registry().dispose();
        internal!("Shutting down...");

        ret
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Postroom = ron::from_str(
            r#"Postroom(
                postmaster: "postmaster@example.com",
                processors: [(name: "root"), (name: "error")],
            )"#,
        )
        .unwrap();

        assert_eq!(config.server_name, "localhost");
        assert_eq!(config.manager.error_retry_delay_secs, 300);
        assert_eq!(config.loader.matcher_namespaces, vec![String::new()]);

        let manager = config.engine().unwrap();
        assert_eq!(manager.registry().len(), 2);
    }

    #[test]
    fn test_invalid_postmaster_is_rejected() {
        let parsed = ron::from_str::<Postroom>(
            r#"Postroom(postmaster: "postmaster", processors: [])"#,
        );
        assert!(parsed.is_err());
    }
}
