//! The set of processors an engine runs, keyed by the state they serve.

use std::sync::Arc;

use ahash::AHashMap;
use postroom_common::{State, internal};

use crate::{
    config::ProcessorConfig,
    error::{ConfigError, ProcessorError},
    loader::Loader,
    processor::Processor,
};

/// A validated, immutable map from state to processor.
///
/// Validation guarantees that `root` and `error` exist, that `ghost` is not
/// claimed, and that every exception policy routes to `error`, `ghost`, or a
/// registered processor.
#[derive(Debug)]
pub struct ProcessorRegistry {
    processors: AHashMap<State, Arc<Processor>>,
}

impl ProcessorRegistry {
    /// # Errors
    ///
    /// [`ProcessorError::NotClosed`] for an open processor and
    /// [`ProcessorError::Config`] for any validation failure.
    pub fn new(processors: impl IntoIterator<Item = Processor>) -> Result<Self, ProcessorError> {
        let mut registered = AHashMap::new();

        for processor in processors {
            let name = processor.name().clone();
            if name.is_ghost() {
                return Err(ConfigError::ReservedName(name).into());
            }
            if !processor.is_closed() {
                return Err(ProcessorError::NotClosed(name));
            }
            if registered.contains_key(&name) {
                return Err(ConfigError::DuplicateProcessor(name).into());
            }

            registered.insert(name, Arc::new(processor));
        }

        for required in [State::ROOT, State::ERROR] {
            if !registered.contains_key(&required) {
                return Err(ConfigError::MissingProcessor(required).into());
            }
        }

        for processor in registered.values() {
            for (stage, target) in processor.policy_targets() {
                if !target.is_ghost() && !registered.contains_key(&target) {
                    return Err(ConfigError::UnknownTarget {
                        processor: processor.name().clone(),
                        stage,
                        target,
                    }
                    .into());
                }
            }
        }

        let registry = Self {
            processors: registered,
        };
        internal!(level = DEBUG, processors = ?registry.names(), "Registered processors");

        Ok(registry)
    }

    /// Builds every configured processor, then validates the set.
    ///
    /// # Errors
    ///
    /// The first processor that fails to build, or a validation failure.
    pub fn from_config(configs: &[ProcessorConfig], loader: &Loader) -> Result<Self, ProcessorError> {
        let processors = configs
            .iter()
            .map(|config| Processor::from_config(config, loader))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(processors)
    }

    pub fn get(&self, state: &State) -> Option<&Arc<Processor>> {
        self.processors.get(state)
    }

    /// Registered states, sorted.
    pub fn names(&self) -> Vec<State> {
        let mut names: Vec<_> = self.processors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Disposes every processor, `root` first and `error` last so the
    /// fallback stays usable the longest.
    pub fn dispose(&self) {
        let mut names = self.names();
        names.sort_by_key(|name| (*name != State::ROOT, *name == State::ERROR));

        for name in names {
            if let Some(processor) = self.processors.get(&name) {
                processor.dispose();
            }
        }
    }
}
