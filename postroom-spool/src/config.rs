use std::sync::Arc;

use serde::Deserialize;

use crate::{backends::MemorySpool, r#trait::SpoolStore};

/// Which spool implementation to run with.
///
/// ```ron
/// Postroom (
///     spool: Memory(
///         capacity: Some(10000),
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum SpoolConfig {
    Memory {
        /// Maximum number of envelopes to hold (omit for unlimited)
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::Memory { capacity: None }
    }
}

impl SpoolConfig {
    #[must_use]
    pub fn into_store(self) -> Arc<dyn SpoolStore> {
        match self {
            Self::Memory { capacity } => capacity.map_or_else(
                || Arc::new(MemorySpool::new()),
                |capacity| Arc::new(MemorySpool::with_capacity(capacity)),
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_config() {
        let config: SpoolConfig = ron::from_str("Memory(capacity: Some(10))").expect("valid ron");
        let SpoolConfig::Memory { capacity } = config;
        assert_eq!(capacity, Some(10));

        let config: SpoolConfig = ron::from_str("Memory(capacity: None)").expect("valid ron");
        let SpoolConfig::Memory { capacity } = config;
        assert_eq!(capacity, None);
    }

    #[test]
    fn test_into_store() {
        let store = SpoolConfig::default().into_store();
        assert!(format!("{store:?}").contains("MemorySpool"));
    }
}
