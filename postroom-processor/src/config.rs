//! Configuration surface of the processing core.
//!
//! ```ron
//! processors: [
//!     (
//!         name: "root",
//!         stages: [
//!             (matcher: Some("RecipientIs=abuse@example.com"), mailet: "ToProcessor",
//!              params: { "processor": "abuse" }),
//!             (mailet: "ToProcessor", params: { "processor": "transport" },
//!              on_mailet_exception: Some("error")),
//!         ],
//!     ),
//! ]
//! ```

use std::time::Duration;

use ahash::AHashMap;
use postroom_common::State;
use postroom_spool::DelayFilter;
use serde::Deserialize;

mod defaults {
    pub const fn error_retry_delay_secs() -> u64 {
        300
    }

    pub fn threads() -> usize {
        num_cpus::get().max(1)
    }

    pub fn namespaces() -> Vec<String> {
        vec![String::new()]
    }
}

/// One matcher/mailet pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageConfig {
    /// Matcher spec, `Name` or `Name=condition`. Neither this nor
    /// `not_match` means `All`.
    #[serde(default)]
    pub matcher: Option<String>,

    /// Matcher spec whose result is inverted.
    #[serde(default)]
    pub not_match: Option<String>,

    pub mailet: String,

    #[serde(default)]
    pub params: AHashMap<String, String>,

    #[serde(default)]
    pub on_match_exception: Option<String>,

    #[serde(default)]
    pub on_mailet_exception: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    pub name: String,

    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

/// Prefixes tried, in order, when resolving unit names.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "defaults::namespaces")]
    pub matcher_namespaces: Vec<String>,

    #[serde(default = "defaults::namespaces")]
    pub mailet_namespaces: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            matcher_namespaces: defaults::namespaces(),
            mailet_namespaces: defaults::namespaces(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// Number of worker tasks pulling from the spool
    #[serde(default = "defaults::threads")]
    pub threads: usize,

    /// How long an envelope in the error state rests before it is retried
    #[serde(default = "defaults::error_retry_delay_secs")]
    pub error_retry_delay_secs: u64,

    /// Additional states to hold back, with their delay in seconds
    #[serde(default)]
    pub retry_delays: AHashMap<String, u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            threads: defaults::threads(),
            error_retry_delay_secs: defaults::error_retry_delay_secs(),
            retry_delays: AHashMap::new(),
        }
    }
}

impl ManagerConfig {
    /// The acceptance filter a worker uses against the spool.
    #[must_use]
    pub fn filter(&self) -> DelayFilter {
        self.retry_delays.iter().fold(
            DelayFilter::new(Duration::from_secs(self.error_retry_delay_secs)),
            |filter, (state, secs)| filter.with_delay(State::new(state), Duration::from_secs(*secs)),
        )
    }
}
