//! The postroom processing core.
//!
//! Envelopes taken from the spool are serviced by the [`Processor`]
//! registered for their state. A processor walks its ordered
//! [`Matcher`]/[`Mailet`] stages, splitting an envelope whenever a matcher
//! selects only part of its recipients, and hands every copy whose state
//! changes back to the spool for the next processor to pick up.

pub mod config;
pub mod context;
pub mod error;
pub mod loader;
pub mod mailet;
pub mod manager;
pub mod matcher;
pub mod policy;
pub mod processor;
pub mod registry;

pub use config::{LoaderConfig, ManagerConfig, ProcessorConfig, StageConfig};
pub use context::ProcessingContext;
pub use error::{ConfigError, LoadError, MailetError, MatchError, ProcessorError, UnitKind};
pub use loader::Loader;
pub use mailet::{Mailet, MailetConfig};
pub use manager::SpoolManager;
pub use matcher::{MatchResult, Matcher, MatcherConfig};
pub use policy::{MailetPolicy, MatchPolicy};
pub use processor::{Disposal, Processor, ServiceReport, Stage, StageFailure, StageInfo};
pub use registry::ProcessorRegistry;
