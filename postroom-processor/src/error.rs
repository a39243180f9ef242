//! Error types for the postroom-processor crate.
//!
//! Matcher and mailet failures never escape [`Processor::service`]: they are
//! resolved by the stage's policy into a state transition on the envelope.
//! [`ProcessorError`] is reserved for misuse of a processor and for failures
//! of the spool it hands envelopes to.
//!
//! [`Processor::service`]: crate::Processor::service

use std::fmt::{self, Write};

use postroom_common::{EnvelopeError, EnvelopeId, MailAddress, State};
use postroom_spool::SpoolError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure while evaluating a matcher.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid condition '{condition}': {reason}")]
    InvalidCondition { condition: String, reason: String },

    /// The matcher selected an address the envelope is not addressed to.
    #[error("Matcher selected {0}, which is not a recipient of the envelope")]
    UnknownRecipient(String),

    #[error("{message}")]
    Source {
        message: String,
        #[source]
        source: BoxError,
    },
}

/// Failure while initialising or running a mailet.
#[derive(Debug, Error)]
pub enum MailetError {
    #[error("{0}")]
    Failed(String),

    #[error("Missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("Invalid value '{value}' for parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    /// The mailet left a live envelope without recipients.
    #[error("Envelope {0} was left without recipients")]
    RecipientViolation(EnvelopeId),

    #[error("Spool operation failed")]
    Spool(#[from] SpoolError),

    #[error("Envelope operation failed")]
    Envelope(#[from] EnvelopeError),

    #[error("{message}")]
    Source {
        message: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Matcher,
    Mailet,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matcher => f.write_str("matcher"),
            Self::Mailet => f.write_str("mailet"),
        }
    }
}

/// Failure to resolve or initialise a matcher or mailet by name.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No {kind} named '{name}' found in namespaces {namespaces:?}")]
    NotFound {
        kind: UnitKind,
        name: String,
        namespaces: Vec<String>,
    },

    #[error("Failed to initialise {kind} '{name}'")]
    Init {
        kind: UnitKind,
        name: String,
        #[source]
        source: BoxError,
    },
}

/// Invalid processor or stage configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Stage {stage} of processor '{processor}' sets both matcher and not_match")]
    MatcherConflict { processor: String, stage: usize },

    #[error("Empty exception policy on stage {stage} of processor '{processor}'")]
    EmptyPolicy { processor: String, stage: usize },

    #[error("Stage {stage} of processor '{processor}' routes exceptions to unknown processor '{target}'")]
    UnknownTarget {
        processor: State,
        stage: usize,
        target: State,
    },

    #[error("Missing required processor '{0}'")]
    MissingProcessor(State),

    #[error("Processor '{0}' is defined more than once")]
    DuplicateProcessor(State),

    #[error("'{0}' is reserved and cannot name a processor")]
    ReservedName(State),
}

/// Misuse of a processor, or a failure that prevents servicing an envelope.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor '{0}' is closed")]
    Closed(State),

    #[error("Processor '{0}' has not been closed")]
    NotClosed(State),

    #[error("Processor '{0}' has been disposed")]
    Disposed(State),

    #[error("Envelope {0} was not accounted for after processing")]
    EnvelopeLost(EnvelopeId),

    #[error("Failed to build processor '{processor}'")]
    Load {
        processor: State,
        #[source]
        source: LoadError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Recipients in `settled` were already stored in split envelopes, or
    /// finished, when the spool failed. The rest of the input is unaccounted
    /// for.
    #[error("Spool handoff failed")]
    Spool {
        #[source]
        source: SpoolError,
        settled: Vec<MailAddress>,
    },
}

/// Renders `err` and its chain of sources the way it is recorded on an
/// envelope: `Exception calling <unit>: <err>`, then one `caused by:` line
/// per source.
pub fn describe(unit: &str, err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = format!("Exception calling {unit}: {err}");

    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(message, "\ncaused by: {cause}");
        source = cause.source();
    }

    message
}
