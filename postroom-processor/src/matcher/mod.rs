//! The matcher contract.
//!
//! A matcher selects which of an envelope's recipients a stage's mailet
//! applies to. It must not modify the envelope.

pub mod builtin;
mod invert;

use std::sync::Arc;

use postroom_common::{Envelope, MailAddress};

pub use invert::Inverted;

use crate::{context::ProcessingContext, error::MatchError};

/// Outcome of a successful match.
///
/// Matching every recipient is spelled out as [`MatchResult::All`] so the
/// engine knows no split is needed without comparing sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    All,
    Some(Vec<MailAddress>),
    None,
}

impl MatchResult {
    /// Canonical form against `envelope`: an empty selection becomes `None`,
    /// a selection of every recipient becomes `All`, and duplicates are
    /// dropped.
    ///
    /// # Errors
    ///
    /// [`MatchError::UnknownRecipient`] if the selection names an address the
    /// envelope is not addressed to.
    pub fn normalise(self, envelope: &Envelope) -> Result<Self, MatchError> {
        let Self::Some(mut selected) = self else {
            return Ok(self);
        };

        if let Some(unknown) = selected
            .iter()
            .find(|s| !envelope.recipients().contains(s))
        {
            return Err(MatchError::UnknownRecipient(unknown.to_string()));
        }

        selected.sort();
        selected.dedup();

        Ok(if selected.is_empty() {
            Self::None
        } else if selected.len() == envelope.recipients().len() {
            Self::All
        } else {
            Self::Some(selected)
        })
    }

    /// Builds a result from the recipients satisfying `predicate`.
    pub fn select(envelope: &Envelope, predicate: impl Fn(&MailAddress) -> bool) -> Self {
        let selected: Vec<MailAddress> = envelope
            .recipients()
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect();

        if selected.is_empty() {
            Self::None
        } else if selected.len() == envelope.recipients().len() {
            Self::All
        } else {
            Self::Some(selected)
        }
    }

    /// `All` when `matched`, otherwise `None`.
    pub const fn when(matched: bool) -> Self {
        if matched { Self::All } else { Self::None }
    }
}

/// What a matcher is given at initialisation.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub name: String,
    /// Everything after the first `=` of the matcher spec.
    pub condition: Option<String>,
    pub context: Arc<ProcessingContext>,
}

impl MatcherConfig {
    /// The condition, or an error naming the matcher if none was given.
    ///
    /// # Errors
    ///
    /// [`MatchError::InvalidCondition`] when the condition is absent or blank.
    pub fn required_condition(&self) -> Result<&str, MatchError> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| MatchError::InvalidCondition {
                condition: String::new(),
                reason: format!("{} requires a condition", self.name),
            })
    }
}

pub trait Matcher: Send + Sync {
    /// Called once, before the first call to [`Matcher::matches`].
    ///
    /// # Errors
    ///
    /// Fails when the configuration is unusable; the processor being built
    /// is abandoned.
    fn init(&mut self, _config: &MatcherConfig) -> Result<(), MatchError> {
        Ok(())
    }

    /// Selects the recipients of `envelope` this stage applies to.
    ///
    /// # Errors
    ///
    /// Any failure is routed through the stage's match exception policy.
    fn matches(&self, envelope: &Envelope) -> Result<MatchResult, MatchError>;

    /// Short description used in logs and error messages.
    fn info(&self) -> String;
}
