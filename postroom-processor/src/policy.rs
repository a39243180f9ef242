//! Per-stage exception routing.
//!
//! Policies are parsed once when a stage is built. Values are trimmed and
//! case-insensitive; anything that is not a keyword names the processor the
//! failing envelope is handed to.

use std::fmt;

use postroom_common::State;

/// What to do when a stage's matcher fails.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Route to the error processor.
    #[default]
    Error,
    /// Treat the failure as matching nobody.
    NoMatch,
    /// Treat the failure as matching everybody.
    MatchAll,
    Processor(State),
}

impl MatchPolicy {
    /// `None` for a blank value.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "" => None,
            "error" => Some(Self::Error),
            "nomatch" => Some(Self::NoMatch),
            "matchall" => Some(Self::MatchAll),
            other => Some(Self::Processor(State::new(other))),
        }
    }

    /// The state a failing envelope is moved to, if the policy redirects.
    pub fn target(&self) -> Option<State> {
        match self {
            Self::Error => Some(State::ERROR),
            Self::Processor(state) => Some(state.clone()),
            Self::NoMatch | Self::MatchAll => None,
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::NoMatch => f.write_str("nomatch"),
            Self::MatchAll => f.write_str("matchall"),
            Self::Processor(state) => write!(f, "{state}"),
        }
    }
}

/// What to do when a stage's mailet fails.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MailetPolicy {
    /// Route to the error processor.
    #[default]
    Error,
    /// Carry on as if the mailet had succeeded.
    Ignore,
    Processor(State),
}

impl MailetPolicy {
    /// `None` for a blank value.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "" => None,
            "error" => Some(Self::Error),
            "ignore" => Some(Self::Ignore),
            other => Some(Self::Processor(State::new(other))),
        }
    }

    pub fn target(&self) -> Option<State> {
        match self {
            Self::Error => Some(State::ERROR),
            Self::Processor(state) => Some(state.clone()),
            Self::Ignore => None,
        }
    }
}

impl fmt::Display for MailetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Ignore => f.write_str("ignore"),
            Self::Processor(state) => write!(f, "{state}"),
        }
    }
}
