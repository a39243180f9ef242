use postroom_common::Envelope;

use super::{MatchResult, Matcher, MatcherConfig};
use crate::error::MatchError;

/// Swaps the matched and unmatched recipients of the wrapped matcher.
pub struct Inverted {
    inner: Box<dyn Matcher>,
}

impl Inverted {
    pub fn new(inner: Box<dyn Matcher>) -> Self {
        Self { inner }
    }
}

impl Matcher for Inverted {
    fn init(&mut self, config: &MatcherConfig) -> Result<(), MatchError> {
        self.inner.init(config)
    }

    fn matches(&self, envelope: &Envelope) -> Result<MatchResult, MatchError> {
        Ok(match self.inner.matches(envelope)?.normalise(envelope)? {
            MatchResult::All => MatchResult::None,
            MatchResult::None => MatchResult::All,
            MatchResult::Some(matched) => {
                MatchResult::select(envelope, |recipient| !matched.contains(recipient))
            }
        })
    }

    fn info(&self) -> String {
        format!("Not({})", self.inner.info())
    }
}
