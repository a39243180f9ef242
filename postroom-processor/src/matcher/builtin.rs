//! Matchers available to every loader.

use ahash::AHashSet;
use postroom_common::{Envelope, MailAddress};

use super::{MatchResult, Matcher, MatcherConfig};
use crate::error::MatchError;

fn parse_addresses(condition: &str) -> Result<AHashSet<MailAddress>, MatchError> {
    condition
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            MailAddress::parse(s).map_err(|err| MatchError::InvalidCondition {
                condition: condition.to_string(),
                reason: err.to_string(),
            })
        })
        .collect()
}

/// Matches every recipient.
#[derive(Debug, Clone, Copy, Default)]
pub struct All;

impl Matcher for All {
    fn matches(&self, _envelope: &Envelope) -> Result<MatchResult, MatchError> {
        Ok(MatchResult::All)
    }

    fn info(&self) -> String {
        "All".to_string()
    }
}

/// `RecipientIs=a@example.com, b@example.com`
#[derive(Debug, Clone, Default)]
pub struct RecipientIs {
    addresses: AHashSet<MailAddress>,
    condition: String,
}

impl RecipientIs {
    pub fn from_addresses(addresses: impl IntoIterator<Item = MailAddress>) -> Self {
        let addresses: AHashSet<MailAddress> = addresses.into_iter().collect();
        let mut condition: Vec<String> = addresses.iter().map(ToString::to_string).collect();
        condition.sort();

        Self {
            addresses,
            condition: condition.join(","),
        }
    }
}

impl Matcher for RecipientIs {
    fn init(&mut self, config: &MatcherConfig) -> Result<(), MatchError> {
        let condition = config.required_condition()?;
        self.addresses = parse_addresses(condition)?;
        self.condition = condition.to_string();
        Ok(())
    }

    fn matches(&self, envelope: &Envelope) -> Result<MatchResult, MatchError> {
        Ok(MatchResult::select(envelope, |r| self.addresses.contains(r)))
    }

    fn info(&self) -> String {
        format!("RecipientIs={}", self.condition)
    }
}

/// `SenderIs=a@example.com`; envelopes without a sender never match.
#[derive(Debug, Clone, Default)]
pub struct SenderIs {
    senders: AHashSet<MailAddress>,
    condition: String,
}

impl Matcher for SenderIs {
    fn init(&mut self, config: &MatcherConfig) -> Result<(), MatchError> {
        let condition = config.required_condition()?;
        self.senders = parse_addresses(condition)?;
        self.condition = condition.to_string();
        Ok(())
    }

    fn matches(&self, envelope: &Envelope) -> Result<MatchResult, MatchError> {
        Ok(MatchResult::when(
            envelope
                .sender()
                .is_some_and(|sender| self.senders.contains(sender)),
        ))
    }

    fn info(&self) -> String {
        format!("SenderIs={}", self.condition)
    }
}

/// `HostIs=example.com, example.org`: recipients at one of the domains.
#[derive(Debug, Clone, Default)]
pub struct HostIs {
    hosts: Vec<String>,
}

impl HostIs {
    pub fn from_hosts<S: AsRef<str>>(hosts: impl IntoIterator<Item = S>) -> Self {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Matcher for HostIs {
    fn init(&mut self, config: &MatcherConfig) -> Result<(), MatchError> {
        self.hosts = config
            .required_condition()?
            .split(',')
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Ok(())
    }

    fn matches(&self, envelope: &Envelope) -> Result<MatchResult, MatchError> {
        Ok(MatchResult::select(envelope, |r| {
            self.hosts.iter().any(|h| r.domain().as_str() == h)
        }))
    }

    fn info(&self) -> String {
        format!("HostIs={}", self.hosts.join(","))
    }
}

/// `HasAttribute=name`
#[derive(Debug, Clone, Default)]
pub struct HasAttribute {
    name: String,
}

impl Matcher for HasAttribute {
    fn init(&mut self, config: &MatcherConfig) -> Result<(), MatchError> {
        config.required_condition()?.clone_into(&mut self.name);
        Ok(())
    }

    fn matches(&self, envelope: &Envelope) -> Result<MatchResult, MatchError> {
        Ok(MatchResult::when(envelope.attribute(&self.name).is_some()))
    }

    fn info(&self) -> String {
        format!("HasAttribute={}", self.name)
    }
}

/// `HasHeader=X-Spam-Flag`
#[derive(Debug, Clone, Default)]
pub struct HasHeader {
    header: String,
}

impl Matcher for HasHeader {
    fn init(&mut self, config: &MatcherConfig) -> Result<(), MatchError> {
        config.required_condition()?.clone_into(&mut self.header);
        Ok(())
    }

    fn matches(&self, envelope: &Envelope) -> Result<MatchResult, MatchError> {
        Ok(MatchResult::when(
            envelope.content().header(&self.header).is_some(),
        ))
    }

    fn info(&self) -> String {
        format!("HasHeader={}", self.header)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use postroom_spool::MemorySpool;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::context::ProcessingContext;

    fn addr(s: &str) -> MailAddress {
        MailAddress::parse(s).unwrap()
    }

    fn config(name: &str, condition: Option<&str>) -> MatcherConfig {
        MatcherConfig {
            name: name.to_string(),
            condition: condition.map(str::to_string),
            context: Arc::new(ProcessingContext::new(
                Arc::new(MemorySpool::new()),
                addr("postmaster@example.com"),
                "mx.example.com",
            )),
        }
    }

    fn envelope() -> Envelope {
        Envelope::new(
            Some(addr("sender@example.org")),
            [addr("a@example.com"), addr("b@example.com"), addr("c@other.net")],
            "Subject: hi\r\nX-Spam-Flag: YES\r\n\r\nbody\r\n",
        )
        .unwrap()
        .with_attribute("scanned", true)
    }

    #[test]
    fn test_recipient_is() {
        let mut matcher = RecipientIs::default();
        matcher
            .init(&config("RecipientIs", Some("a@example.com, C@OTHER.NET")))
            .unwrap();

        assert_eq!(
            matcher.matches(&envelope()).unwrap(),
            MatchResult::Some(vec![addr("a@example.com"), addr("c@other.net")])
        );
    }

    #[test]
    fn test_recipient_is_requires_valid_condition() {
        let mut matcher = RecipientIs::default();
        assert!(matches!(
            matcher.init(&config("RecipientIs", None)),
            Err(MatchError::InvalidCondition { .. })
        ));
        assert!(matches!(
            matcher.init(&config("RecipientIs", Some("not-an-address"))),
            Err(MatchError::InvalidCondition { .. })
        ));
    }

    #[test]
    fn test_sender_is() {
        let mut matcher = SenderIs::default();
        matcher
            .init(&config("SenderIs", Some("sender@example.org")))
            .unwrap();
        assert_eq!(matcher.matches(&envelope()).unwrap(), MatchResult::All);

        let bounce = Envelope::new(None, [addr("a@example.com")], "body").unwrap();
        assert_eq!(matcher.matches(&bounce).unwrap(), MatchResult::None);
    }

    #[test]
    fn test_host_is() {
        let mut matcher = HostIs::default();
        matcher.init(&config("HostIs", Some("Example.com"))).unwrap();
        assert_eq!(
            matcher.matches(&envelope()).unwrap(),
            MatchResult::Some(vec![addr("a@example.com"), addr("b@example.com")])
        );
        assert_eq!(matcher.info(), "HostIs=example.com");
    }

    #[test]
    fn test_has_attribute_and_header() {
        let mut attribute = HasAttribute::default();
        attribute
            .init(&config("HasAttribute", Some("scanned")))
            .unwrap();
        assert_eq!(attribute.matches(&envelope()).unwrap(), MatchResult::All);

        let mut header = HasHeader::default();
        header.init(&config("HasHeader", Some("x-spam-flag"))).unwrap();
        assert_eq!(header.matches(&envelope()).unwrap(), MatchResult::All);

        header.init(&config("HasHeader", Some("X-Virus"))).unwrap();
        assert_eq!(header.matches(&envelope()).unwrap(), MatchResult::None);
    }
}
