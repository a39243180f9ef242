//! The unit of work flowing through the processing pipeline.

use std::{sync::Arc, time::SystemTime};

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::{
    address::MailAddress, attribute::AttributeValue, content::MessageContent,
    error::EnvelopeError, id::EnvelopeId, state::State,
};

/// One message instance at one point in the pipeline.
///
/// Recipients behave as a set: duplicates are dropped on insertion, and
/// ordering carries no meaning. Content is reference counted so that envelopes
/// produced by [`Envelope::split`] share it until one of them writes through
/// [`Envelope::content_mut`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    id: EnvelopeId,
    parent: Option<EnvelopeId>,
    sender: Option<MailAddress>,
    recipients: Vec<MailAddress>,
    content: Arc<MessageContent>,
    state: State,
    error_message: Option<String>,
    attributes: AHashMap<String, AttributeValue>,
    last_updated: SystemTime,
}

impl Envelope {
    /// A fresh envelope in the [`State::ROOT`] state.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::NoRecipients`] if `recipients` is empty.
    pub fn new(
        sender: Option<MailAddress>,
        recipients: impl IntoIterator<Item = MailAddress>,
        content: impl Into<MessageContent>,
    ) -> Result<Self, EnvelopeError> {
        let id = EnvelopeId::generate();
        let recipients = dedup(recipients);
        if recipients.is_empty() {
            return Err(EnvelopeError::NoRecipients(id.to_string()));
        }

        Ok(Self {
            id,
            parent: None,
            sender,
            recipients,
            content: Arc::new(content.into()),
            state: State::ROOT,
            error_message: None,
            attributes: AHashMap::new(),
            last_updated: SystemTime::now(),
        })
    }

    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.set_state(state);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn id(&self) -> EnvelopeId {
        self.id
    }

    /// The envelope this one was split from, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<EnvelopeId> {
        self.parent
    }

    #[must_use]
    pub const fn sender(&self) -> Option<&MailAddress> {
        self.sender.as_ref()
    }

    #[must_use]
    pub fn recipients(&self) -> &[MailAddress] {
        &self.recipients
    }

    /// Replaces the recipient set. An empty set is allowed here so that a
    /// mailet can hand back a finished envelope; the pipeline rejects it
    /// unless the envelope is also ghosted.
    pub fn set_recipients(&mut self, recipients: impl IntoIterator<Item = MailAddress>) {
        self.recipients = dedup(recipients);
    }

    /// Returns `false` if the recipient was already present.
    pub fn add_recipient(&mut self, recipient: MailAddress) -> bool {
        if self.recipients.contains(&recipient) {
            return false;
        }

        self.recipients.push(recipient);
        true
    }

    /// Returns `false` if the recipient was not present.
    pub fn remove_recipient(&mut self, recipient: &MailAddress) -> bool {
        let before = self.recipients.len();
        self.recipients.retain(|r| r != recipient);
        before != self.recipients.len()
    }

    #[must_use]
    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    /// Mutable access to the content, cloning it first if another envelope
    /// still shares it.
    pub fn content_mut(&mut self) -> &mut MessageContent {
        Arc::make_mut(&mut self.content)
    }

    /// Whether both envelopes currently reference the same content.
    #[must_use]
    pub fn shares_content_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.content, &other.content)
    }

    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    pub fn set_state(&mut self, state: State) {
        self.state = state;
        self.touch();
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_error_message(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    pub fn clear_error_message(&mut self) {
        self.error_message = None;
    }

    #[must_use]
    pub const fn attributes(&self) -> &AHashMap<String, AttributeValue> {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Option<AttributeValue> {
        self.attributes.insert(key.into(), value.into())
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<AttributeValue> {
        self.attributes.remove(key)
    }

    /// When the envelope last changed state or was explicitly touched.
    #[must_use]
    pub const fn last_updated(&self) -> SystemTime {
        self.last_updated
    }

    pub fn touch(&mut self) {
        self.last_updated = SystemTime::now();
    }

    /// Narrows this envelope to `matched`, returning a copy addressed to the
    /// remaining recipients.
    ///
    /// The copy gets a new id, records this envelope as its parent, keeps the
    /// current state, attributes and error message, and shares the content.
    /// `Ok(None)` means `matched` already covers every recipient and nothing
    /// was split off.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::NoRecipients`] when `matched` is empty.
    /// - [`EnvelopeError::UnknownRecipient`] when `matched` names an address
    ///   this envelope is not addressed to. The envelope is left untouched.
    pub fn split(&mut self, matched: &[MailAddress]) -> Result<Option<Self>, EnvelopeError> {
        let matched = dedup(matched.iter().cloned());
        if matched.is_empty() {
            return Err(EnvelopeError::NoRecipients(self.id.to_string()));
        }

        if let Some(unknown) = matched.iter().find(|m| !self.recipients.contains(m)) {
            return Err(EnvelopeError::UnknownRecipient {
                envelope: self.id.to_string(),
                recipient: unknown.to_string(),
            });
        }

        let rest: Vec<MailAddress> = self
            .recipients
            .iter()
            .filter(|r| !matched.contains(r))
            .cloned()
            .collect();

        if rest.is_empty() {
            return Ok(None);
        }

        self.recipients = matched;

        Ok(Some(Self {
            id: EnvelopeId::generate(),
            parent: Some(self.id),
            sender: self.sender.clone(),
            recipients: rest,
            content: Arc::clone(&self.content),
            state: self.state.clone(),
            error_message: self.error_message.clone(),
            attributes: self.attributes.clone(),
            last_updated: self.last_updated,
        }))
    }
}

fn dedup(recipients: impl IntoIterator<Item = MailAddress>) -> Vec<MailAddress> {
    let mut seen = AHashSet::new();
    recipients
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn addr(s: &str) -> MailAddress {
        MailAddress::parse(s).expect("valid address")
    }

    fn envelope(recipients: &[&str]) -> Envelope {
        Envelope::new(
            Some(addr("sender@example.com")),
            recipients.iter().map(|r| addr(r)),
            "Subject: test\r\n\r\nbody\r\n",
        )
        .expect("non-empty recipients")
    }

    #[test]
    fn test_new_rejects_empty_recipients() {
        let result = Envelope::new(None, Vec::new(), "body");
        assert!(matches!(result, Err(EnvelopeError::NoRecipients(_))));
    }

    #[test]
    fn test_recipients_are_deduplicated() {
        let mut env = envelope(&["a@x.org", "A@X.ORG", "b@x.org"]);
        assert_eq!(env.recipients().len(), 2);
        assert!(!env.add_recipient(addr("b@x.org")));
        assert!(env.add_recipient(addr("c@x.org")));
        assert!(env.remove_recipient(&addr("a@x.org")));
        assert!(!env.remove_recipient(&addr("a@x.org")));
        assert_eq!(env.recipients(), &[addr("b@x.org"), addr("c@x.org")]);
    }

    #[test]
    fn test_split_partitions_recipients() {
        let mut env = envelope(&["a@x.org", "b@x.org", "c@x.org"]).with_attribute("k", "v");

        let rest = env
            .split(&[addr("a@x.org")])
            .expect("valid split")
            .expect("proper subset");

        assert_eq!(env.recipients(), &[addr("a@x.org")]);
        assert_eq!(rest.recipients(), &[addr("b@x.org"), addr("c@x.org")]);
        assert_ne!(rest.id(), env.id());
        assert_eq!(rest.parent(), Some(env.id()));
        assert_eq!(rest.state(), env.state());
        assert_eq!(rest.attribute("k"), Some(&AttributeValue::from("v")));
        assert!(rest.shares_content_with(&env));
    }

    #[test]
    fn test_split_full_set_is_noop() {
        let mut env = envelope(&["a@x.org", "b@x.org"]);
        let split = env
            .split(&[addr("b@x.org"), addr("a@x.org")])
            .expect("valid split");
        assert!(split.is_none());
        assert_eq!(env.recipients().len(), 2);
    }

    #[test]
    fn test_split_rejects_foreign_and_empty() {
        let mut env = envelope(&["a@x.org"]);
        assert!(matches!(
            env.split(&[addr("z@x.org")]),
            Err(EnvelopeError::UnknownRecipient { .. })
        ));
        assert!(matches!(env.split(&[]), Err(EnvelopeError::NoRecipients(_))));
        assert_eq!(env.recipients(), &[addr("a@x.org")]);
    }

    #[test]
    fn test_content_copy_on_write() {
        let mut env = envelope(&["a@x.org", "b@x.org"]);
        let rest = env.split(&[addr("a@x.org")]).unwrap().unwrap();
        assert!(env.shares_content_with(&rest));

        env.content_mut().prepend_header("X-Seen", "1");

        assert!(!env.shares_content_with(&rest));
        assert_eq!(env.content().header("X-Seen").as_deref(), Some("1"));
        assert_eq!(rest.content().header("X-Seen"), None);
    }

    #[test]
    fn test_set_state_touches() {
        let mut env = envelope(&["a@x.org"]);
        let before = env.last_updated();
        env.set_state(State::ERROR);
        assert_eq!(env.state(), &State::ERROR);
        assert!(env.last_updated() >= before);
    }
}
