//! RFC 5322 message content.
//!
//! Content is immutable once an envelope holds it behind an `Arc`; writers go
//! through [`crate::Envelope::content_mut`], which clones the bytes only when
//! another envelope still shares them.

use std::fmt;

use mailparse::MailHeaderMap;

/// Raw message bytes with header-level accessors.
#[derive(Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageContent {
    raw: Vec<u8>,
}

impl MessageContent {
    #[must_use]
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self { raw: raw.into() }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// First value of the header `name`, case-insensitively.
    ///
    /// Returns `None` when the header is absent or the header block cannot be
    /// parsed.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        let (headers, _) = mailparse::parse_headers(&self.raw).ok()?;
        headers.get_first_value(name)
    }

    /// All header fields in order of appearance.
    ///
    /// # Errors
    ///
    /// Fails when the header block is malformed.
    pub fn headers(&self) -> Result<Vec<(String, String)>, mailparse::MailParseError> {
        let (headers, _) = mailparse::parse_headers(&self.raw)?;
        Ok(headers
            .iter()
            .map(|h| (h.get_key(), h.get_value()))
            .collect())
    }

    /// Everything after the blank line separating headers from the body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        mailparse::parse_headers(&self.raw)
            .map_or(&self.raw[self.raw.len()..], |(_, offset)| &self.raw[offset..])
    }

    /// Prepends a header field, the way trace fields are added.
    pub fn prepend_header(&mut self, name: &str, value: &str) {
        let mut raw = Vec::with_capacity(name.len() + value.len() + 4 + self.raw.len());
        raw.extend_from_slice(name.as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(value.as_bytes());
        raw.extend_from_slice(b"\r\n");
        raw.extend_from_slice(&self.raw);
        self.raw = raw;
    }
}

impl fmt::Debug for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContent")
            .field("len", &self.raw.len())
            .finish()
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<Vec<u8>> for MessageContent {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const MESSAGE: &str = "Subject: Greetings\r\nFrom: alice@example.com\r\n\r\nHello there\r\n";

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let content = MessageContent::from(MESSAGE);
        assert_eq!(content.header("subject").as_deref(), Some("Greetings"));
        assert_eq!(content.header("X-Missing"), None);
    }

    #[test]
    fn test_prepend_header() {
        let mut content = MessageContent::from(MESSAGE);
        content.prepend_header("X-Processed", "yes");

        let headers = content.headers().expect("parsable headers");
        assert_eq!(headers[0], ("X-Processed".to_string(), "yes".to_string()));
        assert_eq!(headers.len(), 3);
        assert_eq!(content.body(), b"Hello there\r\n");
    }
}
