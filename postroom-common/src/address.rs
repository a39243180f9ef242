//! Mailbox addresses carried on an envelope.
//!
//! Parsing follows the RFC 5321 mailbox grammar:
//!
//! ```text
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Domain         = sub-domain *("." sub-domain)
//! sub-domain     = Let-dig [Ldh-str]
//! ```
//!
//! Angle brackets around the mailbox are accepted and stripped. Domains are
//! stored lowercased; local-parts are kept verbatim for display but compare
//! case-insensitively.

use std::{
    cmp::Ordering,
    fmt::{self, Display},
    hash::{Hash, Hasher},
    ops::Deref,
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

const MAX_ADDRESS: usize = 256;
const MAX_LOCAL_PART: usize = 64;
const MAX_DOMAIN: usize = 255;

/// A domain name, always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Domain(Arc<str>);

impl Domain {
    #[must_use]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this domain is `other` or a subdomain of it.
    #[must_use]
    pub fn is_within(&self, other: &str) -> bool {
        let other = other.trim_start_matches('.');
        self.0.eq_ignore_ascii_case(other)
            || (self.0.len() > other.len()
                && self.0.as_bytes()[self.0.len() - other.len() - 1] == b'.'
                && self.0[self.0.len() - other.len()..].eq_ignore_ascii_case(other))
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A validated `local-part@domain` mailbox.
///
/// Equality, hashing and ordering ignore ASCII case in the local-part, so
/// `Alice@example.com` and `alice@EXAMPLE.com` are the same recipient.
#[derive(Debug, Clone)]
pub struct MailAddress {
    local_part: Arc<str>,
    folded: Arc<str>,
    domain: Domain,
}

impl MailAddress {
    fn key(&self) -> (&str, &Domain) {
        (&self.folded, &self.domain)
    }
}

impl PartialEq for MailAddress {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MailAddress {}

impl Hash for MailAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for MailAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MailAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl MailAddress {
    /// Parse a mailbox, optionally wrapped in angle brackets.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] describing the first grammar violation.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        if trimmed.len() > MAX_ADDRESS {
            return Err(AddressError::TooLong);
        }

        let mailbox = match (trimmed.starts_with('<'), trimmed.ends_with('>')) {
            (true, true) => &trimmed[1..trimmed.len() - 1],
            (false, false) => trimmed,
            _ => return Err(AddressError::UnbalancedBrackets(trimmed.to_string())),
        };

        let at = find_unquoted_at(mailbox)
            .ok_or_else(|| AddressError::MissingAtSign(mailbox.to_string()))?;
        let (local_part, domain) = (&mailbox[..at], &mailbox[at + 1..]);

        if local_part.len() > MAX_LOCAL_PART {
            return Err(AddressError::LocalPartTooLong);
        }
        if domain.len() > MAX_DOMAIN {
            return Err(AddressError::DomainTooLong);
        }

        validate_local_part(local_part)?;
        validate_domain(domain)?;

        Ok(Self {
            local_part: Arc::from(local_part),
            folded: Arc::from(local_part.to_ascii_lowercase()),
            domain: Domain::new(domain),
        })
    }

    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    #[must_use]
    pub const fn domain(&self) -> &Domain {
        &self.domain
    }
}

impl Display for MailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl FromStr for MailAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MailAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Position of the `@` that is outside any quoted string or address literal
fn find_unquoted_at(input: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;

    for (i, ch) in input.char_indices() {
        match ch {
            '"' if !escaped && !in_brackets => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            '@' if !in_quotes && !in_brackets => return Some(i),
            _ => {}
        }

        escaped = ch == '\\' && !escaped;
    }

    None
}

const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

fn validate_local_part(input: &str) -> Result<(), AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart(
            "empty local-part".to_string(),
        ));
    }

    if let Some(quoted) = input.strip_prefix('"') {
        let Some(content) = quoted.strip_suffix('"') else {
            return Err(AddressError::InvalidLocalPart(format!(
                "unclosed quoted string {input}"
            )));
        };

        let mut chars = content.chars();
        while let Some(ch) = chars.next() {
            let valid = match ch {
                '\\' => chars.next().is_some_and(|next| (' '..='~').contains(&next)),
                '"' => false,
                _ => (' '..='~').contains(&ch),
            };
            if !valid {
                return Err(AddressError::InvalidLocalPart(format!(
                    "invalid character in quoted string {input}"
                )));
            }
        }

        return Ok(());
    }

    if input.split('.').any(str::is_empty) {
        return Err(AddressError::InvalidLocalPart(format!(
            "misplaced '.' in {input}"
        )));
    }

    match input.chars().find(|&ch| ch != '.' && !is_atext(ch)) {
        Some(ch) => Err(AddressError::InvalidLocalPart(format!(
            "invalid character '{ch}' in {input}"
        ))),
        None => Ok(()),
    }
}

fn validate_domain(input: &str) -> Result<(), AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("empty domain".to_string()));
    }

    if let Some(literal) = input.strip_prefix('[') {
        let content = literal
            .strip_suffix(']')
            .ok_or_else(|| AddressError::InvalidDomain(format!("unclosed literal {input}")))?;

        let valid = content.parse::<std::net::Ipv4Addr>().is_ok()
            || content
                .strip_prefix("IPv6:")
                .is_some_and(|v6| v6.parse::<std::net::Ipv6Addr>().is_ok());

        return if valid {
            Ok(())
        } else {
            Err(AddressError::InvalidDomain(format!(
                "invalid address literal {input}"
            )))
        };
    }

    for label in input.split('.') {
        let well_formed = !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
            && !label.starts_with('-')
            && !label.ends_with('-');

        if !well_formed {
            return Err(AddressError::InvalidDomain(format!(
                "invalid label '{label}' in {input}"
            )));
        }
    }

    Ok(())
}
