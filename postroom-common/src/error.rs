//! Error types for the postroom-common crate.

use thiserror::Error;

/// Errors produced while parsing a mailbox address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Address exceeds 256 octets")]
    TooLong,

    #[error("Local-part exceeds 64 octets")]
    LocalPartTooLong,

    #[error("Domain exceeds 255 octets")]
    DomainTooLong,

    #[error("Missing '@' separator in {0}")]
    MissingAtSign(String),

    #[error("Unbalanced angle brackets in {0}")]
    UnbalancedBrackets(String),

    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
}

/// Errors raised by envelope mutations that would break its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Live envelopes always carry at least one recipient.
    #[error("Envelope {0} would be left without recipients")]
    NoRecipients(String),

    /// The recipients given to a split are not all present on the envelope.
    #[error("Recipient {recipient} is not addressed by envelope {envelope}")]
    UnknownRecipient { envelope: String, recipient: String },
}
