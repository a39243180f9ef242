//! Mailets available to every loader.

use std::{fmt::Write, sync::Arc};

use async_trait::async_trait;
use postroom_common::{AttributeValue, Envelope, State, pipeline};

use super::{Mailet, MailetConfig};
use crate::{context::ProcessingContext, error::MailetError};

/// Finishes the envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct Null;

#[async_trait]
impl Mailet for Null {
    async fn service(&self, envelope: &mut Envelope) -> Result<(), MailetError> {
        envelope.set_state(State::GHOST);
        Ok(())
    }

    fn info(&self) -> String {
        "Null".to_string()
    }
}

/// Hands the envelope to another processor.
///
/// Parameters: `processor` (required), `notice` (recorded as the error
/// message).
#[derive(Debug, Clone, Default)]
pub struct ToProcessor {
    processor: State,
    notice: Option<String>,
}

impl ToProcessor {
    pub fn new(processor: State) -> Self {
        Self {
            processor,
            notice: None,
        }
    }
}

#[async_trait]
impl Mailet for ToProcessor {
    fn init(&mut self, config: &MailetConfig) -> Result<(), MailetError> {
        let processor = config.required("processor")?;
        if processor.trim().is_empty() {
            return Err(MailetError::InvalidParameter {
                name: "processor".to_string(),
                value: processor.to_string(),
                reason: "processor name cannot be empty".to_string(),
            });
        }

        self.processor = State::new(processor);
        self.notice = config.param("notice").map(str::to_string);
        Ok(())
    }

    async fn service(&self, envelope: &mut Envelope) -> Result<(), MailetError> {
        if let Some(notice) = &self.notice {
            envelope.set_error_message(notice.clone());
        }
        envelope.set_state(self.processor.clone());
        Ok(())
    }

    fn info(&self) -> String {
        format!("ToProcessor({})", self.processor)
    }
}

/// Sets one attribute per parameter. Values are typed by their text:
/// booleans, integers and floats are recognised, anything else is text.
#[derive(Debug, Clone, Default)]
pub struct SetAttribute {
    attributes: Vec<(String, AttributeValue)>,
}

impl SetAttribute {
    pub fn new(attributes: impl IntoIterator<Item = (String, AttributeValue)>) -> Self {
        Self {
            attributes: attributes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Mailet for SetAttribute {
    fn init(&mut self, config: &MailetConfig) -> Result<(), MailetError> {
        let mut attributes: Vec<_> = config
            .params
            .iter()
            .map(|(key, value)| (key.clone(), AttributeValue::infer(value)))
            .collect();
        attributes.sort_by(|a, b| a.0.cmp(&b.0));
        self.attributes = attributes;
        Ok(())
    }

    async fn service(&self, envelope: &mut Envelope) -> Result<(), MailetError> {
        for (key, value) in &self.attributes {
            envelope.set_attribute(key.clone(), value.clone());
        }
        Ok(())
    }

    fn info(&self) -> String {
        "SetAttribute".to_string()
    }
}

/// Prepends a header field. Parameters: `name`, `value`.
#[derive(Debug, Clone, Default)]
pub struct AddHeader {
    name: String,
    value: String,
}

#[async_trait]
impl Mailet for AddHeader {
    fn init(&mut self, config: &MailetConfig) -> Result<(), MailetError> {
        let name = config.required("name")?;
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
            return Err(MailetError::InvalidParameter {
                name: "name".to_string(),
                value: name.to_string(),
                reason: "not a valid header field name".to_string(),
            });
        }

        self.name = name.to_string();
        self.value = config.required("value")?.to_string();
        Ok(())
    }

    async fn service(&self, envelope: &mut Envelope) -> Result<(), MailetError> {
        envelope.content_mut().prepend_header(&self.name, &self.value);
        Ok(())
    }

    fn info(&self) -> String {
        format!("AddHeader({})", self.name)
    }
}

/// Returns a non-delivery notice to the sender.
///
/// The notice is a new sender-less envelope in the `root` state, stored
/// straight to the spool. The original is finished afterwards unless
/// `passThrough` is `true`. Envelopes without a sender are not bounced.
#[derive(Debug, Default)]
pub struct Bounce {
    pass_through: bool,
    context: Option<Arc<ProcessingContext>>,
}

impl Bounce {
    fn notice(&self, envelope: &Envelope, context: &ProcessingContext) -> String {
        let subject = envelope
            .content()
            .header("Subject")
            .unwrap_or_default();

        let mut notice = format!(
            "From: {}\r\nSubject: Undeliverable: {subject}\r\nAuto-Submitted: auto-replied\r\n\r\n\
             Your message could not be delivered by {} to the following recipients:\r\n\r\n",
            context.postmaster(),
            context.server_name(),
        );

        for recipient in envelope.recipients() {
            let _ = write!(notice, "  {recipient}\r\n");
        }

        if let Some(error) = envelope.error_message() {
            let _ = write!(notice, "\r\nReason:\r\n  {}\r\n", error.replace('\n', "\r\n  "));
        }

        notice
    }
}

#[async_trait]
impl Mailet for Bounce {
    fn init(&mut self, config: &MailetConfig) -> Result<(), MailetError> {
        self.pass_through = config.bool_param("passThrough", false)?;
        self.context = Some(Arc::clone(&config.context));
        Ok(())
    }

    async fn service(&self, envelope: &mut Envelope) -> Result<(), MailetError> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| MailetError::Failed("Bounce has not been initialised".to_string()))?;

        if let Some(sender) = envelope.sender() {
            let notice = Envelope::new(
                None,
                [sender.clone()],
                self.notice(envelope, context).as_str(),
            )?;

            let id = context.spool().store(&notice).await?;
            pipeline!(level = INFO, envelope_id = %envelope.id(), bounce_id = %id, "Bounced envelope");
        } else {
            pipeline!(level = WARN, envelope_id = %envelope.id(), "Not bouncing envelope without a sender");
        }

        if !self.pass_through {
            envelope.set_state(State::GHOST);
        }

        Ok(())
    }

    fn info(&self) -> String {
        "Bounce".to_string()
    }
}

/// Logs a summary of the envelope. Parameter: `comment`.
#[derive(Debug, Clone, Default)]
pub struct LogMessage {
    comment: Option<String>,
}

#[async_trait]
impl Mailet for LogMessage {
    fn init(&mut self, config: &MailetConfig) -> Result<(), MailetError> {
        self.comment = config.param("comment").map(str::to_string);
        Ok(())
    }

    async fn service(&self, envelope: &mut Envelope) -> Result<(), MailetError> {
        let recipients = envelope
            .recipients()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        pipeline!(
            level = INFO,
            envelope_id = %envelope.id(),
            state = %envelope.state(),
            sender = %envelope.sender().map(ToString::to_string).unwrap_or_default(),
            recipients = %recipients,
            size = envelope.content().len(),
            comment = self.comment.as_deref().unwrap_or_default(),
            "Logged envelope"
        );

        Ok(())
    }

    fn info(&self) -> String {
        "LogMessage".to_string()
    }
}
