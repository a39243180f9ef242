//! The mailet contract.

pub mod builtin;

use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use postroom_common::Envelope;

use crate::{context::ProcessingContext, error::MailetError};

/// What a mailet is given at initialisation.
#[derive(Debug, Clone)]
pub struct MailetConfig {
    pub name: String,
    pub params: AHashMap<String, String>,
    pub context: Arc<ProcessingContext>,
}

impl MailetConfig {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// # Errors
    ///
    /// [`MailetError::MissingParameter`] when the parameter is absent.
    pub fn required(&self, name: &str) -> Result<&str, MailetError> {
        self.param(name)
            .ok_or_else(|| MailetError::MissingParameter(name.to_string()))
    }

    /// A `true`/`false` parameter, `default` when absent.
    ///
    /// # Errors
    ///
    /// [`MailetError::InvalidParameter`] when the value is not a boolean.
    pub fn bool_param(&self, name: &str, default: bool) -> Result<bool, MailetError> {
        self.param(name).map_or(Ok(default), |value| {
            value
                .trim()
                .parse()
                .map_err(|_| MailetError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "expected true or false".to_string(),
                })
        })
    }
}

/// An action applied to the recipients a stage's matcher selected.
///
/// `service` only ever sees an envelope already narrowed to those recipients.
/// It may change recipients, content, attributes and state; moving the
/// envelope to another state hands it to that processor.
#[async_trait]
pub trait Mailet: Send + Sync {
    /// Called once, before the first call to [`Mailet::service`].
    ///
    /// # Errors
    ///
    /// Fails when the configuration is unusable; the processor being built
    /// is abandoned.
    fn init(&mut self, _config: &MailetConfig) -> Result<(), MailetError> {
        Ok(())
    }

    /// # Errors
    ///
    /// Any failure is routed through the stage's mailet exception policy.
    async fn service(&self, envelope: &mut Envelope) -> Result<(), MailetError>;

    /// Releases resources when the owning processor is disposed.
    ///
    /// # Errors
    ///
    /// Failures are logged; disposal carries on with the remaining mailets.
    fn destroy(&self) -> Result<(), MailetError> {
        Ok(())
    }

    /// Short description used in logs and error messages.
    fn info(&self) -> String;
}
