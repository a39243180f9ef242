pub mod address;
pub mod attribute;
pub mod content;
pub mod envelope;
pub mod error;
pub mod id;
pub mod logging;
pub mod state;

pub use address::{Domain, MailAddress};
pub use attribute::AttributeValue;
pub use content::MessageContent;
pub use envelope::Envelope;
pub use error::{AddressError, EnvelopeError};
pub use id::EnvelopeId;
pub use state::State;
pub use tracing;

/// Broadcast to every long-running task when the engine stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
