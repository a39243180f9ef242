use std::{fmt, sync::Arc};

use postroom_common::MailAddress;
use postroom_spool::SpoolStore;

/// Services shared by every matcher and mailet of a running engine.
#[derive(Clone)]
pub struct ProcessingContext {
    spool: Arc<dyn SpoolStore>,
    postmaster: MailAddress,
    server_name: String,
}

impl ProcessingContext {
    pub fn new(
        spool: Arc<dyn SpoolStore>,
        postmaster: MailAddress,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            spool,
            postmaster,
            server_name: server_name.into(),
        }
    }

    /// The spool, for units that inject new mail.
    pub fn spool(&self) -> &Arc<dyn SpoolStore> {
        &self.spool
    }

    pub const fn postmaster(&self) -> &MailAddress {
        &self.postmaster
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

impl fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("postmaster", &self.postmaster)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}
