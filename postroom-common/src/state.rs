use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};

/// Name of the processor an envelope should be serviced by next.
///
/// Besides the processors registered at startup there are two reserved
/// states: [`State::GHOST`] marks an envelope whose processing has finished
/// and which may be discarded, and [`State::ERROR`] is where failures are
/// redirected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Cow<'static, str>);

impl State {
    pub const ROOT: Self = Self(Cow::Borrowed("root"));
    pub const ERROR: Self = Self(Cow::Borrowed("error"));
    pub const GHOST: Self = Self(Cow::Borrowed("ghost"));
    pub const TRANSPORT: Self = Self(Cow::Borrowed("transport"));

    /// Normalises `name` by trimming whitespace and lowercasing it.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "root" => Self::ROOT,
            "error" => Self::ERROR,
            "ghost" => Self::GHOST,
            "transport" => Self::TRANSPORT,
            _ => Self(Cow::Owned(name)),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_ghost(&self) -> bool {
        *self == Self::GHOST
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        *self == Self::ERROR
    }
}

impl Default for State {
    fn default() -> Self {
        Self::ROOT
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for State {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for State {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
