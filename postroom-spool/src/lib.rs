pub mod backends;
pub mod config;
pub mod error;
pub mod filter;
pub mod r#trait;

pub use backends::{MemorySpool, TestSpool};
pub use config::SpoolConfig;
pub use error::{Result, SpoolError};
pub use filter::{AcceptAll, AcceptFilter, DelayFilter, EntryInfo};
pub use r#trait::SpoolStore;
