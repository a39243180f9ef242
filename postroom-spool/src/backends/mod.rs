//! Spool implementations:
//! - `memory`: in-process storage with entry locking and a blocking `accept`
//! - `test`: a memory spool that lets tests wait for writes

pub mod memory;
pub mod test;

pub use memory::MemorySpool;
pub use test::TestSpool;
