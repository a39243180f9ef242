//! The postroom controller: configuration, startup and shutdown of a
//! processing engine.

pub mod controller;

pub use controller::Postroom;
