//! Shared types for psytrainer: configuration, the simulated-patient profile
//! model and its taxonomy, chat messages, token usage, and structured trace
//! events.

pub mod config;
pub mod error;
pub mod message;
pub mod profile;
pub mod taxonomy;
pub mod trace;
pub mod usage;

pub use error::{Error, Result};
