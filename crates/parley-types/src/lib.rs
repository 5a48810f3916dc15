//! Shared domain types for parley.
//!
//! This crate contains the values that flow between the update source, the
//! dispatchers and application handlers: updates, conversation identities,
//! the calling context, configuration and the error taxonomy.
//!
//! No async runtime -- only serde, serde_json, chrono, secrecy, thiserror.

pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod update;
