//! Infrastructure for parley: configuration files and update sources.

pub mod config;
pub mod source;
