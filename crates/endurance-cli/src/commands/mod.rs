//! CLI command implementations

pub mod checksum;
pub mod config;
pub mod run;
