//! CLI command implementations.

pub mod common;
pub mod config;
pub mod select;
pub mod simulate;
