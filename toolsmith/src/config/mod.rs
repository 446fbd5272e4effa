//! Host configuration
//!
//! `[server]`, `[runtime]`, `[sandbox]` and `[auth]` sections of a TOML file.
//! Every field has a default, so an empty file is a valid configuration.

pub mod types;

pub use types::*;
