//! Configuration for the gateway CLI and server.
//!
//! The configuration is read from a `config.yml` file within a configuration folder. Every
//! section is optional and falls back to defaults. Values can further be overridden from CLI
//! arguments or environment variables through [`OverridableConfig`].
#![warn(missing_docs)]

mod config;

pub use self::config::*;
