//! Configuration module for hn-mirror
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and layering command-line overrides on top of them.
//!
//! # Example
//!
//! ```no_run
//! use hn_mirror::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("hn-mirror.toml")).unwrap();
//! println!("Keeping the top {} items", config.poller.top_n);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetcherConfig, OutputConfig, PollerConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{load_config, resolve_config, ConfigOverrides};
