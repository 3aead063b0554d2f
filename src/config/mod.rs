//! Configuration module for convimg projects
//!
//! Provides types and parsing for `convimg.toml` project files.

pub mod loader;
pub mod schema;

pub use loader::{find_config, load_config, load_project, resolve_project, ConfigError, CONFIG_FILE};
pub use schema::*;
