//! Shared types, error model, and configuration for helpforge.
//!
//! This crate is the foundation depended on by all other helpforge crates.
//! It provides:
//! - [`HelpForgeError`], the unified error type
//! - Domain types ([`TopicEntry`], [`ContentGroup`], [`BuildFormat`])
//! - Configuration ([`AppConfig`], [`BuildSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildSettings, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{HelpForgeError, Result};
pub use types::{
    BuildFormat, CURRENT_SCHEMA_VERSION, ContentGroup, FormatKind, GroupKind, HelpViewerOptions,
    LinkTarget, LinkType, TopicEntry, check_sibling, validate_siblings,
};
