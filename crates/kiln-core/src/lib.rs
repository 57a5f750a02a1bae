//! Kiln Core - Build file configuration
//!
//! This crate provides the build file types, discovery and loading from TOML
//! or YAML, validation, and the error types shared by the `kiln` binary.

pub mod config;
pub mod error;

pub use config::{
    find_build_file, load_build_file, load_build_file_from_dir, validate_build_file, BuildFile,
    DependencyEntry, ParameterConfig, PathEntry, TargetConfig, When,
};
pub use error::{ConfigError, KilnError, Result};
