//! Build file loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::build_file_names;
use super::types::BuildFile;
use super::validation::validate_build_file;

/// Load a build file, picking the format from the extension
pub fn load_build_file(path: &Path) -> Result<BuildFile> {
    let format = if path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml")
    {
        "YAML"
    } else {
        "TOML"
    };
    info!(path = %path.display(), format, "loading build file");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let build: BuildFile = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_build_file(&build)?;
    debug!(
        path = %path.display(),
        targets = build.targets.len(),
        parameters = build.parameters.len(),
        "build file loaded and validated"
    );
    Ok(build)
}

/// Find a build file in the directory or its parents.
///
/// Names are tried in [`build_file_names`] order at each level; the first
/// match wins.
pub fn find_build_file(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for build file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in build_file_names() {
            let path = current.join(name);
            if path.is_file() {
                info!(path = %path.display(), "found build file");
                return Some(path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no build file found");
    None
}

/// Load the build file found from a directory upward
pub fn load_build_file_from_dir(dir: &Path) -> Result<(BuildFile, PathBuf)> {
    let path = find_build_file(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let build = load_build_file(&path)?;
    Ok((build, path))
}
