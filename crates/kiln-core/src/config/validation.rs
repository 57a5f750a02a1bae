//! Build file validation

use std::collections::HashMap;

use kiln_tasks::parameter::{parse_alias, ParameterType};
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{BuildFile, TargetConfig, When};

/// Validate a build file
pub fn validate_build_file(build: &BuildFile) -> Result<()> {
    debug!("validating build file");
    validate_parameters(build)?;
    validate_targets(build)?;
    validate_default(build)?;
    debug!("build file validation passed");
    Ok(())
}

fn validate_parameters(build: &BuildFile) -> Result<()> {
    let mut aliases: HashMap<char, &str> = HashMap::new();
    for (name, parameter) in &build.parameters {
        let field = format!("parameters.{}", name);
        if name.trim().is_empty() {
            return Err(ConfigError::invalid(field, "name cannot be empty").into());
        }

        if parameter.kind.parse::<ParameterType>().is_err() {
            return Err(ConfigError::invalid(
                format!("{}.type", field),
                format!("must be one of: {}", ParameterType::NAMES.join(", ")),
            )
            .into());
        }

        if let Some(alias) = &parameter.alias {
            let alias = parse_alias(name, alias)
                .map_err(|e| ConfigError::invalid(format!("{}.alias", field), e.to_string()))?;
            if let Some(other) = aliases.insert(alias, name) {
                return Err(ConfigError::invalid(
                    format!("{}.alias", field),
                    format!("'-{}' is already used by parameter '{}'", alias, other),
                )
                .into());
            }
        }
    }
    Ok(())
}

fn validate_targets(build: &BuildFile) -> Result<()> {
    for (name, target) in &build.targets {
        let field = format!("targets.{}", name);
        if name.trim().is_empty() || name.starts_with('-') {
            return Err(ConfigError::invalid(field, "name cannot be empty or start with '-'").into());
        }

        for (i, dep) in target.depends_on.iter().enumerate() {
            let dep_field = format!("{}.depends_on[{}]", field, i);
            if !build.targets.contains_key(dep.target()) {
                return Err(ConfigError::invalid(
                    dep_field,
                    format!("unknown target '{}'", dep.target()),
                )
                .into());
            }
            if let Some(when) = dep.when() {
                validate_when(build, &dep_field, when)?;
            }
        }

        validate_paths(build, target, &field)?;

        for parameter in &target.parameters {
            if !build.parameters.contains_key(parameter) {
                return Err(ConfigError::invalid(
                    format!("{}.parameters", field),
                    format!("unknown parameter '{}'", parameter),
                )
                .into());
            }
        }

        if let Some(guard) = &target.only_when {
            if guard.trim().is_empty() {
                return Err(
                    ConfigError::invalid(format!("{}.only_when", field), "command cannot be empty").into(),
                );
            }
        }

        for (i, command) in target.executes.iter().enumerate() {
            if command.trim().is_empty() {
                return Err(ConfigError::invalid(
                    format!("{}.executes[{}]", field, i),
                    "command cannot be empty",
                )
                .into());
            }
        }
    }
    Ok(())
}

fn validate_paths(build: &BuildFile, target: &TargetConfig, field: &str) -> Result<()> {
    for (list, entries) in [("inputs", &target.inputs), ("outputs", &target.outputs)] {
        for (i, entry) in entries.iter().enumerate() {
            let entry_field = format!("{}.{}[{}]", field, list, i);
            if entry.path().trim().is_empty() {
                return Err(ConfigError::invalid(entry_field, "path cannot be empty").into());
            }
            if let Some(when) = entry.when() {
                validate_when(build, &entry_field, when)?;
            }
        }
    }
    Ok(())
}

fn validate_when(build: &BuildFile, field: &str, when: &When) -> Result<()> {
    if build.parameters.contains_key(&when.parameter) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            format!("{}.when", field),
            format!("unknown parameter '{}'", when.parameter),
        )
        .into())
    }
}

fn validate_default(build: &BuildFile) -> Result<()> {
    if let Some(default) = &build.default {
        if !build.targets.contains_key(default) {
            return Err(ConfigError::invalid("default", format!("unknown target '{}'", default)).into());
        }
    }
    Ok(())
}
