//! Build file types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::defaults::default_parameter_type;

/// A parsed build file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildFile {
    /// Target to run when none is named on the command line
    pub default: Option<String>,

    /// Declared parameters; together they form the global scope
    pub parameters: BTreeMap<String, ParameterConfig>,

    /// Declared targets, kept in name order
    pub targets: BTreeMap<String, TargetConfig>,
}

impl BuildFile {
    /// Target names, sorted by name
    pub fn target_names(&self) -> Vec<&str> {
        self.targets.keys().map(String::as_str).collect()
    }
}

/// A parameter declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterConfig {
    /// One of `string`, `string[]`, `number`, `number[]`, `boolean`, `boolean[]`
    #[serde(rename = "type", default = "default_parameter_type")]
    pub kind: String,

    /// Single-character short flag
    #[serde(default)]
    pub alias: Option<String>,

    /// Shown by `--list`
    #[serde(default)]
    pub description: Option<String>,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            kind: default_parameter_type(),
            alias: None,
            description: None,
        }
    }
}

/// A target declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Shown by `--list`
    pub description: Option<String>,

    pub depends_on: Vec<DependencyEntry>,

    pub inputs: Vec<PathEntry>,

    pub outputs: Vec<PathEntry>,

    /// Shell command; the target runs only if it exits with status 0
    pub only_when: Option<String>,

    /// Shell commands, run in order
    pub executes: Vec<String>,

    /// Parameters accepted in this target's own task scope
    pub parameters: Vec<String>,

    /// Extra environment for this target's commands
    pub env: BTreeMap<String, String>,
}

impl TargetConfig {
    /// Whether any list entry depends on a parameter value
    pub fn is_conditional(&self) -> bool {
        self.depends_on.iter().any(|d| d.when().is_some())
            || self.inputs.iter().any(|p| p.when().is_some())
            || self.outputs.iter().any(|p| p.when().is_some())
    }
}

/// A dependency, optionally kept only when a parameter is truthy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyEntry {
    Name(String),
    Conditional { target: String, when: When },
}

impl DependencyEntry {
    /// Get the target name
    pub fn target(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Conditional { target, .. } => target,
        }
    }

    pub fn when(&self) -> Option<&When> {
        match self {
            Self::Name(_) => None,
            Self::Conditional { when, .. } => Some(when),
        }
    }
}

/// A file path or glob, optionally kept only when a parameter is truthy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathEntry {
    Path(String),
    Conditional { path: String, when: When },
}

impl PathEntry {
    /// Get the path or glob
    pub fn path(&self) -> &str {
        match self {
            Self::Path(path) => path,
            Self::Conditional { path, .. } => path,
        }
    }

    pub fn when(&self) -> Option<&When> {
        match self {
            Self::Path(_) => None,
            Self::Conditional { when, .. } => Some(when),
        }
    }
}

/// Condition on a parameter value, written `name` or `!name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct When {
    pub parameter: String,
    pub negated: bool,
}

impl When {
    /// Parse `name` or `!name`
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.strip_prefix('!') {
            Some(rest) => Self {
                parameter: rest.trim().to_string(),
                negated: true,
            },
            None => Self {
                parameter: raw.to_string(),
                negated: false,
            },
        }
    }

    /// Apply the condition to the parameter's truthiness
    pub fn holds(&self, truthy: bool) -> bool {
        truthy != self.negated
    }
}

impl From<String> for When {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<When> for String {
    fn from(when: When) -> Self {
        when.to_string()
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!{}", self.parameter)
        } else {
            f.write_str(&self.parameter)
        }
    }
}
