//! Typed parameter declarations and the registry they are resolved against

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    String,
    StringArray,
    Number,
    NumberArray,
    Boolean,
    BooleanArray,
}

impl ParameterType {
    /// All type names, in declaration-file spelling
    pub const NAMES: [&'static str; 6] = [
        "string", "string[]", "number", "number[]", "boolean", "boolean[]",
    ];

    /// Check if values accumulate
    pub fn is_array(self) -> bool {
        matches!(
            self,
            Self::StringArray | Self::NumberArray | Self::BooleanArray
        )
    }

    pub fn is_string(self) -> bool {
        matches!(self, Self::String | Self::StringArray)
    }

    pub fn is_number(self) -> bool {
        matches!(self, Self::Number | Self::NumberArray)
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, Self::Boolean | Self::BooleanArray)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::StringArray => "string[]",
            Self::Number => "number",
            Self::NumberArray => "number[]",
            Self::Boolean => "boolean",
            Self::BooleanArray => "boolean[]",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterType {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "string[]" => Ok(Self::StringArray),
            "number" => Ok(Self::Number),
            "number[]" => Ok(Self::NumberArray),
            "boolean" => Ok(Self::Boolean),
            "boolean[]" => Ok(Self::BooleanArray),
            other => Err(ParameterError::UnknownType(other.to_string())),
        }
    }
}

/// A single resolved parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Value {
    /// Get the value as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether the value counts as "set" for conditional list entries
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::String(s) => !s.is_empty(),
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Boolean(b) => *b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Self::Number(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// A typed, named value that can be supplied by CLI flags or the environment.
///
/// The name and type are fixed at construction. The kebab, camel and
/// constant case forms are derived from the name on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    name: String,
    kind: ParameterType,
    alias: Option<char>,
}

impl Parameter {
    /// Create a new parameter without a short alias
    pub fn new(name: impl Into<String>, kind: ParameterType) -> Self {
        Self {
            name: name.into(),
            kind,
            alias: None,
        }
    }

    /// Set the single-character short flag
    pub fn with_alias(mut self, alias: char) -> Self {
        self.alias = Some(alias);
        self
    }

    /// Get the raw name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the declared type
    pub fn kind(&self) -> ParameterType {
        self.kind
    }

    /// Get the short flag, if any
    pub fn alias(&self) -> Option<char> {
        self.alias
    }

    /// Check if the parameter accepts repeated values
    pub fn is_array(&self) -> bool {
        self.kind.is_array()
    }

    pub fn is_string(&self) -> bool {
        self.kind.is_string()
    }

    pub fn is_number(&self) -> bool {
        self.kind.is_number()
    }

    /// Check if the parameter is a flag
    pub fn is_boolean(&self) -> bool {
        self.kind.is_boolean()
    }

    /// `fooBar` -> `foo-bar`
    pub fn kebab_name(&self) -> String {
        to_kebab_case(&self.name)
    }

    /// `foo-bar` -> `fooBar`
    pub fn camel_name(&self) -> String {
        to_camel_case(&self.name)
    }

    /// `fooBar` -> `FOO_BAR`
    pub fn constant_name(&self) -> String {
        to_constant_case(&self.name)
    }

    /// Whether a long flag name (without the leading `--`) refers to this parameter
    pub fn matches_flag(&self, flag: &str) -> bool {
        self.name == flag || self.kebab_name() == flag || self.camel_name() == flag
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// Validated set of parameters with unique names and aliases
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    parameters: Vec<Parameter>,
}

impl ParameterRegistry {
    /// Build a registry, rejecting duplicate names or aliases
    pub fn new(parameters: Vec<Parameter>) -> Result<Self, ParameterError> {
        let mut names = HashSet::new();
        let mut aliases = HashSet::new();
        for parameter in &parameters {
            if parameter.name.is_empty() {
                return Err(ParameterError::EmptyName);
            }
            if !names.insert(parameter.name.as_str()) {
                return Err(ParameterError::DuplicateName(parameter.name.clone()));
            }
            if let Some(alias) = parameter.alias {
                if alias == '-' || alias.is_whitespace() {
                    return Err(ParameterError::InvalidAlias {
                        name: parameter.name.clone(),
                        alias: alias.to_string(),
                    });
                }
                if !aliases.insert(alias) {
                    return Err(ParameterError::DuplicateAlias(alias));
                }
            }
        }
        Ok(Self { parameters })
    }

    /// Create a registry with no parameters
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get a parameter by raw name
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Get all parameters in declaration order
    pub fn all(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Add a parameter to an existing registry
    pub fn register(&mut self, parameter: Parameter) -> Result<(), ParameterError> {
        let mut all = self.parameters.clone();
        all.push(parameter);
        *self = Self::new(all)?;
        Ok(())
    }
}

/// Parse an alias declaration, which must be exactly one character
pub fn parse_alias(name: &str, alias: &str) -> Result<char, ParameterError> {
    let mut chars = alias.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '-' && !c.is_whitespace() => Ok(c),
        _ => Err(ParameterError::InvalidAlias {
            name: name.to_string(),
            alias: alias.to_string(),
        }),
    }
}

fn words(name: &str) -> Vec<String> {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    let boundary = BOUNDARY.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));
    let separator = SEPARATOR.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid regex"));

    let spaced = boundary.replace_all(name, "$1 $2");
    separator
        .split(&spaced)
        .flat_map(|part| part.split(' '))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// `buildMode` -> `build-mode`
pub fn to_kebab_case(name: &str) -> String {
    words(name).join("-")
}

/// `build-mode` -> `BUILD_MODE`
pub fn to_constant_case(name: &str) -> String {
    words(name).join("_").to_uppercase()
}

/// `build-mode` -> `buildMode`
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::new();
    for (i, word) in words(name).iter().enumerate() {
        if i == 0 {
            out.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Errors in parameter declarations
#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("Parameter name cannot be empty")]
    EmptyName,

    #[error("Parameter '{0}' is declared more than once")]
    DuplicateName(String),

    #[error("Alias '-{0}' is used by more than one parameter")]
    DuplicateAlias(char),

    #[error("Parameter '{name}' has invalid alias '{alias}' (must be a single character)")]
    InvalidAlias { name: String, alias: String },

    #[error("Unknown parameter type '{0}' (expected one of: {types})", types = ParameterType::NAMES.join(", "))]
    UnknownType(String),

    #[error("Unknown parameter '{0}'")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_forms() {
        let p = Parameter::new("buildMode", ParameterType::String);
        assert_eq!(p.kebab_name(), "build-mode");
        assert_eq!(p.camel_name(), "buildMode");
        assert_eq!(p.constant_name(), "BUILD_MODE");

        let p = Parameter::new("dry-run", ParameterType::Boolean);
        assert_eq!(p.kebab_name(), "dry-run");
        assert_eq!(p.camel_name(), "dryRun");
        assert_eq!(p.constant_name(), "DRY_RUN");
    }

    #[test]
    fn test_matches_flag_forms() {
        let p = Parameter::new("skipTests", ParameterType::Boolean);
        assert!(p.matches_flag("skipTests"));
        assert!(p.matches_flag("skip-tests"));
        assert!(!p.matches_flag("SKIP_TESTS"));
        assert!(!p.matches_flag("skip"));
    }

    #[test]
    fn test_type_predicates() {
        assert!(ParameterType::StringArray.is_array());
        assert!(ParameterType::StringArray.is_string());
        assert!(!ParameterType::Number.is_array());
        assert!(ParameterType::NumberArray.is_number());
        assert!(ParameterType::Boolean.is_boolean());
    }

    #[test]
    fn test_type_parse() {
        assert_eq!(
            "number[]".parse::<ParameterType>().unwrap(),
            ParameterType::NumberArray
        );
        assert_eq!(ParameterType::BooleanArray.to_string(), "boolean[]");
        assert!(matches!(
            "int".parse::<ParameterType>(),
            Err(ParameterError::UnknownType(_))
        ));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = ParameterRegistry::new(vec![
            Parameter::new("define", ParameterType::StringArray),
            Parameter::new("define", ParameterType::String),
        ]);
        assert!(matches!(result, Err(ParameterError::DuplicateName(_))));

        let result = ParameterRegistry::new(vec![
            Parameter::new("define", ParameterType::StringArray).with_alias('D'),
            Parameter::new("debug", ParameterType::Boolean).with_alias('D'),
        ]);
        assert!(matches!(result, Err(ParameterError::DuplicateAlias('D'))));
    }

    #[test]
    fn test_registry_register() {
        let mut registry = ParameterRegistry::empty();
        registry
            .register(Parameter::new("mode", ParameterType::String))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("mode").is_some());
        assert!(registry
            .register(Parameter::new("mode", ParameterType::Number))
            .is_err());
    }

    #[test]
    fn test_parse_alias() {
        assert_eq!(parse_alias("define", "D").unwrap(), 'D');
        assert!(parse_alias("define", "DX").is_err());
        assert!(parse_alias("define", "").is_err());
        assert!(parse_alias("define", "-").is_err());
    }

    #[test]
    fn test_value_display_and_truthiness() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Boolean(false).to_string(), "false");
        assert!(Value::String("x".into()).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
    }
}
