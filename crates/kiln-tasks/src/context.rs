//! Per-target view of resolved parameter values

use std::sync::Arc;

use crate::args::ParameterMap;
use crate::parameter::{Parameter, Value};

/// Result of looking up a parameter in an [`ExecutionContext`]
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// Scalar parameter with no value
    Null,
    /// First resolved value of a scalar parameter
    Scalar(Value),
    /// All resolved values of an array parameter, possibly empty
    List(Vec<Value>),
}

impl ParameterValue {
    /// Check if this is an unset scalar
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the scalar value, if any
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Get the values as a list (empty for unset scalars)
    pub fn as_list(&self) -> &[Value] {
        match self {
            Self::List(values) => values,
            _ => &[],
        }
    }

    /// Whether a conditional list entry keyed on this value should be kept
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Scalar(v) => v.is_truthy(),
            Self::List(values) => !values.is_empty(),
        }
    }

    /// Render for an environment variable; arrays are comma-joined
    pub fn to_env_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Scalar(v) => Some(v.to_string()),
            Self::List(values) => Some(
                values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }
}

#[derive(Debug)]
struct ContextInner {
    target: String,
    args: Vec<String>,
    local: ParameterMap,
    global: Arc<ParameterMap>,
}

/// Resolved parameters for one target.
///
/// Values parsed from the target's own task scope shadow the global scope.
/// Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    /// Create a context for a target from its local and global values
    pub fn new(
        target: impl Into<String>,
        args: Vec<String>,
        local: ParameterMap,
        global: Arc<ParameterMap>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                target: target.into(),
                args,
                local,
                global,
            }),
        }
    }

    /// Context with no resolved values, mostly useful in tests
    pub fn empty(target: impl Into<String>) -> Self {
        Self::new(
            target,
            Vec::new(),
            ParameterMap::new(),
            Arc::new(ParameterMap::new()),
        )
    }

    /// Name of the target this context belongs to
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Raw task-scope arguments the target was given
    pub fn args(&self) -> &[String] {
        &self.inner.args
    }

    /// Look up a parameter.
    ///
    /// Array parameters always yield a list; scalars yield their first value
    /// or [`ParameterValue::Null`].
    pub fn get(&self, parameter: &Parameter) -> ParameterValue {
        let values = self
            .inner
            .local
            .get(parameter)
            .or_else(|| self.inner.global.get(parameter));
        if parameter.is_array() {
            ParameterValue::List(values.map(<[Value]>::to_vec).unwrap_or_default())
        } else {
            values
                .and_then(|v| v.first())
                .cloned()
                .map(ParameterValue::Scalar)
                .unwrap_or(ParameterValue::Null)
        }
    }

    /// Get a scalar as a string
    pub fn string(&self, parameter: &Parameter) -> Option<String> {
        match self.get(parameter) {
            ParameterValue::Scalar(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Get every value as a string
    pub fn strings(&self, parameter: &Parameter) -> Vec<String> {
        self.get(parameter)
            .as_list()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Get a scalar as a number
    pub fn number(&self, parameter: &Parameter) -> Option<f64> {
        self.get(parameter).as_scalar().and_then(Value::as_number)
    }

    /// Boolean parameter value, `false` when unset
    pub fn flag(&self, parameter: &Parameter) -> bool {
        self.get(parameter)
            .as_scalar()
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Environment variables (CONSTANT_CASE) for every set parameter
    pub fn env_vars(&self, parameters: &[Parameter]) -> Vec<(String, String)> {
        parameters
            .iter()
            .filter_map(|p| {
                self.get(p)
                    .to_env_string()
                    .map(|value| (p.constant_name(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterType;

    fn context(local: ParameterMap, global: ParameterMap) -> ExecutionContext {
        ExecutionContext::new("build", Vec::new(), local, Arc::new(global))
    }

    #[test]
    fn test_unset_scalar_is_null_and_array_is_empty() {
        let ctx = ExecutionContext::empty("build");
        let mode = Parameter::new("mode", ParameterType::String);
        let defines = Parameter::new("define", ParameterType::StringArray);

        assert_eq!(ctx.get(&mode), ParameterValue::Null);
        assert_eq!(ctx.get(&defines), ParameterValue::List(Vec::new()));
        assert!(ctx.strings(&defines).is_empty());
    }

    #[test]
    fn test_local_shadows_global() {
        let mode = Parameter::new("mode", ParameterType::String);
        let mut local = ParameterMap::new();
        local.push(&mode, Value::String("local".into()));
        let mut global = ParameterMap::new();
        global.push(&mode, Value::String("global".into()));

        let ctx = context(local, global);
        assert_eq!(ctx.string(&mode).as_deref(), Some("local"));
    }

    #[test]
    fn test_falls_back_to_global() {
        let jobs = Parameter::new("jobs", ParameterType::Number);
        let mut global = ParameterMap::new();
        global.push(&jobs, Value::Number(3.0));

        let ctx = context(ParameterMap::new(), global);
        assert_eq!(ctx.number(&jobs), Some(3.0));
    }

    #[test]
    fn test_scalar_takes_first_value() {
        let mode = Parameter::new("mode", ParameterType::String);
        let mut local = ParameterMap::new();
        local.push(&mode, Value::String("a".into()));
        local.push(&mode, Value::String("b".into()));

        let ctx = context(local, ParameterMap::new());
        assert_eq!(ctx.string(&mode).as_deref(), Some("a"));
    }

    #[test]
    fn test_env_vars() {
        let defines = Parameter::new("define", ParameterType::StringArray);
        let release = Parameter::new("isRelease", ParameterType::Boolean);
        let unset = Parameter::new("unset", ParameterType::String);
        let mut global = ParameterMap::new();
        global.push(&defines, Value::String("A".into()));
        global.push(&defines, Value::String("B".into()));
        global.push(&release, Value::Boolean(true));

        let ctx = context(ParameterMap::new(), global);
        let vars = ctx.env_vars(&[defines, release, unset]);
        assert_eq!(
            vars,
            vec![
                ("DEFINE".to_string(), "A,B".to_string()),
                ("IS_RELEASE".to_string(), "true".to_string()),
            ]
        );
    }
}
