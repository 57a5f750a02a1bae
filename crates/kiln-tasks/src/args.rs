//! Command line segmentation and flag resolution
//!
//! Raw arguments have the shape
//! `<global flags> [--] <task> [task flags] <task> [task flags] ...`.
//! [`segment`] splits them into scopes; [`parse_flags`] resolves one scope
//! against a parameter set, and [`apply_env`] fills what the command line left
//! unset from environment variables.

use std::collections::HashMap;

use tracing::debug;

use crate::parameter::{Parameter, Value};

/// A requested task and the flags that followed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskArgs {
    pub name: String,
    pub args: Vec<String>,
}

/// Command line split into the global flag scope and task scopes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments {
    pub global: Vec<String>,
    pub tasks: Vec<TaskArgs>,
}

/// Split raw arguments into global flags and per-task argument lists.
///
/// A token not starting with `-` opens a new task scope. Flags before the
/// first task name go to the global scope unless a literal `--` was seen,
/// after which flags only ever belong to the current task (and are dropped
/// if there is none yet).
pub fn segment<I, S>(args: I) -> Segments
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut in_global = true;
    let mut segments = Segments::default();
    let mut current: Option<TaskArgs> = None;

    for arg in args {
        let arg = arg.into();
        if arg.is_empty() {
            continue;
        }
        if arg == "--" {
            in_global = false;
            continue;
        }
        if arg.starts_with('-') {
            if in_global {
                segments.global.push(arg);
            } else if let Some(task) = current.as_mut() {
                task.args.push(arg);
            }
            continue;
        }
        in_global = false;
        if let Some(task) = current.take() {
            segments.tasks.push(task);
        }
        current = Some(TaskArgs {
            name: arg,
            args: Vec::new(),
        });
    }
    if let Some(task) = current {
        segments.tasks.push(task);
    }
    segments
}

/// Resolved values per parameter name, in the order they were supplied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    values: HashMap<String, Vec<Value>>,
}

impl ParameterMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, accumulating repeated occurrences
    pub fn push(&mut self, parameter: &Parameter, value: Value) {
        self.values
            .entry(parameter.name().to_string())
            .or_default()
            .push(value);
    }

    /// Get the values resolved for a parameter
    pub fn get(&self, parameter: &Parameter) -> Option<&[Value]> {
        self.values.get(parameter.name()).map(Vec::as_slice)
    }

    /// Check if a parameter has any value
    pub fn contains(&self, parameter: &Parameter) -> bool {
        self.values.contains_key(parameter.name())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Source of environment variables
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Resolve flag tokens of one scope against a parameter set.
///
/// Unrecognized flags are ignored.
pub fn parse_flags(args: &[String], parameters: &[Parameter]) -> ParameterMap {
    let mut map = ParameterMap::new();
    for arg in args {
        if let Some(body) = arg.strip_prefix("--") {
            parse_long(body, parameters, &mut map);
        } else if let Some(cluster) = arg.strip_prefix('-') {
            parse_short(cluster, parameters, &mut map);
        }
    }
    map
}

fn parse_long(body: &str, parameters: &[Parameter], map: &mut ParameterMap) {
    let (name, value, has_equals) = match body.split_once('=') {
        Some((name, "")) => (name, None, true),
        Some((name, value)) => (name, Some(value), true),
        None => (body, None, false),
    };
    let Some(parameter) = parameters.iter().find(|p| p.matches_flag(name)) else {
        debug!(flag = name, "ignoring unknown flag");
        return;
    };
    if parameter.is_boolean() {
        let flag = !has_equals || value.is_some_and(|v| bool_from_str(v));
        map.push(parameter, Value::Boolean(flag));
        return;
    }
    let Some(value) = value else {
        debug!(parameter = parameter.name(), "flag requires a value");
        return;
    };
    map.push(parameter, coerce(parameter, value));
}

fn parse_short(cluster: &str, parameters: &[Parameter], map: &mut ParameterMap) {
    let mut chars = cluster.chars();
    while let Some(c) = chars.next() {
        let Some(parameter) = parameters.iter().find(|p| p.alias() == Some(c)) else {
            continue;
        };
        if parameter.is_boolean() {
            map.push(parameter, Value::Boolean(true));
            continue;
        }
        let rest = chars.as_str();
        if !rest.is_empty() {
            map.push(parameter, coerce(parameter, rest));
        }
        return;
    }
}

/// Fill parameters the command line left unset from the environment.
///
/// Both the raw name and the CONSTANT_CASE form are looked up. Array
/// parameters split the variable on commas.
pub fn apply_env(map: &mut ParameterMap, parameters: &[Parameter], env: &dyn EnvSource) {
    for parameter in parameters {
        if map.contains(parameter) {
            continue;
        }
        let constant = parameter.constant_name();
        let Some(raw) = env.var(parameter.name()).or_else(|| {
            if constant != parameter.name() {
                env.var(&constant)
            } else {
                None
            }
        }) else {
            continue;
        };
        let pieces: Vec<&str> = if parameter.is_array() {
            raw.split(',').collect()
        } else {
            vec![raw.as_str()]
        };
        for piece in pieces {
            if piece.is_empty() && !parameter.is_boolean() {
                continue;
            }
            map.push(parameter, coerce(parameter, piece));
        }
        debug!(parameter = parameter.name(), "resolved from environment");
    }
}

/// Parse the global scope: command line first, then the environment
pub fn parse_global(args: &[String], parameters: &[Parameter], env: &dyn EnvSource) -> ParameterMap {
    let mut map = parse_flags(args, parameters);
    apply_env(&mut map, parameters, env);
    map
}

/// Coerce a raw string to the parameter's element type
pub fn coerce(parameter: &Parameter, raw: &str) -> Value {
    if parameter.is_boolean() {
        Value::Boolean(bool_from_str(raw))
    } else if parameter.is_number() {
        Value::Number(parse_number(raw))
    } else {
        Value::String(raw.to_string())
    }
}

/// False only for `false`, `0`, `null` or an empty value
fn bool_from_str(raw: &str) -> bool {
    !matches!(raw, "" | "false" | "0" | "null")
}

/// Parse the longest numeric prefix, yielding NaN when there is none
pub fn parse_number(raw: &str) -> f64 {
    let s = raw.trim_start();
    if let Ok(n) = s.parse::<f64>() {
        return n;
    }
    let mut end = s.len();
    while end > 0 {
        if s.is_char_boundary(end) {
            let prefix = &s[..end];
            let numeric = prefix
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
            if numeric {
                if let Ok(n) = prefix.parse::<f64>() {
                    return n;
                }
            }
        }
        end -= 1;
    }
    f64::NAN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterType;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn params() -> Vec<Parameter> {
        vec![
            Parameter::new("define", ParameterType::StringArray).with_alias('D'),
            Parameter::new("verbose", ParameterType::Boolean).with_alias('v'),
            Parameter::new("jobs", ParameterType::Number).with_alias('j'),
            Parameter::new("buildMode", ParameterType::String),
            Parameter::new("ports", ParameterType::NumberArray),
        ]
    }

    #[test]
    fn test_segment_global_and_tasks() {
        let segments = segment(strings(&["--verbose", "build", "-Dfoo", "test", "--jobs=2"]));
        assert_eq!(segments.global, vec!["--verbose"]);
        assert_eq!(segments.tasks.len(), 2);
        assert_eq!(segments.tasks[0].name, "build");
        assert_eq!(segments.tasks[0].args, vec!["-Dfoo"]);
        assert_eq!(segments.tasks[1].name, "test");
        assert_eq!(segments.tasks[1].args, vec!["--jobs=2"]);
    }

    #[test]
    fn test_segment_double_dash_ends_global_scope() {
        let segments = segment(strings(&["-v", "--", "--dropped", "build", "--kept"]));
        assert_eq!(segments.global, vec!["-v"]);
        assert_eq!(segments.tasks[0].args, vec!["--kept"]);
    }

    #[test]
    fn test_segment_empty() {
        let segments = segment(Vec::<String>::new());
        assert!(segments.global.is_empty());
        assert!(segments.tasks.is_empty());
    }

    #[test]
    fn test_boolean_long_flag() {
        let p = params();
        let verbose = &p[1];
        let cases = [
            ("--verbose", true),
            ("--verbose=false", false),
            ("--verbose=0", false),
            ("--verbose=null", false),
            ("--verbose=yes", true),
            ("--verbose=1", true),
        ];
        for (arg, expected) in cases {
            let map = parse_flags(&strings(&[arg]), &p);
            assert_eq!(
                map.get(verbose).unwrap(),
                &[Value::Boolean(expected)],
                "{arg}"
            );
        }
    }

    #[test]
    fn test_long_flag_name_forms() {
        let p = params();
        let mode = &p[3];
        for arg in ["--buildMode=fast", "--build-mode=fast"] {
            let map = parse_flags(&strings(&[arg]), &p);
            assert_eq!(map.get(mode).unwrap(), &[Value::String("fast".into())]);
        }
    }

    #[test]
    fn test_non_boolean_requires_value() {
        let p = params();
        let map = parse_flags(&strings(&["--build-mode", "--jobs="]), &p);
        assert!(map.is_empty());
    }

    #[test]
    fn test_number_flag() {
        let p = params();
        let map = parse_flags(&strings(&["--jobs=4"]), &p);
        assert_eq!(map.get(&p[2]).unwrap(), &[Value::Number(4.0)]);
    }

    #[test]
    fn test_short_cluster_string_alias() {
        let p = params();
        let map = parse_flags(&strings(&["-Dfoo"]), &p);
        assert_eq!(map.get(&p[0]).unwrap(), &[Value::String("foo".into())]);
    }

    #[test]
    fn test_short_cluster_boolean_then_value() {
        let p = params();
        let map = parse_flags(&strings(&["-vj8"]), &p);
        assert_eq!(map.get(&p[1]).unwrap(), &[Value::Boolean(true)]);
        assert_eq!(map.get(&p[2]).unwrap(), &[Value::Number(8.0)]);
    }

    #[test]
    fn test_short_alias_without_value_is_ignored() {
        let p = params();
        let map = parse_flags(&strings(&["-D"]), &p);
        assert!(!map.contains(&p[0]));
    }

    #[test]
    fn test_repeated_flags_accumulate() {
        let p = params();
        let map = parse_flags(&strings(&["-Da", "--define=b", "-Dc"]), &p);
        let values: Vec<_> = map
            .get(&p[0])
            .unwrap()
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_flags_ignored() {
        let p = params();
        let map = parse_flags(&strings(&["--nope", "-xyz", "--nope=1"]), &p);
        assert!(map.is_empty());
    }

    #[test]
    fn test_env_fallback_constant_case() {
        let p = params();
        let env: HashMap<String, String> = [
            ("BUILD_MODE".to_string(), "release".to_string()),
            ("PORTS".to_string(), "80,,443".to_string()),
            ("VERBOSE".to_string(), "0".to_string()),
        ]
        .into_iter()
        .collect();

        let map = parse_global(&[], &p, &env);
        assert_eq!(map.get(&p[3]).unwrap(), &[Value::String("release".into())]);
        assert_eq!(
            map.get(&p[4]).unwrap(),
            &[Value::Number(80.0), Value::Number(443.0)]
        );
        assert_eq!(map.get(&p[1]).unwrap(), &[Value::Boolean(false)]);
    }

    #[test]
    fn test_env_raw_name() {
        let p = params();
        let env: HashMap<String, String> =
            [("define".to_string(), "A=1,B=2".to_string())].into_iter().collect();
        let map = parse_global(&[], &p, &env);
        assert_eq!(map.get(&p[0]).unwrap().len(), 2);
    }

    #[test]
    fn test_cli_wins_over_env() {
        let p = params();
        let env: HashMap<String, String> =
            [("BUILD_MODE".to_string(), "release".to_string())].into_iter().collect();
        let map = parse_global(&strings(&["--build-mode=debug"]), &p, &env);
        assert_eq!(map.get(&p[3]).unwrap(), &[Value::String("debug".into())]);
    }

    #[test]
    fn test_env_empty_string_skipped_for_non_boolean() {
        let p = params();
        let env: HashMap<String, String> =
            [("BUILD_MODE".to_string(), String::new())].into_iter().collect();
        let map = parse_global(&[], &p, &env);
        assert!(!map.contains(&p[3]));
    }

    #[test]
    fn test_parse_number_prefix() {
        assert_eq!(parse_number("12"), 12.0);
        assert_eq!(parse_number("1.5x"), 1.5);
        assert_eq!(parse_number(" 7"), 7.0);
        assert!(parse_number("abc").is_nan());
    }
}
