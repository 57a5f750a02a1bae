//! Command line handling
//!
//! The command line uses the engine's own argument grammar. Tool options
//! (`--build-file`, `--list`, `--plan`, `--format`, `--help`) are parameters
//! like any other, resolved from the global scope and from `KILN_*`
//! environment variables.

pub mod definition;
pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use kiln_core::{load_build_file, load_build_file_from_dir, BuildFile};
use kiln_tasks::args::parse_global;
use kiln_tasks::{
    segment, EnvSource, Parameter, ParameterMap, ParameterType, ProcessEnv, ReporterSet, RunError,
    Runner, TaskReporter, TracingReporter, Value,
};
use tracing::info;

use crate::exit_codes;
use crate::signals;

const USAGE: &str = "\
Usage: kiln [options] [--] <target> [target options] [<target> [target options] ...]

Options:
  --build-file=<path>  Use this build file instead of searching upward (KILN_BUILD_FILE)
  --list               List targets and parameters
  --plan               Print the execution plan without running
  --format=text|json   Output format (KILN_FORMAT)
  --help               Show this help

Parameters declared in the build file are accepted before the first target,
or as CONSTANT_CASE environment variables.";

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("Invalid format '{}' (expected text or json)", other),
        }
    }
}

/// Reads `KILN_`-prefixed variables for the tool's own options
struct PrefixedEnv<'a> {
    prefix: &'a str,
    inner: &'a dyn EnvSource,
}

impl EnvSource for PrefixedEnv<'_> {
    fn var(&self, key: &str) -> Option<String> {
        self.inner.var(&format!("{}{}", self.prefix, key))
    }
}

/// Tool options resolved from the global scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub build_file: Option<PathBuf>,
    pub list: bool,
    pub plan: bool,
    pub help: bool,
    pub format: OutputFormat,
}

impl Options {
    fn parameters() -> [Parameter; 5] {
        [
            Parameter::new("build-file", ParameterType::String),
            Parameter::new("list", ParameterType::Boolean),
            Parameter::new("plan", ParameterType::Boolean),
            Parameter::new("format", ParameterType::String),
            Parameter::new("help", ParameterType::Boolean),
        ]
    }

    /// Resolve options from raw arguments and the environment
    pub fn resolve(args: &[String], env: &dyn EnvSource) -> anyhow::Result<Self> {
        let segments = segment(args.iter().cloned());
        let parameters = Self::parameters();
        let prefixed = PrefixedEnv {
            prefix: "KILN_",
            inner: env,
        };
        let map = parse_global(&segments.global, &parameters, &prefixed);
        let [build_file, list, plan, format, help] = &parameters;

        Ok(Self {
            build_file: match first(&map, build_file) {
                Some(Value::String(s)) => Some(PathBuf::from(s)),
                _ => None,
            },
            list: flag(&map, list),
            plan: flag(&map, plan),
            help: flag(&map, help),
            format: match first(&map, format) {
                Some(Value::String(s)) => s.parse()?,
                _ => OutputFormat::default(),
            },
        })
    }
}

fn first<'a>(map: &'a ParameterMap, parameter: &Parameter) -> Option<&'a Value> {
    map.get(parameter).and_then(|values| values.first())
}

fn flag(map: &ParameterMap, parameter: &Parameter) -> bool {
    first(map, parameter)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Run the CLI and return the process exit code
pub fn run(args: Vec<String>) -> anyhow::Result<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(args))
}

async fn execute(args: Vec<String>) -> anyhow::Result<i32> {
    let options = Options::resolve(&args, &ProcessEnv)?;
    if options.help {
        println!("{}", USAGE);
        return Ok(exit_codes::SUCCESS);
    }

    let (file, path) = load(&options)?;
    if let Some(root) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::env::set_current_dir(root)
            .with_context(|| format!("cannot enter {}", root.display()))?;
    }
    info!(path = %path.display(), "using build file");

    if options.list {
        match options.format {
            OutputFormat::Text => print!("{}", output::list_text(&file)),
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&output::list_json(&file))?)
            }
        }
        return Ok(exit_codes::SUCCESS);
    }

    let definition = definition::build(&file)?;
    let reporter: Arc<dyn TaskReporter> = Arc::new(reporters(options.format));
    let runner = Runner::new(definition.graph, definition.parameters).with_reporter(reporter);

    if options.plan {
        let plan = match runner.plan(args, &ProcessEnv).await {
            Ok(plan) => plan,
            Err(e) => return Ok(report_run_error(&e)),
        };
        match options.format {
            OutputFormat::Text => print!("{}", plan.execution_plan()),
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&output::plan_json(&plan))?)
            }
        }
        return Ok(exit_codes::SUCCESS);
    }

    let trap = signals::trap();
    let result = runner.run(args, &ProcessEnv).await;
    trap.abort();

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => return Ok(report_run_error(&e)),
    };
    match options.format {
        OutputFormat::Text => output::print_failures(&summary),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output::summary_json(&summary))?)
        }
    }
    Ok(summary.exit_code())
}

/// Task events always reach the log; text mode also prints them
fn reporters(format: OutputFormat) -> ReporterSet {
    let mut reporters = ReporterSet::new();
    reporters.register(Arc::new(TracingReporter));
    if format == OutputFormat::Text {
        reporters.register(Arc::new(output::ConsoleReporter));
    }
    reporters
}

fn load(options: &Options) -> anyhow::Result<(BuildFile, PathBuf)> {
    match &options.build_file {
        Some(path) => {
            let file = load_build_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Ok((file, path.clone()))
        }
        None => {
            let cwd = std::env::current_dir()?;
            Ok(load_build_file_from_dir(&cwd)?)
        }
    }
}

fn report_run_error(err: &RunError) -> i32 {
    output::error(&err.to_string());
    output::available_targets(err.available());
    exit_codes::ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_options_from_flags() {
        let env: HashMap<String, String> = HashMap::new();
        let options = Options::resolve(
            &args(&["--plan", "--format=json", "--build-file=ci/kiln.toml", "build", "--list"]),
            &env,
        )
        .unwrap();
        assert!(options.plan);
        assert!(!options.list);
        assert_eq!(options.format, OutputFormat::Json);
        assert_eq!(options.build_file, Some(PathBuf::from("ci/kiln.toml")));
    }

    #[test]
    fn test_options_from_prefixed_env() {
        let env: HashMap<String, String> = [
            ("KILN_BUILD_FILE".to_string(), "other.yaml".to_string()),
            ("FORMAT".to_string(), "json".to_string()),
        ]
        .into();
        let options = Options::resolve(&args(&["build"]), &env).unwrap();
        assert_eq!(options.build_file, Some(PathBuf::from("other.yaml")));
        assert_eq!(options.format, OutputFormat::Text);
    }

    #[test]
    fn test_invalid_format() {
        let env: HashMap<String, String> = HashMap::new();
        let err = Options::resolve(&args(&["--format=xml"]), &env).unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_failures_are_logged_in_every_format() {
        assert_eq!(reporters(OutputFormat::Text).len(), 2);
        assert_eq!(reporters(OutputFormat::Json).len(), 1);
    }

    #[test]
    fn test_default_options() {
        let env: HashMap<String, String> = HashMap::new();
        assert_eq!(Options::resolve(&[], &env).unwrap(), Options::default());
    }
}
