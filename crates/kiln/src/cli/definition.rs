//! Turn a build file into engine targets

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use kiln_core::{BuildFile, DependencyEntry, PathEntry, TargetConfig, When};
use kiln_tasks::parameter::parse_alias;
use kiln_tasks::{
    shell, DynamicList, ExecOptions, ExecutionContext, Parameter, ParameterRegistry, ParameterType,
    Target, TargetGraph,
};
use tracing::{debug, warn};

/// Targets and global parameters declared by a build file
pub struct Definition {
    pub graph: TargetGraph,
    pub parameters: ParameterRegistry,
}

/// Build the target graph and parameter registry
pub fn build(file: &BuildFile) -> anyhow::Result<Definition> {
    let mut declared = Vec::with_capacity(file.parameters.len());
    for (name, config) in &file.parameters {
        let kind: ParameterType = config
            .kind
            .parse()
            .with_context(|| format!("parameter '{}'", name))?;
        let mut parameter = Parameter::new(name, kind);
        if let Some(alias) = &config.alias {
            parameter = parameter.with_alias(parse_alias(name, alias)?);
        }
        declared.push(parameter);
    }
    let parameters = ParameterRegistry::new(declared)?;

    let mut targets = Vec::with_capacity(file.targets.len());
    for (name, config) in &file.targets {
        targets.push(
            build_target(name, config, &parameters).with_context(|| format!("target '{}'", name))?,
        );
    }

    let graph = TargetGraph::new(targets, file.default.as_deref())?;
    debug!(targets = graph.len(), parameters = parameters.len(), "build file translated");
    Ok(Definition { graph, parameters })
}

type Condition = (Parameter, When);

fn build_target(
    name: &str,
    config: &TargetConfig,
    parameters: &ParameterRegistry,
) -> anyhow::Result<Target> {
    let lookup = |parameter: &str| {
        parameters
            .get(parameter)
            .cloned()
            .with_context(|| format!("unknown parameter '{}'", parameter))
    };
    let condition = |when: Option<&When>| -> anyhow::Result<Option<Condition>> {
        when.map(|w| -> anyhow::Result<Condition> { Ok((lookup(w.parameter.as_str())?, w.clone())) })
            .transpose()
    };

    let mut local = Vec::with_capacity(config.parameters.len());
    for parameter in &config.parameters {
        local.push(lookup(parameter.as_str())?);
    }

    let depends_on = config
        .depends_on
        .iter()
        .map(|d: &DependencyEntry| -> anyhow::Result<(String, Option<Condition>)> {
            Ok((d.target().to_string(), condition(d.when())?))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let inputs = path_entries(&config.inputs, &condition)?;
    let outputs = path_entries(&config.outputs, &condition)?;

    let env = Arc::new(CommandEnv {
        parameters: visible_parameters(parameters, &local),
        extra: config.env.clone(),
    });

    let mut target = Target::new(name)
        .with_dependencies(conditional_list(depends_on))
        .with_inputs_list(conditional_list(inputs))
        .with_outputs_list(conditional_list(outputs));
    for parameter in local {
        target = target.with_parameter(parameter);
    }

    if let Some(guard) = &config.only_when {
        let guard = guard.clone();
        let env = env.clone();
        target = target.with_only_when(move |ctx| {
            let guard = guard.clone();
            let options = ExecOptions::new()
                .silent(true)
                .check(false)
                .envs(env.vars(&ctx));
            async move {
                match shell(&guard, &options).await {
                    Ok(output) => output.success(),
                    Err(e) => {
                        warn!(target = %ctx.target(), error = %e, "guard command could not run");
                        false
                    }
                }
            }
        });
    }

    for command in &config.executes {
        let command = command.clone();
        let env = env.clone();
        target = target.with_action(move |ctx| {
            let command = command.clone();
            let options = ExecOptions::new().envs(env.vars(&ctx));
            async move {
                debug!(target = %ctx.target(), %command, "running command");
                shell(&command, &options).await?;
                Ok(())
            }
        });
    }

    Ok(target)
}

fn path_entries<F>(entries: &[PathEntry], condition: &F) -> anyhow::Result<Vec<(String, Option<Condition>)>>
where
    F: Fn(Option<&When>) -> anyhow::Result<Option<Condition>>,
{
    entries
        .iter()
        .map(|e| -> anyhow::Result<(String, Option<Condition>)> {
            Ok((e.path().to_string(), condition(e.when())?))
        })
        .collect()
}

/// Static when nothing is conditional, otherwise evaluated per context
fn conditional_list(entries: Vec<(String, Option<Condition>)>) -> DynamicList {
    if entries.iter().all(|(_, condition)| condition.is_none()) {
        return DynamicList::Static(entries.into_iter().map(|(entry, _)| entry).collect());
    }
    let entries = Arc::new(entries);
    DynamicList::computed(move |ctx: ExecutionContext| {
        let entries = entries.clone();
        async move {
            entries
                .iter()
                .map(|(entry, condition)| match condition {
                    None => Some(entry.clone()),
                    Some((parameter, when)) => {
                        when.holds(ctx.get(parameter).is_truthy()).then(|| entry.clone())
                    }
                })
                .collect()
        }
    })
}

/// Global parameters plus the target's own, without repeats
fn visible_parameters(global: &ParameterRegistry, local: &[Parameter]) -> Vec<Parameter> {
    let mut visible: Vec<Parameter> = global.all().to_vec();
    for parameter in local {
        if !visible.iter().any(|p| p.name() == parameter.name()) {
            visible.push(parameter.clone());
        }
    }
    visible
}

/// Environment exported to a target's commands
struct CommandEnv {
    parameters: Vec<Parameter>,
    extra: BTreeMap<String, String>,
}

impl CommandEnv {
    fn vars(&self, ctx: &ExecutionContext) -> Vec<(String, String)> {
        let mut vars = ctx.env_vars(&self.parameters);
        vars.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_tasks::{CollectingReporter, Runner, TaskStatus};
    use std::collections::HashMap;

    fn definition(content: &str) -> Definition {
        let file: BuildFile = toml::from_str(content).unwrap();
        kiln_core::validate_build_file(&file).unwrap();
        build(&file).unwrap()
    }

    fn make_runner(definition: Definition) -> (Runner, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        let runner = Runner::new(definition.graph, definition.parameters).with_reporter(reporter.clone());
        (runner, reporter)
    }

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_build_registers_parameters_and_targets() {
        let def = definition(
            r#"
default = "build"

[parameters.release]
type = "boolean"
alias = "r"

[targets.build]
depends_on = ["gen"]
parameters = ["release"]

[targets.gen]
"#,
        );
        assert_eq!(def.graph.len(), 2);
        assert_eq!(def.graph.default_target(), Some("build"));
        let release = def.parameters.get("release").unwrap();
        assert_eq!(release.alias(), Some('r'));
        assert!(release.is_boolean());
        assert_eq!(def.graph.get("build").unwrap().parameters().len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_dependency() {
        let def = definition(
            r#"
[parameters.release]
type = "boolean"

[targets.build]
depends_on = ["gen", { target = "strip", when = "release" }]

[targets.gen]

[targets.strip]
"#,
        );
        let (runner, _) = make_runner(def);

        let plan = runner.plan(["build"], &no_env()).await.unwrap();
        assert_eq!(plan.len(), 2);
        assert!(plan.get("strip").is_none());

        let plan = runner.plan(["--release", "build"], &no_env()).await.unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.get("build").unwrap().dependencies, vec!["gen", "strip"]);
    }

    #[test]
    fn test_visible_parameters_dedup() {
        let global = ParameterRegistry::new(vec![Parameter::new("mode", ParameterType::String)]).unwrap();
        let local = vec![
            Parameter::new("mode", ParameterType::String),
            Parameter::new("define", ParameterType::StringArray),
        ];
        let names: Vec<String> = visible_parameters(&global, &local)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["mode", "define"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_commands_see_parameters_in_env() {
        let def = definition(
            r#"
[parameters.build-mode]

[targets.check]
executes = ["test \"$BUILD_MODE\" = release", "test \"$GREETING\" = hi"]
env = { GREETING = "hi" }
"#,
        );
        let (runner, _) = make_runner(def);

        let summary = runner.run(["--build-mode=release", "check"], &no_env()).await.unwrap();
        assert_eq!(summary.get("check").unwrap().status, TaskStatus::Success);

        let summary = runner.run(["--build-mode=debug", "check"], &no_env()).await.unwrap();
        assert_eq!(
            summary.get("check").unwrap().status,
            TaskStatus::Failed("exit code: 1".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_only_when_command() {
        let def = definition(
            r#"
[targets.never]
only_when = "false"
executes = ["exit 3"]

[targets.always]
only_when = "true"
executes = ["true"]
"#,
        );
        let (runner, reporter) = make_runner(def);
        let summary = runner.run(["never", "always"], &no_env()).await.unwrap();
        assert!(summary.success());
        assert_eq!(
            summary.get("never").unwrap().status,
            TaskStatus::Skipped("condition unmet".to_string())
        );
        assert_eq!(reporter.started(), vec!["always"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_outputs_make_rerun_a_no_op() {
        let temp = tempfile::TempDir::new().unwrap();
        let src = temp.path().join("a.src");
        let out = temp.path().join("a.out");
        std::fs::write(&src, "x").unwrap();
        let content = format!(
            "[targets.compile]\ninputs = [\"{src}\"]\noutputs = [\"{out}\"]\nexecutes = [\"cp {src} {out}\"]\n",
            src = src.display(),
            out = out.display()
        );

        let (runner, reporter) = make_runner(definition(&content));
        runner.run(["compile"], &no_env()).await.unwrap();
        assert_eq!(reporter.started(), vec!["compile"]);

        let (runner, reporter) = make_runner(definition(&content));
        let summary = runner.run(["compile"], &no_env()).await.unwrap();
        assert_eq!(
            summary.get("compile").unwrap().status,
            TaskStatus::Skipped("up to date".to_string())
        );
        assert!(reporter.started().is_empty());
    }
}
