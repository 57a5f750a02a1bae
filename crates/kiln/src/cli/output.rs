//! Output formatting

use console::style;
use kiln_core::BuildFile;
use kiln_tasks::{Plan, RunSummary, TaskEvent, TaskReporter, TaskStatus};

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Print the names a failed lookup could have used
pub fn available_targets(names: &[String]) {
    if names.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("{}", header("Available targets:"));
    for name in names {
        eprintln!("  {}", style(name).cyan());
    }
}

/// Live progress on the terminal
pub struct ConsoleReporter;

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { target } => {
                println!("{} {}", style("▸").dim(), style(target).bold());
            }
            TaskEvent::Completed { target, duration } => {
                println!(
                    "{} {} {}",
                    style("✓").green(),
                    style(target).green(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim()
                );
            }
            TaskEvent::Skipped { target, reason } => {
                println!(
                    "{} {} {}",
                    style("○").yellow(),
                    style(target).yellow(),
                    style(format!("({})", reason)).dim()
                );
            }
            TaskEvent::Failed {
                target,
                duration,
                error,
            } => {
                println!(
                    "{} {} {} {}",
                    style("✗").red(),
                    style(target).red(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                    style(error).red().dim()
                );
            }
            TaskEvent::AllCompleted {
                failed, duration, ..
            } => {
                if *failed == 0 {
                    println!(
                        "{} Done in {:.1}s",
                        style("✓").green().bold(),
                        duration.as_secs_f64()
                    );
                }
            }
        }
    }
}

/// Summary printed after a failed text-mode run
pub fn print_failures(summary: &RunSummary) {
    let failed = summary.failed();
    if failed.is_empty() {
        return;
    }
    println!();
    println!(
        "{} {}/{} targets failed:",
        style("✗").red().bold(),
        failed.len(),
        summary.results.len()
    );
    for result in failed {
        if let TaskStatus::Failed(ref err) = result.status {
            println!("  {} {}: {}", style("✗").red(), result.target, err);
        }
    }
}

/// Run summary for `--format=json`
pub fn summary_json(summary: &RunSummary) -> serde_json::Value {
    let failed = summary.failed().len();
    serde_json::json!({
        "success": summary.success(),
        "total": summary.results.len(),
        "succeeded": summary.results.len() - failed,
        "failed": failed,
        "skipped": summary.skipped(),
        "duration_ms": summary.duration.as_millis(),
        "targets": summary.results.iter().map(|r| {
            let (status, detail) = match &r.status {
                TaskStatus::Success => ("success", None),
                TaskStatus::Skipped(reason) => ("skipped", Some(reason)),
                TaskStatus::Failed(error) => ("failed", Some(error)),
            };
            serde_json::json!({
                "name": r.target,
                "status": status,
                "detail": detail,
                "duration_ms": r.duration.as_millis(),
            })
        }).collect::<Vec<_>>(),
    })
}

/// Execution plan for `--plan --format=json`
pub fn plan_json(plan: &Plan) -> serde_json::Value {
    serde_json::json!({
        "waves": plan.waves(),
        "targets": plan.names().iter().filter_map(|name| plan.get(name)).map(|node| {
            serde_json::json!({
                "name": node.target.name(),
                "dependencies": node.dependencies,
                "wave": node.wave,
            })
        }).collect::<Vec<_>>(),
    })
}

/// Targets and parameters of a build file, for `--list`
pub fn list_text(file: &BuildFile) -> String {
    let mut out = String::new();
    out.push_str(&header("Targets:"));
    out.push('\n');
    for (name, target) in &file.targets {
        let mut line = format!("  {}", style(name).cyan());
        if file.default.as_deref() == Some(name) {
            line.push_str(&format!(" {}", style("(default)").dim()));
        }
        if let Some(description) = &target.description {
            line.push_str(&format!("  {}", description));
        }
        out.push_str(&line);
        out.push('\n');
        if !target.depends_on.is_empty() {
            let deps: Vec<&str> = target.depends_on.iter().map(|d| d.target()).collect();
            out.push_str(&format!("    {} {}\n", style("after:").dim(), deps.join(", ")));
        }
    }

    if !file.parameters.is_empty() {
        out.push('\n');
        out.push_str(&header("Parameters:"));
        out.push('\n');
        for (name, parameter) in &file.parameters {
            let mut line = format!("  --{}", name);
            if let Some(alias) = &parameter.alias {
                line.push_str(&format!(", -{}", alias));
            }
            line.push_str(&format!("  {}", style(&parameter.kind).dim()));
            if let Some(description) = &parameter.description {
                line.push_str(&format!("  {}", description));
            }
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Targets and parameters for `--list --format=json`
pub fn list_json(file: &BuildFile) -> serde_json::Value {
    serde_json::json!({
        "default": file.default,
        "targets": file.targets.iter().map(|(name, target)| {
            serde_json::json!({
                "name": name,
                "description": target.description,
                "depends_on": target.depends_on.iter().map(|d| d.target()).collect::<Vec<_>>(),
            })
        }).collect::<Vec<_>>(),
        "parameters": file.parameters.iter().map(|(name, parameter)| {
            serde_json::json!({
                "name": name,
                "type": parameter.kind,
                "alias": parameter.alias,
                "description": parameter.description,
            })
        }).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_tasks::TaskResult;
    use std::time::Duration;

    #[test]
    fn test_summary_json() {
        let summary = RunSummary {
            results: vec![
                TaskResult {
                    target: "gen".to_string(),
                    status: TaskStatus::Skipped("up to date".to_string()),
                    duration: Duration::from_millis(2),
                },
                TaskResult {
                    target: "build".to_string(),
                    status: TaskStatus::Failed("exit code: 2".to_string()),
                    duration: Duration::from_millis(40),
                },
            ],
            duration: Duration::from_millis(45),
        };
        let json = summary_json(&summary);
        assert_eq!(json["success"], false);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["skipped"], 1);
        assert_eq!(json["targets"][1]["status"], "failed");
        assert_eq!(json["targets"][1]["detail"], "exit code: 2");
    }

    #[test]
    fn test_list_marks_default() {
        let file: BuildFile = toml::from_str(
            "default = \"build\"\n[targets.build]\ndescription = \"Compile\"\ndepends_on = [\"gen\"]\n[targets.gen]\n",
        )
        .unwrap();
        console::set_colors_enabled(false);
        let text = list_text(&file);
        assert!(text.contains("build (default)  Compile"));
        assert!(text.contains("after: gen"));

        let json = list_json(&file);
        assert_eq!(json["targets"][0]["depends_on"][0], "gen");
    }
}
