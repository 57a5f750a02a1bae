//! Target graph and dependency closure resolution

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::args::{parse_flags, ParameterMap, TaskArgs};
use crate::context::ExecutionContext;
use crate::target::Target;

/// Immutable set of declared targets
#[derive(Debug, Clone)]
pub struct TargetGraph {
    targets: HashMap<String, Arc<Target>>,
    /// Order the targets were given in
    order: Vec<String>,
    default: Option<String>,
}

impl TargetGraph {
    /// Build the graph, validating names, static dependencies and the default
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub fn new(targets: Vec<Target>, default: Option<&str>) -> Result<Self, GraphError> {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for target in targets {
            let name = target.name().to_string();
            if map.contains_key(&name) {
                return Err(GraphError::DuplicateTarget(name));
            }
            order.push(name.clone());
            map.insert(name, Arc::new(target));
        }

        for name in &order {
            let target = &map[name];
            for dep in target.depends_on().static_entries() {
                if !map.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        target: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if let Some(default) = default {
            if !map.contains_key(default) {
                return Err(GraphError::UnknownDefault(default.to_string()));
            }
        }

        debug!(targets = order.len(), default = ?default, "target graph built");
        Ok(Self {
            targets: map,
            order,
            default: default.map(str::to_string),
        })
    }

    /// Get a target by name
    pub fn get(&self, name: &str) -> Option<&Arc<Target>> {
        self.targets.get(name)
    }

    /// Check if a target is declared
    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Target names in the order they were given
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Get the default target
    pub fn default_target(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// One target of a resolved closure
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub target: Arc<Target>,
    pub context: ExecutionContext,
    /// Direct dependencies, filtered and deduplicated
    pub dependencies: Vec<String>,
    /// Targets that depend directly on this one
    pub dependents: Vec<String>,
    /// Longest dependency depth; nodes in the same wave are independent
    pub wave: usize,
}

/// The transitive dependency closure of the requested targets
#[derive(Debug, Clone)]
pub struct Plan {
    nodes: HashMap<String, PlanNode>,
    /// Order in which the closure walk discovered targets
    discovered: Vec<String>,
    waves: Vec<Vec<String>>,
}

impl Plan {
    /// Walk outward from the requested targets.
    ///
    /// Each target's task-scope arguments are parsed against its own
    /// parameters to build its context. Dependencies that were not requested
    /// themselves inherit the arguments of the target that pulled them in.
    #[instrument(skip_all, fields(requested = requested.len()))]
    pub async fn resolve(
        graph: &TargetGraph,
        requested: &[TaskArgs],
        global: Arc<ParameterMap>,
    ) -> Result<Self, GraphError> {
        let mut args_by_name: HashMap<String, Vec<String>> = HashMap::new();
        let mut discovered = Vec::new();
        let mut queue = VecDeque::new();

        for task in requested {
            if !graph.contains(&task.name) {
                return Err(GraphError::UnknownTarget(task.name.clone()));
            }
            if let Some(previous) = args_by_name.insert(task.name.clone(), task.args.clone()) {
                debug!(
                    target = %task.name,
                    dropped = ?previous,
                    "target requested again, keeping the later arguments"
                );
                continue;
            }
            discovered.push(task.name.clone());
            queue.push_back(task.name.clone());
        }

        let mut resolved: HashMap<String, (ExecutionContext, Vec<String>)> = HashMap::new();
        while let Some(name) = queue.pop_front() {
            let Some(target) = graph.get(&name) else {
                return Err(GraphError::UnknownTarget(name));
            };
            let args = args_by_name.get(&name).cloned().unwrap_or_default();
            let local = parse_flags(&args, target.parameters());
            let context = ExecutionContext::new(name.clone(), args.clone(), local, global.clone());

            let mut seen = HashSet::new();
            let mut dependencies = Vec::new();
            for dep in target.depends_on().resolve(&context).await {
                if !graph.contains(&dep) {
                    return Err(GraphError::UnknownDependency {
                        target: name.clone(),
                        dependency: dep,
                    });
                }
                if !seen.insert(dep.clone()) {
                    continue;
                }
                if args_by_name.contains_key(&dep) {
                    debug!(target = %name, dependency = %dep, "dropped a possible circular dependency");
                } else {
                    args_by_name.insert(dep.clone(), args.clone());
                    discovered.push(dep.clone());
                    queue.push_back(dep.clone());
                }
                dependencies.push(dep);
            }
            resolved.insert(name, (context, dependencies));
        }

        let mut nodes: HashMap<String, PlanNode> = HashMap::new();
        for name in &discovered {
            let Some((context, dependencies)) = resolved.remove(name) else {
                continue;
            };
            let Some(target) = graph.get(name) else {
                continue;
            };
            nodes.insert(
                name.clone(),
                PlanNode {
                    target: target.clone(),
                    context,
                    dependencies,
                    dependents: Vec::new(),
                    wave: 0,
                },
            );
        }

        let edges: Vec<(String, String)> = discovered
            .iter()
            .filter_map(|name| nodes.get(name).map(|n| (name, n)))
            .flat_map(|(name, node)| {
                node.dependencies
                    .iter()
                    .map(move |dep| (dep.clone(), name.clone()))
            })
            .collect();
        for (dep, dependent) in edges {
            if let Some(node) = nodes.get_mut(&dep) {
                node.dependents.push(dependent);
            }
        }

        let sorted = topological_sort(&nodes, &discovered)?;
        let waves = compute_waves(&mut nodes, &sorted);

        info!(
            target_count = nodes.len(),
            wave_count = waves.len(),
            "dependency closure resolved"
        );

        Ok(Self {
            nodes,
            discovered,
            waves,
        })
    }

    /// Get a node by target name
    pub fn get(&self, name: &str) -> Option<&PlanNode> {
        self.nodes.get(name)
    }

    /// Get all nodes
    pub fn nodes(&self) -> &HashMap<String, PlanNode> {
        &self.nodes
    }

    /// Names in the order the walk discovered them
    pub fn names(&self) -> &[String] {
        &self.discovered
    }

    /// Get target names grouped by wave
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Human-readable plan, one wave per block
    pub fn execution_plan(&self) -> String {
        let mut plan = String::new();
        for (i, wave) in self.waves.iter().enumerate() {
            plan.push_str(&format!("Wave {} ({} targets):\n", i, wave.len()));
            for name in wave {
                let Some(node) = self.nodes.get(name) else {
                    continue;
                };
                if node.dependencies.is_empty() {
                    plan.push_str(&format!("  {}\n", name));
                } else {
                    plan.push_str(&format!(
                        "  {} (after: {})\n",
                        name,
                        node.dependencies.join(", ")
                    ));
                }
            }
        }
        plan
    }
}

/// Kahn's algorithm; anything left unsorted sits on a cycle
fn topological_sort(
    nodes: &HashMap<String, PlanNode>,
    discovered: &[String],
) -> Result<Vec<String>, GraphError> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    let mut sorted: Vec<String> = Vec::new();

    for name in discovered {
        let Some(node) = nodes.get(name) else {
            continue;
        };
        let degree = node.dependencies.len();
        in_degree.insert(name, degree);
        if degree == 0 {
            queue.push_back(name);
        }
    }

    while let Some(name) = queue.pop_front() {
        sorted.push(name.to_string());
        if let Some(node) = nodes.get(name) {
            for dependent in &node.dependents {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    if sorted.len() != nodes.len() {
        let in_sorted: HashSet<&String> = sorted.iter().collect();
        let cyclic: Vec<&str> = discovered
            .iter()
            .filter(|name| !in_sorted.contains(name))
            .map(String::as_str)
            .collect();
        return Err(GraphError::Cycle(cyclic.join(", ")));
    }

    Ok(sorted)
}

fn compute_waves(nodes: &mut HashMap<String, PlanNode>, sorted: &[String]) -> Vec<Vec<String>> {
    let mut wave_map: HashMap<String, usize> = HashMap::new();
    for name in sorted {
        if let Some(node) = nodes.get(name) {
            let wave = node
                .dependencies
                .iter()
                .filter_map(|dep| wave_map.get(dep))
                .max()
                .map(|w| w + 1)
                .unwrap_or(0);
            wave_map.insert(name.clone(), wave);
        }
    }

    let max_wave = wave_map.values().max().copied().unwrap_or(0);
    let mut waves: Vec<Vec<String>> = if wave_map.is_empty() {
        Vec::new()
    } else {
        vec![Vec::new(); max_wave + 1]
    };
    for name in sorted {
        if let Some(&wave) = wave_map.get(name) {
            waves[wave].push(name.clone());
            if let Some(node) = nodes.get_mut(name) {
                node.wave = wave;
            }
        }
    }
    waves
}

/// Errors in the target graph or closure
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Target '{0}' is declared more than once")]
    DuplicateTarget(String),

    #[error("Target '{target}' depends on unknown target '{dependency}'")]
    UnknownDependency { target: String, dependency: String },

    #[error("Default target '{0}' is not declared")]
    UnknownDefault(String),

    #[error("Target '{0}' was not found")]
    UnknownTarget(String),

    #[error("Cyclic dependency detected among targets: {0}")]
    Cycle(String),
}
