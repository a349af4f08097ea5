//! Install-order resolution.
//!
//! Depth-first post-order traversal with three-color marking. Targets and
//! each node's dependencies are visited in ascending name order, so the same
//! graph and targets always produce the same plan.

use crate::error::ResolveError;
use crate::manifest::DependencyGraph;
use std::collections::{BTreeSet, HashMap};

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Packages in install order: every entry appears after all of its dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub order: Vec<String>,
    pub targets: Vec<String>,
}

impl InstallPlan {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    pub fn is_target(&self, name: &str) -> bool {
        self.targets.iter().any(|t| t == name)
    }

    /// Indented dependency tree of every target, for `--dry-run --verbose`
    pub fn render_tree(&self, graph: &DependencyGraph) -> String {
        let mut out = String::new();
        for target in &self.targets {
            out.push_str(target);
            out.push('\n');
            render_children(graph, target, "", &mut out);
        }
        out
    }
}

fn render_children(graph: &DependencyGraph, name: &str, indent: &str, out: &mut String) {
    let deps = graph.dependencies_of(name);
    for (i, dep) in deps.iter().enumerate() {
        let last = i == deps.len() - 1;
        let branch = if last { "└── " } else { "├── " };
        out.push_str(indent);
        out.push_str(branch);
        out.push_str(dep);
        if graph.get(dep).is_some_and(|n| n.is_resource()) {
            out.push_str(" (resource)");
        }
        out.push('\n');

        let child_indent = format!("{}{}", indent, if last { "    " } else { "│   " });
        render_children(graph, dep, &child_indent, out);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Compute the install plan for `targets`.
///
/// Fails with [`ResolveError::Cycle`] when a dependency cycle is reachable
/// from a target and with [`ResolveError::Unresolved`] when a target or
/// dependency is not in the graph. Never returns a partial plan.
pub fn resolve(graph: &DependencyGraph, targets: &[String]) -> Result<InstallPlan, ResolveError> {
    let roots: BTreeSet<&str> = targets.iter().map(String::as_str).collect();

    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut stack: Vec<String> = Vec::new();
    let mut order = Vec::new();

    for root in &roots {
        if !graph.contains(root) {
            return Err(unresolved(graph, root, None));
        }
        visit(graph, root, &mut marks, &mut stack, &mut order)?;
    }

    tracing::debug!(
        "Resolved {} targets into {} plan entries",
        roots.len(),
        order.len()
    );

    Ok(InstallPlan {
        order,
        targets: roots.into_iter().map(String::from).collect(),
    })
}

fn visit(
    graph: &DependencyGraph,
    name: &str,
    marks: &mut HashMap<String, Mark>,
    stack: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<(), ResolveError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            let start = stack.iter().position(|n| n == name).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].to_vec();
            cycle.push(name.to_string());
            return Err(ResolveError::Cycle { cycle });
        }
        None => {}
    }

    marks.insert(name.to_string(), Mark::InProgress);
    stack.push(name.to_string());

    // dependencies_of is already ascending
    for dep in graph.dependencies_of(name) {
        if !graph.contains(dep) {
            return Err(unresolved(graph, dep, Some(name)));
        }
        visit(graph, dep, marks, stack, order)?;
    }

    stack.pop();
    marks.insert(name.to_string(), Mark::Done);
    order.push(name.to_string());
    Ok(())
}

fn unresolved(graph: &DependencyGraph, name: &str, required_by: Option<&str>) -> ResolveError {
    ResolveError::Unresolved {
        name: name.to_string(),
        required_by: required_by.map(String::from),
        suggestion: suggest(graph, name),
    }
}

/// Closest known name, if any is similar enough
fn suggest(graph: &DependencyGraph, name: &str) -> Option<String> {
    graph
        .names()
        .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)))
        .map(|(_, candidate)| candidate.to_string())
}
