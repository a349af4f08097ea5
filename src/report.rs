//! Run summaries for humans and machines.

use crate::executor::{InstallOutcome, InstallResults};
use crate::manifest::DependencyGraph;
use crate::resolve::InstallPlan;
use crate::verify::{TestReport, TestReports};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
    Skipped,
}

/// One plan entry in the summary
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub version: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keg: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub packages: Vec<PackageSummary>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub tests_failed: usize,
}

impl Summary {
    /// Entries in plan order
    pub fn new(
        graph: &DependencyGraph,
        plan: &InstallPlan,
        results: &InstallResults,
        tests: Option<&TestReports>,
    ) -> Self {
        let mut packages = Vec::with_capacity(plan.len());

        for name in &plan.order {
            let Some(outcome) = results.get(name) else {
                continue;
            };
            let version = graph
                .get(name)
                .map(|node| node.version_label())
                .unwrap_or_default();

            let mut entry = PackageSummary {
                name: name.clone(),
                version,
                status: Status::Skipped,
                stage: None,
                error: None,
                reason: None,
                keg: None,
                duration_ms: None,
                tests: tests.and_then(|t| t.get(name)).cloned(),
            };

            match outcome {
                InstallOutcome::Success { keg, duration, .. } => {
                    entry.status = Status::Success;
                    entry.keg = Some(keg.clone());
                    entry.duration_ms = Some(duration.as_millis());
                }
                InstallOutcome::Failed { stage, error } => {
                    entry.status = Status::Failed;
                    entry.stage = Some(stage.to_string());
                    entry.error = Some(error.to_string());
                }
                InstallOutcome::Skipped { reason } => {
                    entry.reason = Some(reason.to_string());
                }
            }
            packages.push(entry);
        }

        let count = |status: Status| packages.iter().filter(|p| p.status == status).count();
        let succeeded = count(Status::Success);
        let failed = count(Status::Failed);
        let skipped = count(Status::Skipped);
        let tests_failed = packages
            .iter()
            .filter(|p| p.tests.as_ref().is_some_and(|t| !t.passed))
            .count();

        Self {
            packages,
            succeeded,
            failed,
            skipped,
            tests_failed,
        }
    }

    /// 0 when everything installed and passed its tests, else 1
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 && self.skipped == 0 && self.tests_failed == 0 {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn print(&self) {
        println!();
        for entry in &self.packages {
            println!("{}", entry_line(entry));
            if let Some(tests) = &entry.tests {
                for failure in &tests.failures {
                    println!("    {} test: {}", "✗".red(), failure);
                }
            }
        }

        println!();
        let mut parts = vec![format!("{} installed", self.succeeded.to_string().bold())];
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed.to_string().red().bold()));
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped.to_string().yellow().bold()));
        }
        if self.tests_failed > 0 {
            parts.push(format!(
                "{} failed tests",
                self.tests_failed.to_string().red().bold()
            ));
        }

        let mark = if self.exit_code() == 0 {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        };
        println!("{} {}", mark, parts.join(", "));
    }
}

/// `  ✓ name version` style line for one entry
pub fn entry_line(entry: &PackageSummary) -> String {
    match entry.status {
        Status::Success => format!(
            "  {} {} {}",
            "✓".green(),
            entry.name.bold().green(),
            entry.version.dimmed()
        ),
        Status::Failed => format!(
            "  {} {} {} failed at {}: {}",
            "✗".red(),
            entry.name.bold().red(),
            entry.version.dimmed(),
            entry.stage.as_deref().unwrap_or("?"),
            entry.error.as_deref().unwrap_or("")
        ),
        Status::Skipped => format!(
            "  {} {} {} skipped: {}",
            "⊘".yellow(),
            entry.name.bold(),
            entry.version.dimmed(),
            entry.reason.as_deref().unwrap_or("")
        ),
    }
}

/// Numbered plan listing for `--dry-run`
pub fn plan_lines(graph: &DependencyGraph, plan: &InstallPlan) -> Vec<String> {
    plan.order
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let node = graph.get(name);
            let version = node.map(|n| n.version_label()).unwrap_or_default();
            let kind = match node {
                Some(n) if n.is_resource() => " (resource)".dimmed().to_string(),
                _ if plan.is_target(name) => String::new(),
                _ => " (dependency)".dimmed().to_string(),
            };
            format!("{:>3}. {} {}{}", idx + 1, name.cyan(), version.dimmed(), kind)
        })
        .collect()
}
