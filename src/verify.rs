//! Post-install smoke tests.
//!
//! Only packages whose install succeeded are tested. Test commands run in
//! the keg with the same placeholders and `SCOBY_*` variables as install
//! steps. A failing test is reported but never changes the install outcome.

use crate::executor::{InstallEnv, InstallOutcome, InstallResults, StepContext, check_run};
use crate::manifest::{DependencyGraph, Package, TestStep};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub passed: bool,
    /// One message per failing test step
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TestReports(BTreeMap<String, TestReport>);

impl TestReports {
    pub fn get(&self, name: &str) -> Option<&TestReport> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TestReport)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn all_passed(&self) -> bool {
        self.0.values().all(|r| r.passed)
    }

    /// Package name to pass/fail
    pub fn passed_map(&self) -> BTreeMap<String, bool> {
        self.0
            .iter()
            .map(|(name, report)| (name.clone(), report.passed))
            .collect()
    }
}

pub struct Verifier {
    env: InstallEnv,
    timeout: Duration,
}

impl Verifier {
    pub fn new(env: InstallEnv, timeout: Duration) -> Self {
        Self { env, timeout }
    }

    pub async fn verify(&self, graph: &DependencyGraph, results: &InstallResults) -> TestReports {
        let mut reports = BTreeMap::new();

        for (name, outcome) in results {
            let InstallOutcome::Success { keg, .. } = outcome else {
                continue;
            };
            let Some(package) = graph.package(name) else {
                continue;
            };

            let report = self.run_tests(package, keg).await;
            if report.passed {
                tracing::debug!("Tests passed for {}", name);
            } else {
                tracing::info!("Tests failed for {}: {:?}", name, report.failures);
            }
            reports.insert(name.clone(), report);
        }

        TestReports(reports)
    }

    async fn run_tests(&self, package: &Package, keg: &Path) -> TestReport {
        let ctx = StepContext::new(&self.env.layout, package, keg, keg);
        let mut failures = Vec::new();

        for test in &package.test_steps {
            match test {
                TestStep::Exists { path } => {
                    let full = keg.join(path);
                    if !full.exists() {
                        failures.push(format!("{} does not exist", full.display()));
                    }
                }
                TestStep::Command {
                    step,
                    expect_output,
                } => {
                    let spec = ctx.command(step);
                    let result = self.env.runner.run(&spec, self.timeout).await;
                    match check_run(&spec, result) {
                        Ok(output) => {
                            if let Some(expected) = expect_output {
                                if !output.combined().contains(expected.as_str()) {
                                    failures.push(format!(
                                        "`{}` output did not contain {:?}",
                                        spec.argv.join(" "),
                                        expected
                                    ));
                                }
                            }
                        }
                        Err(e) => failures.push(e.to_string()),
                    }
                }
            }
        }

        TestReport {
            passed: failures.is_empty(),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_map() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), TestReport { passed: true, failures: vec![] });
        map.insert(
            "b".to_string(),
            TestReport {
                passed: false,
                failures: vec!["boom".into()],
            },
        );
        let reports = TestReports(map);

        assert!(!reports.all_passed());
        assert_eq!(
            reports.passed_map(),
            BTreeMap::from([("a".to_string(), true), ("b".to_string(), false)])
        );
    }

    #[test]
    fn test_empty_reports_pass() {
        assert!(TestReports::default().all_passed());
    }
}
