
use scoby::executor::{ExecuteOptions, Executor, InstallResults};
use scoby::manifest::DependencyGraph;
use scoby::resolve::resolve;
use scoby::verify::Verifier;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{Formula, MockRunner, TestEnvironment, catalog};

async fn install_and_verify(
    env: &TestEnvironment,
    formulae: Vec<Formula>,
    targets: &[&str],
    runner: MockRunner,
) -> (DependencyGraph, InstallResults, scoby::TestReports, Arc<MockRunner>) {
    let (graph, fetcher) = catalog(formulae);
    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    let plan = resolve(&graph, &targets).unwrap();

    let runner = Arc::new(runner);
    let install_env = env.install_env(Arc::new(fetcher), runner.clone());
    let results = Executor::new(install_env.clone(), ExecuteOptions::default())
        .execute(&graph, &plan)
        .await;
    let reports = Verifier::new(install_env, Duration::from_secs(30))
        .verify(&graph, &results)
        .await;

    (graph, results, reports, runner)
}

#[tokio::test]
async fn test_passing_tests() {
    let env = TestEnvironment::new();
    let dotcat = Formula::new("dotcat", "0.9.6").tests(json!([
        {"run": ["dotcat-version"], "expect_output": "dotcat v0.9.6"},
        {"exists": "bin/dotcat"}
    ]));
    let runner = MockRunner::new().stdout("dotcat-version", "dotcat v0.9.6\n");

    let (_, _, reports, runner) = install_and_verify(&env, vec![dotcat], &["dotcat"], runner).await;

    assert!(reports.all_passed());
    assert_eq!(reports.passed_map()["dotcat"], true);

    // Tests run inside the keg
    let test_call = runner.calls().into_iter().last().unwrap();
    assert_eq!(test_call.cwd, Some(env.keg("dotcat", "0.9.6")));
}

#[tokio::test]
async fn test_output_mismatch_fails_without_touching_outcome() {
    let env = TestEnvironment::new();
    let dotcat = Formula::new("dotcat", "0.9.6").tests(json!([
        {"run": ["dotcat-version"], "expect_output": "dotcat v0.9.6"}
    ]));
    let runner = MockRunner::new().stdout("dotcat-version", "dotcat v0.9.5\n");

    let (_, results, reports, _) = install_and_verify(&env, vec![dotcat], &["dotcat"], runner).await;

    let report = reports.get("dotcat").unwrap();
    assert!(!report.passed);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("did not contain"));
    assert!(results["dotcat"].is_success());
}

#[tokio::test]
async fn test_failing_command_and_missing_path() {
    let env = TestEnvironment::new();
    let tool = Formula::new("tool", "1.0").tests(json!([
        ["tool-selftest"],
        {"exists": "share/tool/data.json"}
    ]));
    let runner = MockRunner::new().fail("tool-selftest", 4, "assertion failed");

    let (_, _, reports, _) = install_and_verify(&env, vec![tool], &["tool"], runner).await;

    let report = reports.get("tool").unwrap();
    assert!(!report.passed);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures[0].contains("exited with status 4"));
    assert!(report.failures[1].contains("does not exist"));
}

#[tokio::test]
async fn test_only_successful_packages_are_tested() {
    let env = TestEnvironment::new();
    let formulae = vec![
        Formula::new("broken", "1.0")
            .steps(json!([["explode"]]))
            .tests(json!([["broken-test"]])),
        Formula::new("needs-broken", "1.0")
            .depends_on(&["broken"])
            .tests(json!([["needs-broken-test"]])),
        Formula::new("fine", "1.0").resource("certifi"),
    ];
    let runner = MockRunner::new().fail("explode", 1, "");

    let (_, _, reports, runner) =
        install_and_verify(&env, formulae, &["needs-broken", "fine"], runner).await;

    // No tests declared passes vacuously; resources and failures are left out
    assert_eq!(reports.len(), 1);
    assert!(reports.get("fine").unwrap().passed);
    assert!(reports.get("certifi").is_none());

    let programs = runner.programs();
    assert!(!programs.contains(&"broken-test".to_string()));
    assert!(!programs.contains(&"needs-broken-test".to_string()));
}

#[cfg(unix)]
#[tokio::test]
async fn test_real_commands_with_placeholders() {
    use scoby::runner::SystemRunner;

    let env = TestEnvironment::new();
    let (graph, fetcher) = catalog(vec![
        Formula::new("greeter", "2.1")
            .steps(json!([
                ["mkdir", "-p", "{keg}/bin"],
                ["sh", "-c", "printf '#!/bin/sh\\necho hello from %s\\n' \"$0\" > \"$SCOBY_KEG/bin/greeter\"", "{name}"],
                ["chmod", "+x", "{keg}/bin/greeter"]
            ]))
            .tests(json!([
                {"run": ["{keg}/bin/greeter"], "expect_output": "hello from greeter"},
                {"exists": "bin/greeter"}
            ])),
    ]);
    let plan = resolve(&graph, &["greeter".to_string()]).unwrap();

    let install_env = scoby::InstallEnv::new(env.layout(), Arc::new(fetcher), Arc::new(SystemRunner));
    let results = Executor::new(install_env.clone(), ExecuteOptions::default())
        .execute(&graph, &plan)
        .await;
    assert!(results["greeter"].is_success(), "{:?}", results["greeter"]);

    let reports = Verifier::new(install_env, Duration::from_secs(30))
        .verify(&graph, &results)
        .await;
    assert!(reports.all_passed(), "{:?}", reports);
    assert!(env.prefix.join("bin/greeter").exists());
}
