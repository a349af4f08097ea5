//! Plan execution: fetch, verify, unpack, build, link.
//!
//! Packages are processed in plan order. A package whose checksum does not
//! match never reaches its build steps. When a package fails, every plan
//! entry that depends on it, directly or transitively, is marked skipped
//! and never attempted; packages on independent branches carry on.
//!
//! With `jobs > 1` independent packages run concurrently. A package starts
//! only once all of its dependencies are terminal, and ready packages are
//! started in plan order, so `jobs == 1` is exactly sequential plan order.
//!
//! # Examples
//!
//! ```no_run
//! use scoby::config::Layout;
//! use scoby::executor::{ExecuteOptions, Executor, InstallEnv};
//! use scoby::{manifest, resolve};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let graph = manifest::load_paths(&[std::path::PathBuf::from("Formula")])?;
//!     let plan = resolve::resolve(&graph, &["dotcat".to_string()])?;
//!
//!     let env = InstallEnv::system(Layout::from_env(None))?;
//!     let results = Executor::new(env, ExecuteOptions::default())
//!         .execute(&graph, &plan)
//!         .await;
//!
//!     for (name, outcome) in &results {
//!         println!("{}: {}", name, outcome.label());
//!     }
//!     Ok(())
//! }
//! ```

use crate::cancel::CancelToken;
use crate::config::{DEFAULT_TIMEOUT, Layout};
use crate::error::InstallError;
use crate::extract;
use crate::fetch::{self, FetchRequest, Fetcher, HttpFetcher};
use crate::link;
use crate::manifest::{DependencyGraph, Node, Package, Resource, Step, Version};
use crate::receipt::InstallReceipt;
use crate::resolve::InstallPlan;
use crate::runner::{CommandRunner, CommandSpec, RunError, SystemRunner};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Where a package's install stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Fetch,
    Verify,
    Unpack,
    /// Zero-based index into `install_steps`
    Build(usize),
    Link,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Setup => write!(f, "setup"),
            Stage::Fetch => write!(f, "fetch"),
            Stage::Verify => write!(f, "verify"),
            Stage::Unpack => write!(f, "unpack"),
            Stage::Build(idx) => write!(f, "build step {}", idx + 1),
            Stage::Link => write!(f, "link"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Named dependency failed, so this package was never attempted
    DependencyFailed(String),
    /// Run was interrupted before this package started
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DependencyFailed(dep) => write!(f, "dependency {} failed", dep),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal state of one plan entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Success {
        keg: PathBuf,
        linked: usize,
        duration: Duration,
    },
    Failed {
        stage: Stage,
        error: InstallError,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, InstallOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, InstallOutcome::Skipped { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            InstallOutcome::Success { .. } => "success",
            InstallOutcome::Failed { .. } => "failed",
            InstallOutcome::Skipped { .. } => "skipped",
        }
    }

    fn failed(stage: Stage, error: InstallError) -> Self {
        InstallOutcome::Failed { stage, error }
    }
}

pub type InstallResults = BTreeMap<String, InstallOutcome>;

/// Progress notifications, delivered in the order outcomes become known
#[derive(Debug)]
pub enum ExecutorEvent<'a> {
    Started { name: &'a str },
    Finished {
        name: &'a str,
        outcome: &'a InstallOutcome,
    },
}

pub type EventHandler = Arc<dyn Fn(&ExecutorEvent<'_>) + Send + Sync>;

/// External collaborators of a run
#[derive(Clone)]
pub struct InstallEnv {
    pub layout: Layout,
    pub fetcher: Arc<dyn Fetcher>,
    pub runner: Arc<dyn CommandRunner>,
}

impl InstallEnv {
    pub fn new(layout: Layout, fetcher: Arc<dyn Fetcher>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            layout,
            fetcher,
            runner,
        }
    }

    /// Real network fetcher and real child processes
    pub fn system(layout: Layout) -> anyhow::Result<Self> {
        Ok(Self::new(
            layout,
            Arc::new(HttpFetcher::new()?),
            Arc::new(SystemRunner),
        ))
    }
}

#[derive(Clone)]
pub struct ExecuteOptions {
    /// Upper bound for every external command
    pub timeout: Duration,
    /// Maximum packages installing at once
    pub jobs: usize,
    pub cancel: CancelToken,
    pub on_event: Option<EventHandler>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            jobs: 1,
            cancel: CancelToken::new(),
            on_event: None,
        }
    }
}

/// Values substituted for `{keg}`, `{prefix}`, `{build}`, `{name}`,
/// `{version}` and `{resources}` inside step arguments.
///
/// Substitution happens within each argument; nothing is split, globbed or
/// handed to a shell. Unknown placeholders are left as written.
#[derive(Debug, Clone)]
pub struct StepContext {
    vars: BTreeMap<&'static str, String>,
    cwd: PathBuf,
}

impl StepContext {
    pub fn new(layout: &Layout, package: &Package, build: &Path, cwd: &Path) -> Self {
        let keg = layout.keg_path(&package.name, package.version.as_str());
        let vars = BTreeMap::from([
            ("keg", keg.display().to_string()),
            ("prefix", layout.prefix.display().to_string()),
            ("build", build.display().to_string()),
            ("name", package.name.clone()),
            ("version", package.version.to_string()),
            ("resources", layout.resources_dir().display().to_string()),
        ]);
        Self {
            vars,
            cwd: cwd.to_path_buf(),
        }
    }

    pub fn expand(&self, arg: &str) -> String {
        let mut out = String::with_capacity(arg.len());
        let mut rest = arg;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    match self.vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Expanded command for `step`, with `SCOBY_*` variables set
    pub fn command(&self, step: &Step) -> CommandSpec {
        let mut env: BTreeMap<String, String> = self
            .vars
            .iter()
            .filter(|(key, _)| matches!(**key, "prefix" | "keg" | "build" | "resources"))
            .map(|(key, value)| (format!("SCOBY_{}", key.to_uppercase()), value.clone()))
            .collect();
        for (key, value) in &step.env {
            env.insert(key.clone(), self.expand(value));
        }

        CommandSpec {
            argv: step.argv.iter().map(|a| self.expand(a)).collect(),
            cwd: Some(self.cwd.clone()),
            env,
        }
    }
}

/// Translate a runner result into a step failure, if any
pub(crate) fn check_run(
    spec: &CommandSpec,
    result: Result<crate::runner::CommandOutput, RunError>,
) -> Result<crate::runner::CommandOutput, InstallError> {
    match result {
        Ok(output) if output.success() => Ok(output),
        Ok(output) => Err(InstallError::StepFailed {
            argv: spec.argv.clone(),
            status: output.status,
            stderr_tail: output.stderr_tail(),
        }),
        Err(RunError::Spawn { program, source }) => Err(InstallError::Spawn {
            program,
            message: source.to_string(),
        }),
        Err(RunError::TimedOut { after }) => Err(InstallError::Timeout {
            argv: spec.argv.clone(),
            after,
        }),
    }
}

pub struct Executor {
    env: Arc<InstallEnv>,
    options: ExecuteOptions,
}

impl Executor {
    pub fn new(env: InstallEnv, options: ExecuteOptions) -> Self {
        Self {
            env: Arc::new(env),
            options,
        }
    }

    fn emit(&self, event: ExecutorEvent<'_>) {
        if let Some(handler) = &self.options.on_event {
            handler(&event);
        }
    }

    fn record(&self, results: &mut InstallResults, name: &str, outcome: InstallOutcome) {
        self.emit(ExecutorEvent::Finished {
            name,
            outcome: &outcome,
        });
        results.insert(name.to_string(), outcome);
    }

    /// Run the plan to completion. Every plan entry ends in a terminal state.
    pub async fn execute(&self, graph: &DependencyGraph, plan: &InstallPlan) -> InstallResults {
        let mut results = InstallResults::new();
        let jobs = self.options.jobs.max(1);

        if let Err(e) = self.env.layout.ensure() {
            tracing::error!("Cannot prepare {}: {}", self.env.layout.prefix.display(), e);
            for name in &plan.order {
                let outcome = InstallOutcome::failed(
                    Stage::Setup,
                    InstallError::Link(format!("cannot prepare prefix: {}", e)),
                );
                self.record(&mut results, name, outcome);
            }
            return results;
        }

        let mut running: JoinSet<InstallOutcome> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut started: HashSet<String> = HashSet::new();

        loop {
            if self.options.cancel.is_cancelled() {
                for name in &plan.order {
                    if !results.contains_key(name) && !started.contains(name) {
                        let outcome = InstallOutcome::Skipped {
                            reason: SkipReason::Cancelled,
                        };
                        self.record(&mut results, name, outcome);
                    }
                }
            } else {
                for name in &plan.order {
                    if running.len() >= jobs {
                        break;
                    }
                    if results.contains_key(name) || started.contains(name) {
                        continue;
                    }

                    let deps = graph.dependencies_of(name);
                    if deps.iter().any(|dep| !results.contains_key(*dep)) {
                        continue;
                    }
                    if let Some(dep) = deps.iter().find(|dep| !results[**dep].is_success()) {
                        let outcome = InstallOutcome::Skipped {
                            reason: SkipReason::DependencyFailed(root_failure(&results, dep)),
                        };
                        self.record(&mut results, name, outcome);
                        continue;
                    }

                    let Some(node) = graph.get(name).cloned() else {
                        continue;
                    };

                    self.emit(ExecutorEvent::Started { name });
                    started.insert(name.clone());

                    let env = Arc::clone(&self.env);
                    let timeout = self.options.timeout;
                    let on_request = plan.is_target(name);
                    let handle = running.spawn(install_node(env, node, timeout, on_request));
                    in_flight.insert(handle.id(), name.clone());
                }
            }

            let Some(joined) = running.join_next_with_id().await else {
                break;
            };

            let (name, outcome) = match joined {
                Ok((id, outcome)) => (in_flight.remove(&id), outcome),
                Err(e) => (
                    in_flight.remove(&e.id()),
                    InstallOutcome::failed(
                        Stage::Setup,
                        InstallError::Spawn {
                            program: "install task".to_string(),
                            message: e.to_string(),
                        },
                    ),
                ),
            };
            let Some(name) = name else {
                continue;
            };

            let failed = !outcome.is_success();
            self.record(&mut results, &name, outcome);

            if failed {
                let dependents = graph.dependents_closure(&name, &plan.order);
                if !dependents.is_empty() {
                    tracing::info!(
                        "Skipping {} dependents of {}",
                        dependents.len(),
                        name
                    );
                }
                for dependent in plan.order.iter().filter(|n| dependents.contains(*n)) {
                    if results.contains_key(dependent) || started.contains(dependent) {
                        continue;
                    }
                    let outcome = InstallOutcome::Skipped {
                        reason: SkipReason::DependencyFailed(name.clone()),
                    };
                    self.record(&mut results, dependent, outcome);
                }
            }
        }

        results
    }
}

/// The failed package behind a skipped dependency chain
fn root_failure(results: &InstallResults, dep: &str) -> String {
    match results.get(dep) {
        Some(InstallOutcome::Skipped {
            reason: SkipReason::DependencyFailed(root),
        }) => root.clone(),
        _ => dep.to_string(),
    }
}

async fn install_node(
    env: Arc<InstallEnv>,
    node: Node,
    timeout: Duration,
    on_request: bool,
) -> InstallOutcome {
    let start = Instant::now();
    let name = node.name().to_string();

    tracing::debug!("Fetching {} from {}", name, node.url());
    let request = FetchRequest {
        name: name.clone(),
        url: node.url().to_string(),
        sha256: node.sha256().to_string(),
        dest_dir: env.layout.downloads_dir(),
    };
    let artifact = match env.fetcher.fetch(&request).await {
        Ok(path) => path,
        Err(e) => return InstallOutcome::failed(Stage::Fetch, InstallError::Fetch(format!("{:#}", e))),
    };

    // Checksum gate: nothing past this point runs on an unverified artifact
    match fetch::sha256_file(&artifact).await {
        Ok(actual) if actual == node.sha256() => {}
        Ok(actual) => {
            tracing::warn!("Checksum mismatch for {}", name);
            let _ = tokio::fs::remove_file(&artifact).await;
            return InstallOutcome::failed(
                Stage::Verify,
                InstallError::ChecksumMismatch {
                    expected: node.sha256().to_string(),
                    actual,
                },
            );
        }
        Err(e) => {
            return InstallOutcome::failed(
                Stage::Verify,
                InstallError::Fetch(format!("cannot read artifact: {:#}", e)),
            );
        }
    }

    let outcome = match node {
        Node::Resource(resource) => install_resource(&env, &resource, &artifact).await,
        Node::Package(package) => {
            install_package(&env, &package, &artifact, timeout, on_request).await
        }
    };

    match outcome {
        Ok((keg, linked)) => {
            tracing::info!("Installed {} in {:?}", name, start.elapsed());
            InstallOutcome::Success {
                keg,
                linked,
                duration: start.elapsed(),
            }
        }
        Err((stage, error)) => {
            tracing::info!("Failed to install {} at {}: {}", name, stage, error);
            InstallOutcome::Failed { stage, error }
        }
    }
}

type StageResult<T> = Result<T, (Stage, InstallError)>;

async fn install_resource(
    env: &InstallEnv,
    resource: &Resource,
    artifact: &Path,
) -> StageResult<(PathBuf, usize)> {
    let dir = env.layout.resource_path(&resource.name);
    let target = dir.join(fetch::artifact_file_name(&resource.name, &resource.url));

    let copy = async {
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::copy(artifact, &target).await?;
        Ok::<_, std::io::Error>(())
    };

    if let Err(e) = copy.await {
        let _ = tokio::fs::remove_dir_all(&dir).await;
        return Err((Stage::Link, InstallError::Link(e.to_string())));
    }

    Ok((dir, 0))
}

async fn install_package(
    env: &InstallEnv,
    package: &Package,
    artifact: &Path,
    timeout: Duration,
    on_request: bool,
) -> StageResult<(PathBuf, usize)> {
    let layout = &env.layout;
    let version = package.version.as_str();
    let keg = layout.keg_path(&package.name, version);
    let build_dir = layout.build_path(&package.name, version);

    let result = build_and_link(env, package, artifact, &keg, &build_dir, timeout, on_request).await;

    match &result {
        Ok(_) => {
            let _ = tokio::fs::remove_dir_all(&build_dir).await;
        }
        Err(_) => rollback(layout, &keg, &build_dir).await,
    }

    result
}

async fn build_and_link(
    env: &InstallEnv,
    package: &Package,
    artifact: &Path,
    keg: &Path,
    build_dir: &Path,
    timeout: Duration,
    on_request: bool,
) -> StageResult<(PathBuf, usize)> {
    let prefix = env.layout.prefix.clone();

    // Start from a clean keg; a previous install of the same version is replaced
    {
        let prefix = prefix.clone();
        let keg = keg.to_path_buf();
        blocking(move || {
            if keg.exists() {
                link::unlink_keg(&prefix, &keg)?;
                std::fs::remove_dir_all(&keg)?;
            }
            std::fs::create_dir_all(&keg)?;
            Ok(())
        })
        .await
        .map_err(|e| (Stage::Setup, InstallError::Link(e)))?;
    }

    tracing::debug!("Unpacking {} into {}", artifact.display(), build_dir.display());
    let source_root = {
        let artifact = artifact.to_path_buf();
        let build_dir = build_dir.to_path_buf();
        blocking(move || extract::unpack_source(&artifact, &build_dir))
            .await
            .map_err(|e| (Stage::Unpack, InstallError::Unpack(e)))?
    };

    let ctx = StepContext::new(&env.layout, package, &source_root, &source_root);
    for (idx, step) in package.install_steps.iter().enumerate() {
        let spec = ctx.command(step);
        tracing::debug!("{} step {}: {:?}", package.name, idx + 1, spec.argv);
        let result = env.runner.run(&spec, timeout).await;
        check_run(&spec, result).map_err(|e| (Stage::Build(idx), e))?;
    }

    let linked = {
        let prefix = prefix.clone();
        let keg = keg.to_path_buf();
        let version = package.version.clone();
        blocking(move || {
            unlink_older_kegs(&prefix, &keg, &version)?;
            link::link_keg(&prefix, &keg)
        })
        .await
        .map_err(|e| (Stage::Link, InstallError::Link(e)))?
    };

    InstallReceipt::new(package, on_request)
        .write(keg)
        .map_err(|e| (Stage::Link, InstallError::Link(format!("{:#}", e))))?;

    Ok((keg.to_path_buf(), linked.len()))
}

/// Remove everything a failed install left behind: links, keg, build tree
async fn rollback(layout: &Layout, keg: &Path, build_dir: &Path) {
    let prefix = layout.prefix.clone();
    let keg = keg.to_path_buf();
    let build_dir = build_dir.to_path_buf();

    let result = blocking(move || {
        if keg.exists() {
            link::unlink_keg(&prefix, &keg)?;
            std::fs::remove_dir_all(&keg)?;
        }
        // Drop the now-empty Cellar/<name>
        if let Some(parent) = keg.parent() {
            let _ = std::fs::remove_dir(parent);
        }
        if build_dir.exists() {
            std::fs::remove_dir_all(&build_dir)?;
        }
        Ok(())
    })
    .await;

    if let Err(e) = result {
        tracing::warn!("Rollback incomplete: {}", e);
    }
}

/// Unlink kegs of the same formula with a lower version so the new keg's
/// links take their place. The old kegs stay in the Cellar.
fn unlink_older_kegs(prefix: &Path, keg: &Path, version: &Version) -> anyhow::Result<()> {
    let Some(formula_dir) = keg.parent() else {
        return Ok(());
    };

    for entry in std::fs::read_dir(formula_dir)? {
        let path = entry?.path();
        if path == keg || !path.is_dir() {
            continue;
        }
        let Some(installed) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<Version>().ok())
        else {
            continue;
        };

        if installed < *version {
            let removed = link::unlink_keg(prefix, &path)?;
            tracing::info!(
                "Unlinked {} ({} links) in favour of {}",
                path.display(),
                removed.len(),
                version
            );
        } else if installed > *version {
            tracing::warn!(
                "A newer version {} is already installed at {}",
                installed,
                path.display()
            );
        }
    }

    Ok(())
}

/// Run filesystem work off the async workers, flattening errors to strings
async fn blocking<T, F>(f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{self, ManifestSource};

    fn package() -> Package {
        let json = r#"{
            "name": "dotcat", "version": "0.9.6", "url": "u",
            "sha256": "24a9fcb3286fb9267443ceb3416dd4e64956641662a1154bdb78d23ec030e5b3"
        }"#;
        manifest::load(&[ManifestSource::new("t.json", json)])
            .unwrap()
            .package("dotcat")
            .unwrap()
            .clone()
    }

    fn context() -> StepContext {
        let layout = Layout::new("/opt/scoby", "/cache");
        StepContext::new(&layout, &package(), Path::new("/cache/build/x"), Path::new("/cache/build/x"))
    }

    #[test]
    fn test_expand_placeholders() {
        let ctx = context();
        assert_eq!(
            ctx.expand("{keg}/bin/dotcat"),
            "/opt/scoby/Cellar/dotcat/0.9.6/bin/dotcat"
        );
        assert_eq!(ctx.expand("--prefix={prefix}"), "--prefix=/opt/scoby");
        assert_eq!(ctx.expand("{name}-{version}"), "dotcat-0.9.6");
        assert_eq!(ctx.expand("{unknown} {"), "{unknown} {");
        assert_eq!(ctx.expand("no placeholders"), "no placeholders");
    }

    #[test]
    fn test_command_is_argv_only() {
        let ctx = context();
        let mut step = Step::new(["pip", "install", "--prefix", "{keg}", "$(rm -rf /)"]);
        step.env.insert("PIP_TARGET".into(), "{keg}/libexec".into());

        let spec = ctx.command(&step);
        assert_eq!(
            spec.argv,
            vec![
                "pip",
                "install",
                "--prefix",
                "/opt/scoby/Cellar/dotcat/0.9.6",
                "$(rm -rf /)"
            ]
        );
        assert_eq!(spec.cwd, Some(PathBuf::from("/cache/build/x")));
        assert_eq!(
            spec.env.get("SCOBY_KEG").map(String::as_str),
            Some("/opt/scoby/Cellar/dotcat/0.9.6")
        );
        assert_eq!(
            spec.env.get("PIP_TARGET").map(String::as_str),
            Some("/opt/scoby/Cellar/dotcat/0.9.6/libexec")
        );
        assert!(spec.env.contains_key("SCOBY_RESOURCES"));
        assert!(!spec.env.contains_key("SCOBY_NAME"));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Build(0).to_string(), "build step 1");
        assert_eq!(Stage::Verify.to_string(), "verify");
    }

    #[test]
    fn test_root_failure_follows_skip_chain() {
        let mut results = InstallResults::new();
        results.insert(
            "b".into(),
            InstallOutcome::Failed {
                stage: Stage::Build(0),
                error: InstallError::Fetch("x".into()),
            },
        );
        results.insert(
            "d".into(),
            InstallOutcome::Skipped {
                reason: SkipReason::DependencyFailed("b".into()),
            },
        );
        assert_eq!(root_failure(&results, "d"), "b");
        assert_eq!(root_failure(&results, "b"), "b");
    }
}
