//! Formula manifests and the dependency graph built from them.
//!
//! A formula is a JSON record describing one installable package: where its
//! source lives, the checksum it must match, what it depends on, and the
//! commands that build and smoke-test it. Formulae may declare pinned
//! [`Resource`]s inline; these become graph nodes of their own that the
//! declaring formula implicitly depends on.
//!
//! # Format
//!
//! ```json
//! {
//!   "name": "dotcat",
//!   "version": "0.9.6",
//!   "url": "https://files.pythonhosted.org/packages/source/d/dotcat/dotcat-0.9.6.tar.gz",
//!   "sha256": "24a9fcb3286fb9267443ceb3416dd4e64956641662a1154bdb78d23ec030e5b3",
//!   "depends_on": ["python@3.11"],
//!   "install_steps": [["pip", "install", "--prefix", "{keg}", "."]],
//!   "test_steps": [{"run": ["{keg}/bin/dotcat", "--version"], "expect_output": "dotcat v0.9.6"}]
//! }
//! ```
//!
//! A source may hold one formula object or an array of them. Unknown fields
//! are ignored; missing required fields fail the whole load.
//!
//! # Examples
//!
//! ```no_run
//! use scoby::manifest::{self, ManifestSource};
//!
//! fn main() -> anyhow::Result<()> {
//!     let source = ManifestSource::new("dotcat.json", std::fs::read_to_string("dotcat.json")?);
//!     let graph = manifest::load(&[source])?;
//!     println!("{} nodes loaded", graph.len());
//!     Ok(())
//! }
//! ```

use crate::error::LoadError;
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Raw manifest text plus a label used in error messages
#[derive(Debug, Clone)]
pub struct ManifestSource {
    pub origin: String,
    pub contents: String,
}

impl ManifestSource {
    pub fn new(origin: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            contents: contents.into(),
        }
    }
}

/// Validated package version.
///
/// Accepts the shapes seen in formulae (`0.9.6`, `2024.6.2`, `1.0_beta`,
/// `6.0.1+local`): starts with a digit, then ASCII alphanumerics and
/// `.`, `_`, `-`, `+`, and does not end with a separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let is_sep = |c: char| matches!(c, '.' | '_' | '-' | '+');

        if !s.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(format!("invalid version '{}': must start with a digit", s));
        }
        if let Some(bad) = s.chars().find(|c| !c.is_ascii_alphanumeric() && !is_sep(*c)) {
            return Err(format!("invalid version '{}': unexpected character '{}'", s, bad));
        }
        if s.ends_with(is_sep) {
            return Err(format!("invalid version '{}': trailing separator", s));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let a_parts: Vec<u64> = self.0.split('.').filter_map(|s| s.parse().ok()).collect();
        let b_parts: Vec<u64> = other.0.split('.').filter_map(|s| s.parse().ok()).collect();

        for i in 0..a_parts.len().max(b_parts.len()) {
            let a_part = a_parts.get(i).unwrap_or(&0);
            let b_part = b_parts.get(i).unwrap_or(&0);
            match a_part.cmp(b_part) {
                Ordering::Equal => continue,
                other => return other,
            }
        }

        // Fall back to lexicographic
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One external command: program plus arguments, never passed through a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Step {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }
}

/// Post-install smoke test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestStep {
    /// Run a command; passes on exit 0 and, if set, when the output contains `expect_output`
    Command {
        step: Step,
        expect_output: Option<String>,
    },
    /// Passes when the keg-relative path exists
    Exists { path: PathBuf },
}

/// An installable formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: Version,
    pub url: String,
    pub sha256: String,
    pub depends_on: BTreeSet<String>,
    pub resources: Vec<String>,
    pub install_steps: Vec<Step>,
    pub test_steps: Vec<TestStep>,
    pub desc: Option<String>,
    pub homepage: Option<String>,
    pub license: Option<String>,
}

impl Package {
    /// Declared dependencies plus declared resources, ascending by name
    pub fn requirements(&self) -> BTreeSet<&str> {
        self.depends_on
            .iter()
            .chain(self.resources.iter())
            .map(String::as_str)
            .collect()
    }
}

/// A pinned artifact with no dependencies or build steps of its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub url: String,
    pub sha256: String,
    pub version: Option<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Package(Package),
    Resource(Resource),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Package(p) => &p.name,
            Node::Resource(r) => &r.name,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Node::Package(p) => &p.url,
            Node::Resource(r) => &r.url,
        }
    }

    pub fn sha256(&self) -> &str {
        match self {
            Node::Package(p) => &p.sha256,
            Node::Resource(r) => &r.sha256,
        }
    }

    /// Version used for directory naming; resources without one use a checksum prefix
    pub fn version_label(&self) -> String {
        match self {
            Node::Package(p) => p.version.to_string(),
            Node::Resource(r) => match &r.version {
                Some(v) => v.to_string(),
                None => r.sha256[..12].to_string(),
            },
        }
    }

    pub fn requirements(&self) -> BTreeSet<&str> {
        match self {
            Node::Package(p) => p.requirements(),
            Node::Resource(_) => BTreeSet::new(),
        }
    }

    pub fn as_package(&self) -> Option<&Package> {
        match self {
            Node::Package(p) => Some(p),
            Node::Resource(_) => None,
        }
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Node::Resource(_))
    }
}

/// Packages and resources keyed by name.
///
/// Built once by [`load`] and read-only afterwards. Edges are not checked
/// here; the resolver reports unknown names.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, Node>,
}

impl DependencyGraph {
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.get(name).and_then(Node::as_package)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node names, ascending
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Direct requirements of `name`, ascending. Empty for unknown names.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|n| n.requirements().into_iter().collect())
            .unwrap_or_default()
    }

    /// Every name in `among` that depends on `name`, directly or transitively
    pub fn dependents_closure(&self, name: &str, among: &[String]) -> BTreeSet<String> {
        let mut affected: BTreeSet<String> = BTreeSet::new();
        let mut frontier = vec![name.to_string()];

        while let Some(current) = frontier.pop() {
            for candidate in among {
                if affected.contains(candidate) || candidate == name {
                    continue;
                }
                if self
                    .dependencies_of(candidate)
                    .contains(&current.as_str())
                {
                    affected.insert(candidate.clone());
                    frontier.push(candidate.clone());
                }
            }
        }

        affected
    }

    /// Insert without duplicate checks. Returns the previous node, if any.
    pub(crate) fn insert(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.name().to_string(), node)
    }
}

// Wire shapes. Converted into the typed model above by `Loader`.

#[derive(Deserialize)]
struct RawFormula {
    name: String,
    version: String,
    url: String,
    sha256: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    install_steps: Vec<RawStep>,
    #[serde(default)]
    test_steps: Vec<RawTestStep>,
    #[serde(default)]
    resources: Vec<RawResource>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    license: Option<String>,
}

#[derive(Deserialize)]
struct RawResource {
    name: String,
    url: String,
    sha256: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStep {
    Argv(Vec<String>),
    Detailed {
        run: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTestStep {
    Argv(Vec<String>),
    Exists {
        exists: PathBuf,
    },
    Detailed {
        run: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        expect_output: Option<String>,
    },
}

/// Parse every source into one graph.
///
/// Fails with [`LoadError::Parse`] on malformed records and with
/// [`LoadError::DuplicatePackage`] when the same name appears with two
/// different checksums. Identical re-declarations are accepted once.
pub fn load(sources: &[ManifestSource]) -> Result<DependencyGraph, LoadError> {
    let mut loader = Loader::default();
    for source in sources {
        loader.add_source(source)?;
    }
    Ok(loader.graph)
}

/// Read manifest files and directories, then [`load`] them.
///
/// Directories contribute every `*.json` file they contain, in file-name order.
pub fn load_paths(paths: &[PathBuf]) -> Result<DependencyGraph, LoadError> {
    let mut sources = Vec::new();

    for path in paths {
        if path.is_dir() {
            let entries = fs::read_dir(path).map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })?;

            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("json"))
                .collect();
            files.sort();

            for file in files {
                sources.push(read_source(&file)?);
            }
        } else {
            sources.push(read_source(path)?);
        }
    }

    tracing::debug!("Loaded {} manifest sources", sources.len());
    load(&sources)
}

fn read_source(path: &Path) -> Result<ManifestSource, LoadError> {
    let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ManifestSource::new(path.display().to_string(), contents))
}

#[derive(Default)]
struct Loader {
    graph: DependencyGraph,
    origins: BTreeMap<String, String>,
}

impl Loader {
    fn add_source(&mut self, source: &ManifestSource) -> Result<(), LoadError> {
        let value: Value = serde_json::from_str(&source.contents)
            .map_err(|e| parse_error(&source.origin, e.to_string()))?;

        match value {
            Value::Array(items) => {
                for (idx, item) in items.into_iter().enumerate() {
                    let origin = format!("{}[{}]", source.origin, idx);
                    self.add_formula(&origin, item)?;
                }
            }
            item @ Value::Object(_) => self.add_formula(&source.origin, item)?,
            _ => {
                return Err(parse_error(
                    &source.origin,
                    "expected a formula object or an array of formulae",
                ));
            }
        }

        Ok(())
    }

    fn add_formula(&mut self, origin: &str, value: Value) -> Result<(), LoadError> {
        let label = match value.get("name").and_then(Value::as_str) {
            Some(name) => format!("{} ({})", origin, name),
            None => origin.to_string(),
        };

        let raw: RawFormula =
            serde_json::from_value(value).map_err(|e| parse_error(&label, e.to_string()))?;

        let (package, resources) = convert_formula(raw).map_err(|msg| parse_error(&label, msg))?;

        for resource in resources {
            self.register(origin, Node::Resource(resource))?;
        }
        self.register(origin, Node::Package(package))
    }

    fn register(&mut self, origin: &str, node: Node) -> Result<(), LoadError> {
        let name = node.name().to_string();

        if let Some(existing) = self.graph.get(&name) {
            let first = self.origins.get(&name).cloned().unwrap_or_default();
            if existing.sha256() != node.sha256() {
                return Err(LoadError::DuplicatePackage {
                    name,
                    first,
                    second: origin.to_string(),
                });
            }

            // A formula supersedes a resource pinning the same artifact
            if existing.is_resource() && !node.is_resource() {
                self.graph.insert(node);
                self.origins.insert(name, origin.to_string());
            } else {
                tracing::warn!(
                    "Ignoring duplicate declaration of '{}' in {} (first seen in {})",
                    name,
                    origin,
                    first
                );
            }
            return Ok(());
        }

        self.graph.insert(node);
        self.origins.insert(name, origin.to_string());
        Ok(())
    }
}

fn parse_error(origin: &str, message: impl Into<String>) -> LoadError {
    LoadError::Parse {
        origin: origin.to_string(),
        message: message.into(),
    }
}

fn convert_formula(raw: RawFormula) -> Result<(Package, Vec<Resource>), String> {
    validate_name(&raw.name)?;
    let version: Version = raw.version.parse()?;
    let sha256 = validate_sha256(&raw.sha256)?;
    validate_url(&raw.url)?;

    let mut depends_on = BTreeSet::new();
    for dep in raw.depends_on {
        validate_name(&dep)?;
        depends_on.insert(dep);
    }

    let install_steps = raw
        .install_steps
        .into_iter()
        .map(convert_step)
        .collect::<Result<Vec<_>, _>>()?;

    let test_steps = raw
        .test_steps
        .into_iter()
        .map(convert_test_step)
        .collect::<Result<Vec<_>, _>>()?;

    let mut resources = Vec::with_capacity(raw.resources.len());
    for r in raw.resources {
        validate_name(&r.name)?;
        if r.name == raw.name {
            return Err(format!("resource '{}' shadows its own formula", r.name));
        }
        validate_url(&r.url)?;
        let version = r.version.as_deref().map(str::parse).transpose()?;
        resources.push(Resource {
            sha256: validate_sha256(&r.sha256)?,
            name: r.name,
            url: r.url,
            version,
        });
    }

    let package = Package {
        name: raw.name,
        version,
        url: raw.url,
        sha256,
        depends_on,
        resources: resources.iter().map(|r| r.name.clone()).collect(),
        install_steps,
        test_steps,
        desc: raw.desc,
        homepage: raw.homepage,
        license: raw.license,
    };

    Ok((package, resources))
}

fn convert_step(raw: RawStep) -> Result<Step, String> {
    let (argv, env) = match raw {
        RawStep::Argv(argv) => (argv, BTreeMap::new()),
        RawStep::Detailed { run, env } => (run, env),
    };
    validate_argv(&argv)?;
    Ok(Step { argv, env })
}

fn convert_test_step(raw: RawTestStep) -> Result<TestStep, String> {
    match raw {
        RawTestStep::Argv(argv) => Ok(TestStep::Command {
            step: convert_step(RawStep::Argv(argv))?,
            expect_output: None,
        }),
        RawTestStep::Exists { exists } => {
            if exists.is_absolute()
                || exists
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(format!(
                    "test path '{}' must stay inside the keg",
                    exists.display()
                ));
            }
            Ok(TestStep::Exists { path: exists })
        }
        RawTestStep::Detailed {
            run,
            env,
            expect_output,
        } => Ok(TestStep::Command {
            step: convert_step(RawStep::Detailed { run, env })?,
            expect_output,
        }),
    }
}

/// Names become directory names, so reject anything that could escape the prefix
fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty package name".to_string());
    }
    if name == "." || name == ".." || name.starts_with('.') {
        return Err(format!("invalid package name '{}'", name));
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '\\')
    {
        return Err(format!("invalid package name '{}'", name));
    }
    Ok(())
}

fn validate_sha256(sha: &str) -> Result<String, String> {
    if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid sha256 '{}': expected 64 hex digits", sha));
    }
    Ok(sha.to_ascii_lowercase())
}

fn validate_url(url: &str) -> Result<(), String> {
    if url.trim().is_empty() {
        return Err("empty url".to_string());
    }
    Ok(())
}

fn validate_argv(argv: &[String]) -> Result<(), String> {
    match argv.first() {
        None => Err("step has no command".to_string()),
        Some(program) if program.is_empty() => Err("step has an empty program".to_string()),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA_A: &str = "cf919f22444430b7e838239e9058b5a6c308466573856eca18f44cd07e4f9f34";
    const SHA_B: &str = "24a9fcb3286fb9267443ceb3416dd4e64956641662a1154bdb78d23ec030e5b3";

    fn source(json: &str) -> ManifestSource {
        ManifestSource::new("test.json", json)
    }

    #[test]
    fn test_load_single_formula() {
        let json = format!(
            r#"{{
                "name": "dotcat",
                "version": "0.8.7",
                "url": "https://example.com/dotcat-0.8.7.tar.gz",
                "sha256": "{SHA_A}",
                "depends_on": ["python@3.9", "poetry"],
                "install_steps": [["poetry", "install", "--no-dev"]],
                "test_steps": [{{"run": ["dotcat", "--help"], "expect_output": "Usage: dotcat"}}],
                "desc": "Cat structured data, in style",
                "bottle": {{"ignored": true}}
            }}"#
        );

        let graph = load(&[source(&json)]).unwrap();
        let pkg = graph.package("dotcat").unwrap();

        assert_eq!(pkg.version.as_str(), "0.8.7");
        assert_eq!(
            pkg.depends_on.iter().collect::<Vec<_>>(),
            vec!["poetry", "python@3.9"]
        );
        assert_eq!(pkg.install_steps[0].argv, vec!["poetry", "install", "--no-dev"]);
        assert_eq!(
            pkg.test_steps[0],
            TestStep::Command {
                step: Step::new(["dotcat", "--help"]),
                expect_output: Some("Usage: dotcat".to_string()),
            }
        );
        assert_eq!(pkg.desc.as_deref(), Some("Cat structured data, in style"));
    }

    #[test]
    fn test_load_array_with_resources() {
        let json = format!(
            r#"[{{
                "name": "dotcat",
                "version": "0.8.2",
                "url": "https://example.com/dotcat.tar.gz",
                "sha256": "{SHA_A}",
                "resources": [
                    {{"name": "certifi", "url": "https://example.com/certifi.tar.gz", "sha256": "{SHA_B}"}}
                ],
                "test_steps": [{{"exists": "bin/dotcat"}}]
            }}]"#
        );

        let graph = load(&[source(&json)]).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.get("certifi").unwrap().is_resource());
        assert_eq!(graph.dependencies_of("dotcat"), vec!["certifi"]);
        assert_eq!(
            graph.package("dotcat").unwrap().test_steps[0],
            TestStep::Exists {
                path: PathBuf::from("bin/dotcat")
            }
        );
    }

    #[test]
    fn test_missing_required_field() {
        let json = r#"{"name": "dotcat", "version": "1.0"}"#;
        let err = load(&[source(json)]).unwrap_err();
        match err {
            LoadError::Parse { origin, message } => {
                assert_eq!(origin, "test.json (dotcat)");
                assert!(message.contains("missing field"), "{}", message);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_version_rejected() {
        let json = format!(
            r#"{{"name": "a", "version": "latest", "url": "u", "sha256": "{SHA_A}"}}"#
        );
        assert!(matches!(
            load(&[source(&json)]),
            Err(LoadError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_checksum_rejected() {
        let json = r#"{"name": "a", "version": "1.0", "url": "u", "sha256": "abc"}"#;
        assert!(matches!(load(&[source(json)]), Err(LoadError::Parse { .. })));
    }

    #[test]
    fn test_path_like_names_rejected() {
        for name in ["../evil", "a/b", "", ".hidden", "has space"] {
            let json = format!(
                r#"{{"name": "{name}", "version": "1.0", "url": "u", "sha256": "{SHA_A}"}}"#
            );
            assert!(load(&[source(&json)]).is_err(), "accepted '{}'", name);
        }
    }

    #[test]
    fn test_empty_step_rejected() {
        let json = format!(
            r#"{{"name": "a", "version": "1.0", "url": "u", "sha256": "{SHA_A}", "install_steps": [[]]}}"#
        );
        assert!(matches!(load(&[source(&json)]), Err(LoadError::Parse { .. })));
    }

    #[test]
    fn test_duplicate_with_conflicting_checksum() {
        let first = format!(
            r#"{{"name": "dotcat", "version": "0.8.7", "url": "u", "sha256": "{SHA_A}"}}"#
        );
        let second = format!(
            r#"{{"name": "dotcat", "version": "0.9.6", "url": "u", "sha256": "{SHA_B}"}}"#
        );

        let err = load(&[
            ManifestSource::new("Formula/dotcat.json", first),
            ManifestSource::new("HomebrewFormula/dotcat.json", second),
        ])
        .unwrap_err();

        match err {
            LoadError::DuplicatePackage {
                name,
                first,
                second,
            } => {
                assert_eq!(name, "dotcat");
                assert_eq!(first, "Formula/dotcat.json");
                assert_eq!(second, "HomebrewFormula/dotcat.json");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_with_same_checksum_is_accepted() {
        let json = format!(
            r#"{{"name": "dotcat", "version": "0.8.7", "url": "u", "sha256": "{SHA_A}"}}"#
        );
        let graph = load(&[source(&json), source(&json)]).unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_resource_conflicting_with_package() {
        let json = format!(
            r#"[
                {{"name": "certifi", "version": "2024.6.2", "url": "u", "sha256": "{SHA_A}"}},
                {{"name": "requests", "version": "2.32.3", "url": "u", "sha256": "{SHA_A}",
                  "resources": [{{"name": "certifi", "url": "u", "sha256": "{SHA_B}"}}]}}
            ]"#
        );
        assert!(matches!(
            load(&[source(&json)]),
            Err(LoadError::DuplicatePackage { .. })
        ));
    }

    #[test]
    fn test_version_ordering() {
        let v = |s: &str| s.parse::<Version>().unwrap();
        assert!(v("0.9.6") > v("0.8.7"));
        assert!(v("3.10") > v("3.9"));
        assert!(v("2024.6.2") > v("2024.6"));
        assert_eq!(v("1.0").cmp(&v("1.0")), Ordering::Equal);
    }

    #[test]
    fn test_version_parsing() {
        for ok in ["0.9.6", "2024.6.2", "1.0_beta", "6.0.1+local", "3"] {
            assert!(ok.parse::<Version>().is_ok(), "{}", ok);
        }
        for bad in ["", "v1.0", "1.0.", "1 .0", "latest"] {
            assert!(bad.parse::<Version>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_self_dependency_is_left_for_resolve() {
        let json = format!(
            r#"{{"name": "a", "version": "1", "url": "u", "sha256": "{SHA_A}", "depends_on": ["a"]}}"#
        );
        let graph = load(&[source(&json)]).unwrap();
        assert_eq!(graph.dependencies_of("a"), vec!["a"]);
    }

    #[test]
    fn test_dependents_closure() {
        let json = format!(
            r#"[
                {{"name": "a", "version": "1", "url": "u", "sha256": "{SHA_A}"}},
                {{"name": "b", "version": "1", "url": "u", "sha256": "{SHA_A}", "depends_on": ["a"]}},
                {{"name": "c", "version": "1", "url": "u", "sha256": "{SHA_A}", "depends_on": ["a"]}},
                {{"name": "d", "version": "1", "url": "u", "sha256": "{SHA_A}", "depends_on": ["b", "c"]}}
            ]"#
        );
        let graph = load(&[source(&json)]).unwrap();
        let plan: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();

        let closure = graph.dependents_closure("b", &plan);
        assert_eq!(closure.into_iter().collect::<Vec<_>>(), vec!["d"]);

        let closure = graph.dependents_closure("a", &plan);
        assert_eq!(closure.len(), 3);
    }
}
