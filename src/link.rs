//! Symlink management for installed kegs.
//!
//! Files under a keg's linkable directories are exposed in the prefix through
//! relative symlinks, so the prefix can be moved as a whole:
//!
//! ```text
//! <prefix>/bin/dotcat -> ../Cellar/dotcat/0.9.6/bin/dotcat
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Directories to symlink from a keg into the prefix
const LINKABLE_DIRS: &[&str] = &["bin", "sbin", "lib", "include", "share", "etc"];

/// Lexically normalize a path: drop `.` and resolve `..` without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Relative path that leads from directory `from` to `to`
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from = normalize_path(from);
    let to = normalize_path(to);

    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();
    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from_parts.len() {
        rel.push("..");
    }
    for part in &to_parts[common..] {
        rel.push(part.as_os_str());
    }
    rel
}

/// Where an existing symlink points, resolved against its own directory
fn resolve_link(link: &Path) -> Option<PathBuf> {
    let target = fs::read_link(link).ok()?;
    let resolved = if target.is_relative() {
        link.parent()?.join(target)
    } else {
        target
    };
    Some(normalize_path(&resolved))
}

/// Link every file in the keg's linkable directories into `prefix`.
///
/// Existing files that belong to something else are left alone. Returns
/// the links created.
pub fn link_keg(prefix: &Path, keg: &Path) -> Result<Vec<PathBuf>> {
    let keg = normalize_path(keg);
    let mut linked = Vec::new();

    for dir_name in LINKABLE_DIRS {
        let source_dir = keg.join(dir_name);
        if !source_dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&source_dir).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }

            let rel = entry.path().strip_prefix(&keg)?;
            let target = prefix.join(rel);

            if target.symlink_metadata().is_ok() {
                if resolve_link(&target).is_some_and(|p| p == entry.path()) {
                    continue;
                }
                tracing::warn!(
                    "Not linking {}: {} already exists",
                    entry.path().display(),
                    target.display()
                );
                continue;
            }

            let parent = target
                .parent()
                .ok_or_else(|| anyhow::anyhow!("Invalid link target: {}", target.display()))?;
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

            let relative_source = relative_path(parent, entry.path());
            unix_fs::symlink(&relative_source, &target).with_context(|| {
                format!(
                    "Failed to create symlink: {} -> {}",
                    target.display(),
                    relative_source.display()
                )
            })?;
            linked.push(target);
        }
    }

    Ok(linked)
}

/// Remove every symlink in `prefix` that points into `keg`
pub fn unlink_keg(prefix: &Path, keg: &Path) -> Result<Vec<PathBuf>> {
    let keg = normalize_path(keg);
    let mut unlinked = Vec::new();

    for dir_name in LINKABLE_DIRS {
        let source_dir = keg.join(dir_name);
        if !source_dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&source_dir).min_depth(1) {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }

            let target = prefix.join(entry.path().strip_prefix(&keg)?);
            let is_symlink = target
                .symlink_metadata()
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);

            if is_symlink && resolve_link(&target).is_some_and(|p| p.starts_with(&keg)) {
                fs::remove_file(&target)
                    .with_context(|| format!("Failed to remove {}", target.display()))?;
                unlinked.push(target);
            }
        }
    }

    Ok(unlinked)
}
