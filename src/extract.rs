//! Source unpacking.
//!
//! Source distributions are usually `.tar.gz` files holding a single
//! top-level directory (`dotcat-0.9.6/`). [`unpack_source`] extracts them
//! into a fresh build directory and returns that inner directory as the
//! source root. Artifacts that are not tarballs (wheels, scripts, plain
//! files) are copied into the build directory unchanged.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    TarGz,
    Tar,
    Plain,
}

fn archive_kind(path: &Path) -> ArchiveKind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        ArchiveKind::TarGz
    } else if name.ends_with(".tar") {
        ArchiveKind::Tar
    } else {
        ArchiveKind::Plain
    }
}

/// Unpack `artifact` into `build_dir` and return the source root.
///
/// `build_dir` is emptied first so stale files from an earlier attempt
/// never leak into a build.
pub fn unpack_source(artifact: &Path, build_dir: &Path) -> Result<PathBuf> {
    if build_dir.exists() {
        fs::remove_dir_all(build_dir)
            .with_context(|| format!("Failed to clear {}", build_dir.display()))?;
    }
    fs::create_dir_all(build_dir)
        .with_context(|| format!("Failed to create {}", build_dir.display()))?;

    match archive_kind(artifact) {
        ArchiveKind::TarGz => {
            let file = open(artifact)?;
            unpack_tar(GzDecoder::new(file), build_dir)?;
        }
        ArchiveKind::Tar => {
            let file = open(artifact)?;
            unpack_tar(file, build_dir)?;
        }
        ArchiveKind::Plain => {
            let file_name = artifact
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Artifact has no file name"))?;
            fs::copy(artifact, build_dir.join(file_name))
                .with_context(|| format!("Failed to copy {}", artifact.display()))?;
            return Ok(build_dir.to_path_buf());
        }
    }

    source_root(build_dir)
}

fn open(artifact: &Path) -> Result<fs::File> {
    fs::File::open(artifact).with_context(|| format!("Failed to open {}", artifact.display()))
}

fn unpack_tar<R: Read>(reader: R, build_dir: &Path) -> Result<()> {
    // tar skips entries that would escape build_dir
    Archive::new(reader)
        .unpack(build_dir)
        .with_context(|| format!("Failed to extract archive to {}", build_dir.display()))
}

/// The single top-level directory if there is exactly one entry, else `build_dir`
fn source_root(build_dir: &Path) -> Result<PathBuf> {
    let entries: Vec<PathBuf> = fs::read_dir(build_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();

    match entries.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Ok(build_dir.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn write_tarball(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_unpack_strips_single_top_level_dir() {
        let temp = TempDir::new().unwrap();
        let tarball = temp.path().join("dotcat-0.9.6.tar.gz");
        write_tarball(
            &tarball,
            &[
                ("dotcat-0.9.6/pyproject.toml", "[project]"),
                ("dotcat-0.9.6/zsh/_dotcat", "#compdef dotcat"),
            ],
        );

        let build = temp.path().join("build");
        let root = unpack_source(&tarball, &build).unwrap();

        assert_eq!(root, build.join("dotcat-0.9.6"));
        assert!(root.join("pyproject.toml").exists());
        assert!(root.join("zsh/_dotcat").exists());
    }

    #[test]
    fn test_unpack_flat_archive_uses_build_dir() {
        let temp = TempDir::new().unwrap();
        let tarball = temp.path().join("flat.tgz");
        write_tarball(&tarball, &[("a.txt", "a"), ("b.txt", "b")]);

        let build = temp.path().join("build");
        let root = unpack_source(&tarball, &build).unwrap();
        assert_eq!(root, build);
        assert!(build.join("a.txt").exists());
    }

    #[test]
    fn test_plain_artifact_is_copied() {
        let temp = TempDir::new().unwrap();
        let wheel = temp.path().join("certifi-2024.6.2-py3-none-any.whl");
        fs::write(&wheel, "zip bytes").unwrap();

        let build = temp.path().join("build");
        let root = unpack_source(&wheel, &build).unwrap();
        assert_eq!(root, build);
        assert_eq!(
            fs::read_to_string(build.join("certifi-2024.6.2-py3-none-any.whl")).unwrap(),
            "zip bytes"
        );
    }

    #[test]
    fn test_stale_build_dir_is_cleared() {
        let temp = TempDir::new().unwrap();
        let build = temp.path().join("build");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("stale"), "old").unwrap();

        let tarball = temp.path().join("pkg.tar.gz");
        write_tarball(&tarball, &[("pkg/setup.py", "")]);

        unpack_source(&tarball, &build).unwrap();
        assert!(!build.join("stale").exists());
    }

    #[test]
    fn test_corrupt_archive_fails() {
        let temp = TempDir::new().unwrap();
        let tarball = temp.path().join("bad.tar.gz");
        fs::write(&tarball, "not gzip").unwrap();

        assert!(unpack_source(&tarball, &temp.path().join("build")).is_err());
    }
}
