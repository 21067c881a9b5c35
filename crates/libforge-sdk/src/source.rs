//! Source tree placement and retrieval.
//!
//! Each repository lands in `<repo root>/<name>/<version selector>`, where the
//! selector is the first populated of tag, commit, archive name and branch, or
//! `_latest_` when none is set. A destination that already exists and is not
//! empty is reused as-is.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::layout::BuildLayout;
use crate::runner::{CommandRunner, Invocation};
use crate::types::ForgeError;

/// Version selector used when no tag, commit, archive or branch is given.
pub const LATEST_SELECTOR: &str = "_latest_";

/// Where a target's sources come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceRepo {
    pub url: String,
    /// Directory name under the repo root. Defaults to the target name when
    /// loaded from configuration.
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Set for archive downloads; `url` then points at a tarball.
    #[serde(default, rename = "archive", skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
    /// Extract into the destination itself. When false the archive is
    /// expected to carry its own `<archive name>/` root and is extracted in
    /// the parent directory.
    #[serde(default)]
    pub create_archive_dir: bool,
    /// Commands (argv lists) run in the source directory after fetching.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_checkout: Vec<Vec<String>>,
}

/// How [`fetch`] obtains the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStrategy<'r> {
    Archive(&'r str),
    ShallowRef(&'r str),
    PinnedCommit(&'r str),
    DefaultBranch,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl SourceRepo {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Priority: tag > commit > archive name > branch > `_latest_`.
    pub fn version_selector(&self) -> &str {
        non_empty(&self.tag)
            .or_else(|| non_empty(&self.commit))
            .or_else(|| non_empty(&self.archive_name))
            .or_else(|| non_empty(&self.branch))
            .unwrap_or(LATEST_SELECTOR)
    }

    pub fn repo_dir(&self, layout: &BuildLayout) -> PathBuf {
        layout
            .repo_root()
            .join(&self.name)
            .join(self.version_selector())
    }

    pub fn strategy(&self) -> FetchStrategy<'_> {
        if let Some(archive) = non_empty(&self.archive_name) {
            FetchStrategy::Archive(archive)
        } else if let Some(tag) = non_empty(&self.tag) {
            FetchStrategy::ShallowRef(tag)
        } else if let Some(commit) = non_empty(&self.commit) {
            FetchStrategy::PinnedCommit(commit)
        } else if let Some(branch) = non_empty(&self.branch) {
            FetchStrategy::ShallowRef(branch)
        } else {
            FetchStrategy::DefaultBranch
        }
    }

    fn validate(&self) -> Result<(), ForgeError> {
        if self.name.is_empty() {
            return Err(ForgeError::Config("source repository name must not be empty".into()));
        }
        if self.url.is_empty() {
            return Err(ForgeError::Config(format!(
                "source repository '{}' has no url",
                self.name
            )));
        }
        if let Some(cmd) = self.post_checkout.iter().find(|c| c.is_empty()) {
            return Err(ForgeError::Config(format!(
                "empty post-checkout command in repository '{}': {:?}",
                self.name, cmd
            )));
        }
        Ok(())
    }
}

fn is_empty_dir(dir: &Path) -> Result<bool, ForgeError> {
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Makes the source tree of `repo` available and returns its directory.
///
/// No process is spawned when the destination already holds files.
pub fn fetch(
    repo: &SourceRepo,
    layout: &BuildLayout,
    runner: &dyn CommandRunner,
) -> Result<PathBuf, ForgeError> {
    repo.validate()?;
    let dir = repo.repo_dir(layout);
    if dir.is_dir() && !is_empty_dir(&dir)? {
        debug!(dir = %dir.display(), "source already present");
        return Ok(dir);
    }
    fs::create_dir_all(&dir)?;
    info!(repo = %repo.name, version = %repo.version_selector(), url = %repo.url, "fetching source");

    match repo.strategy() {
        FetchStrategy::Archive(_) => download_archive(repo, &dir, runner)?,
        FetchStrategy::ShallowRef(reference) => {
            runner.run(
                &Invocation::new("git")
                    .args(["clone", "--branch", reference, "--depth", "1"])
                    .arg(&repo.url)
                    .arg(&dir)
                    .streaming(),
            )?;
        }
        FetchStrategy::PinnedCommit(commit) => {
            runner.run(
                &Invocation::new("git")
                    .arg("clone")
                    .arg(&repo.url)
                    .arg(&dir)
                    .streaming(),
            )?;
            runner.run(
                &Invocation::new("git")
                    .arg("-C")
                    .arg(&dir)
                    .args(["checkout", commit])
                    .streaming(),
            )?;
        }
        FetchStrategy::DefaultBranch => {
            runner.run(
                &Invocation::new("git")
                    .args(["clone", "--depth", "1"])
                    .arg(&repo.url)
                    .arg(&dir)
                    .streaming(),
            )?;
        }
    }

    for cmd in &repo.post_checkout {
        runner.run(
            &Invocation::new(&cmd[0])
                .args(&cmd[1..])
                .current_dir(&dir)
                .streaming(),
        )?;
    }
    Ok(dir)
}

fn download_archive(repo: &SourceRepo, dir: &Path, runner: &dyn CommandRunner) -> Result<(), ForgeError> {
    let download = tempfile::Builder::new()
        .prefix("libforge-download")
        .tempfile()?;
    let archive = download.path();

    runner.run(
        &Invocation::new("curl")
            .args(["-L", "-o"])
            .arg(archive)
            .arg(&repo.url)
            .streaming(),
    )?;

    let flags = if repo.url.ends_with(".tar.gz") { "-xzvf" } else { "-xvf" };
    let extract_in = if repo.create_archive_dir {
        dir
    } else {
        dir.parent().unwrap_or(dir)
    };
    runner.run(
        &Invocation::new("tar")
            .arg(flags)
            .arg(archive)
            .current_dir(extract_in)
            .streaming(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;

    fn layout(root: &Path) -> BuildLayout {
        BuildLayout::new(root.join("build"), root.join("repo"))
    }

    #[test]
    fn test_version_selector_precedence() {
        let mut repo = SourceRepo::new("ogg", "https://github.com/xiph/ogg");
        assert_eq!(repo.version_selector(), LATEST_SELECTOR);
        repo.branch = Some("main".into());
        assert_eq!(repo.version_selector(), "main");
        repo.archive_name = Some("libogg-1.3.5".into());
        assert_eq!(repo.version_selector(), "libogg-1.3.5");
        repo.commit = Some("abc123".into());
        assert_eq!(repo.version_selector(), "abc123");
        repo.tag = Some("v1.3.5".into());
        assert_eq!(repo.version_selector(), "v1.3.5");

        let layout = BuildLayout::new("/b", "/r");
        assert_eq!(repo.repo_dir(&layout), PathBuf::from("/r/ogg/v1.3.5"));
    }

    #[test]
    fn test_tag_wins_over_commit() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = layout(dir.path());
        let runner = RecordingRunner::new();
        let repo = SourceRepo {
            tag: Some("v1.3.5".into()),
            commit: Some("abc123".into()),
            ..SourceRepo::new("ogg", "https://github.com/xiph/ogg")
        };

        let out = fetch(&repo, &layout, &runner).unwrap();
        assert!(out.ends_with("ogg/v1.3.5"));
        let argvs = runner.argvs();
        assert_eq!(argvs.len(), 1);
        assert_eq!(
            argvs[0][..6],
            ["git", "clone", "--branch", "v1.3.5", "--depth", "1"]
        );
    }

    #[test]
    fn test_commit_only_clones_then_checks_out() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = layout(dir.path());
        let runner = RecordingRunner::new();
        let repo = SourceRepo {
            commit: Some("abc123".into()),
            post_checkout: vec![vec!["sh".into(), "autogen.sh".into()]],
            ..SourceRepo::new("vorbis", "https://github.com/xiph/vorbis")
        };

        let out = fetch(&repo, &layout, &runner).unwrap();
        let argvs = runner.argvs();
        let dir_arg = out.display().to_string();
        assert_eq!(
            argvs[0],
            vec!["git", "clone", "https://github.com/xiph/vorbis", dir_arg.as_str()]
        );
        assert_eq!(argvs[1], vec!["git", "-C", dir_arg.as_str(), "checkout", "abc123"]);
        assert_eq!(argvs[2], vec!["sh", "autogen.sh"]);
        assert_eq!(runner.calls()[2].working_dir(), Some(out.as_path()));
    }

    #[test]
    fn test_existing_non_empty_dir_skips_fetch() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = layout(dir.path());
        let runner = RecordingRunner::new();
        let repo = SourceRepo::new("ogg", "https://github.com/xiph/ogg");
        let existing = repo.repo_dir(&layout);
        fs::create_dir_all(&existing).unwrap();
        fs::write(existing.join("CMakeLists.txt"), "").unwrap();

        let out = fetch(&repo, &layout, &runner).unwrap();
        assert_eq!(out, existing);
        assert!(runner.argvs().is_empty());
    }

    #[test]
    fn test_existing_empty_dir_is_refetched() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = layout(dir.path());
        let runner = RecordingRunner::new();
        let repo = SourceRepo::new("ogg", "https://github.com/xiph/ogg");
        fs::create_dir_all(repo.repo_dir(&layout)).unwrap();

        fetch(&repo, &layout, &runner).unwrap();
        assert_eq!(runner.argvs()[0][..4], ["git", "clone", "--depth", "1"]);
    }

    #[test]
    fn test_archive_extracts_in_parent_without_own_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = layout(dir.path());
        let runner = RecordingRunner::new();
        let repo = SourceRepo {
            archive_name: Some("libogg-1.3.5".into()),
            ..SourceRepo::new(
                "ogg",
                "https://downloads.xiph.org/releases/ogg/libogg-1.3.5.tar.gz",
            )
        };

        let out = fetch(&repo, &layout, &runner).unwrap();
        assert!(out.ends_with("ogg/libogg-1.3.5"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        let curl = calls[0].argv();
        assert_eq!(curl[..3], ["curl", "-L", "-o"]);
        assert_eq!(curl[4], repo.url);
        let tar = calls[1].argv();
        assert_eq!(tar[1], "-xzvf");
        assert_eq!(tar[2], curl[3]);
        assert_eq!(calls[1].working_dir(), out.parent());
    }

    #[test]
    fn test_archive_with_own_dir_and_plain_tar() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = layout(dir.path());
        let runner = RecordingRunner::new();
        let repo = SourceRepo {
            archive_name: Some("lame-3.100".into()),
            create_archive_dir: true,
            ..SourceRepo::new("lame", "https://example.com/lame-3.100.tar")
        };

        let out = fetch(&repo, &layout, &runner).unwrap();
        let calls = runner.calls();
        assert_eq!(calls[1].argv()[1], "-xvf");
        assert_eq!(calls[1].working_dir(), Some(out.as_path()));
    }

    #[test]
    fn test_invalid_repo_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let repo = SourceRepo::new("ogg", "");
        assert!(fetch(&repo, &layout(dir.path()), &runner).is_err());
        let repo = SourceRepo {
            post_checkout: vec![vec![]],
            ..SourceRepo::new("ogg", "https://github.com/xiph/ogg")
        };
        assert!(fetch(&repo, &layout(dir.path()), &runner).is_err());
        assert!(runner.argvs().is_empty());
    }

    #[test]
    fn test_source_repo_from_toml() {
        let repo: SourceRepo = toml::from_str(
            r#"
url = "https://github.com/xiph/ogg"
tag = "v1.3.5"
post_checkout = [["./autogen.sh"]]
"#,
        )
        .unwrap();
        assert_eq!(repo.version_selector(), "v1.3.5");
        assert!(repo.name.is_empty());
        assert_eq!(repo.post_checkout, vec![vec!["./autogen.sh".to_string()]]);
    }
}
