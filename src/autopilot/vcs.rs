//! Version-control collaborator

use crate::error::{ContextError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Working tree status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsStatus {
    pub clean: bool,
    /// Modified or untracked in the working tree
    pub modified: Vec<String>,
    /// Changed in the index
    pub staged: Vec<String>,
}

impl VcsStatus {
    /// Modified and staged paths without duplicates
    pub fn uncommitted(&self) -> Vec<String> {
        let mut paths = self.modified.clone();
        for path in &self.staged {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths
    }
}

/// Repository access used by revision polling
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn is_repository(&self) -> bool;

    /// Working tree status; paths are relative to the workspace root
    async fn status(&self) -> Result<VcsStatus>;

    async fn current_revision(&self) -> Result<String>;

    /// Paths changed between two revisions, relative to the workspace root.
    /// Changes outside the workspace are left out.
    async fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>>;

    async fn commit_message(&self, revision: &str) -> Result<String>;

    async fn diff(&self, from: &str, to: &str) -> Result<String>;
}

/// [`VersionControl`] backed by the `git` command line
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run_git_command(&self, args: &[&str]) -> Result<String> {
        debug!("Running git command: git {}", args.join(" "));

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ContextError::VersionControl(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContextError::VersionControl(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Location of the workspace inside the repository, e.g. `app/` or empty
    async fn workspace_prefix(&self) -> Result<String> {
        self.run_git_command(&["rev-parse", "--show-prefix"]).await
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn is_repository(&self) -> bool {
        matches!(
            self.run_git_command(&["rev-parse", "--is-inside-work-tree"]).await.as_deref(),
            Ok("true")
        )
    }

    async fn status(&self) -> Result<VcsStatus> {
        let output = self
            .run_git_command(&["status", "--porcelain", "--untracked-files=all", "--", "."])
            .await?;
        let prefix = self.workspace_prefix().await?;
        let mut status = parse_porcelain(&output);
        status.modified = strip_workspace_prefix(status.modified, &prefix);
        status.staged = strip_workspace_prefix(status.staged, &prefix);
        Ok(status)
    }

    async fn current_revision(&self) -> Result<String> {
        self.run_git_command(&["rev-parse", "HEAD"]).await
    }

    async fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let output = self
            .run_git_command(&["diff", "--name-only", "--relative", from, to])
            .await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn commit_message(&self, revision: &str) -> Result<String> {
        self.run_git_command(&["log", "-1", "--format=%B", revision])
            .await
    }

    async fn diff(&self, from: &str, to: &str) -> Result<String> {
        self.run_git_command(&["diff", "--unified=0", "--relative", from, to])
            .await
    }
}

/// Parse `git status --porcelain` (v1) output
pub fn parse_porcelain(output: &str) -> VcsStatus {
    let mut status = VcsStatus::default();

    for line in output.lines() {
        if line.len() < 4 {
            continue;
        }
        let mut codes = line.chars();
        let index = codes.next().unwrap_or(' ');
        let worktree = codes.next().unwrap_or(' ');
        let raw_path = &line[3..];
        // Renames are reported as "old -> new"
        let path = raw_path
            .rsplit_once(" -> ")
            .map(|(_, new)| new)
            .unwrap_or(raw_path)
            .trim_matches('"')
            .to_string();

        if index == '?' {
            status.modified.push(path);
            continue;
        }
        if index != ' ' {
            status.staged.push(path.clone());
        }
        if worktree != ' ' {
            status.modified.push(path);
        }
    }

    status.clean = status.modified.is_empty() && status.staged.is_empty();
    status
}

/// Rebase repository-relative paths onto the workspace, dropping those outside it
pub fn strip_workspace_prefix(paths: Vec<String>, prefix: &str) -> Vec<String> {
    if prefix.is_empty() {
        return paths;
    }
    paths
        .into_iter()
        .filter_map(|path| path.strip_prefix(prefix).map(str::to_string))
        .collect()
}
