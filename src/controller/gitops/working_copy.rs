//! # Working Copy
//!
//! Ephemeral clone of the GitOps repository.
//!
//! A [`WorkingCopy`] owns a temporary directory for its whole lifetime; dropping
//! it removes the directory, so every exit path (success, error, cancellation)
//! cleans up. Git runs as a child process with `kill_on_drop(true)`, which aborts
//! in-flight clones and pushes when the owning future is dropped.
//!
//! Credentials travel as an `http.extraHeader` basic-auth header passed with
//! `-c` on network commands only. They are never written into the remote URL
//! or `.git/config`.

use crate::controller::gitops::credentials::Credentials;
use crate::controller::gitops::sanitize::sanitize;
use crate::crd::GitRepositoryConfig;
use crate::observability::metrics::GitOpsMetrics;
use base64::Engine;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};
use walkdir::WalkDir;

/// Errors from working copy operations; messages are sanitized
#[derive(Debug, Error)]
pub enum WorkingCopyError {
    #[error("git {operation} failed: {message}")]
    Git {
        operation: &'static str,
        message: String,
    },
    #[error("path '{0}' escapes the working copy root")]
    PathEscape(String),
    #[error("branch '{0}' does not exist locally")]
    BranchNotFound(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl WorkingCopyError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WorkingCopyError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Ephemeral clone of the GitOps repository
pub struct WorkingCopy {
    dir: TempDir,
    url: String,
    base_branch: String,
    tls_verify: bool,
    credentials: Credentials,
    metrics: Arc<GitOpsMetrics>,
}

impl std::fmt::Debug for WorkingCopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingCopy")
            .field("root", &self.dir.path())
            .field("url", &sanitize(Some(&self.credentials), &self.url))
            .field("base_branch", &self.base_branch)
            .finish_non_exhaustive()
    }
}

impl WorkingCopy {
    /// Shallow-clone all branches of `repo` into a fresh temporary directory
    ///
    /// The directory is removed again if the clone fails.
    pub async fn clone(
        repo: &GitRepositoryConfig,
        credentials: &Credentials,
        metrics: Arc<GitOpsMetrics>,
    ) -> Result<Self, WorkingCopyError> {
        let dir = tempfile::Builder::new()
            .prefix("netpol-gitops-")
            .tempdir()
            .map_err(|e| WorkingCopyError::io("failed to create working copy directory", e))?;

        let copy = Self {
            dir,
            url: repo.url.clone(),
            base_branch: repo.base_branch.clone(),
            tls_verify: repo.tls_verify,
            credentials: credentials.clone(),
            metrics,
        };

        let span = info_span!(
            "git.clone",
            repository.url = %sanitize(Some(credentials), &repo.url),
            branch = %repo.base_branch
        );
        async {
            let target = copy.dir.path().to_string_lossy().into_owned();
            copy.run(
                "clone",
                &[
                    "clone",
                    "--depth",
                    "1",
                    "--no-single-branch",
                    "--branch",
                    &copy.base_branch,
                    &copy.url,
                    &target,
                ],
                true,
                false,
            )
            .await?;
            info!("Cloned repository into {}", copy.dir.path().display());
            Ok::<_, WorkingCopyError>(())
        }
        .instrument(span)
        .await?;

        Ok(copy)
    }

    /// Root of the working copy
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    /// Fast-forward to the latest remote base branch
    ///
    /// Best-effort: a shallow clone missing refs only logs a warning.
    pub async fn sync_base(&self) {
        let base = self.base_branch.clone();
        let remote_ref = format!("origin/{base}");
        if let Err(e) = self
            .run("fetch", &["fetch", "--depth", "1", "origin", &base], true, true)
            .await
        {
            warn!("Could not fetch base branch {}: {}", base, e);
            return;
        }
        if let Err(e) = self.checkout_branch(&base, false).await {
            warn!("Could not check out base branch {}: {}", base, e);
            return;
        }
        if let Err(e) = self
            .run("reset", &["reset", "--hard", &remote_ref], false, true)
            .await
        {
            warn!("Could not reset to {}: {}", remote_ref, e);
        }
    }

    /// Name of the checked out branch
    pub async fn current_branch(&self) -> Result<String, WorkingCopyError> {
        self.run(
            "rev-parse",
            &["rev-parse", "--abbrev-ref", "HEAD"],
            false,
            true,
        )
        .await
        .map(|out| out.trim().to_string())
    }

    async fn local_branch_exists(&self, branch: &str) -> bool {
        let reference = format!("refs/heads/{branch}");
        self.run(
            "rev-parse",
            &["rev-parse", "--verify", "--quiet", &reference],
            false,
            true,
        )
        .await
        .is_ok()
    }

    /// Check out `branch`
    ///
    /// No-op when already on it. With `create`, a missing branch is created from HEAD;
    /// without it, a missing branch is an error.
    pub async fn checkout_branch(&self, branch: &str, create: bool) -> Result<(), WorkingCopyError> {
        if self.current_branch().await.ok().as_deref() == Some(branch) {
            return Ok(());
        }
        if self.local_branch_exists(branch).await {
            self.run("checkout", &["checkout", branch], false, true)
                .await?;
        } else if create {
            self.run("checkout", &["checkout", "-b", branch], false, true)
                .await?;
        } else {
            return Err(WorkingCopyError::BranchNotFound(branch.to_string()));
        }
        debug!("Checked out branch {}", branch);
        Ok(())
    }

    /// Whether `branch` exists on the remote
    pub async fn remote_branch_exists(&self, branch: &str) -> Result<bool, WorkingCopyError> {
        let out = self
            .run(
                "ls-remote",
                &["ls-remote", "--heads", "origin", branch],
                true,
                true,
            )
            .await?;
        let wanted = format!("refs/heads/{branch}");
        Ok(out
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(wanted.as_str())))
    }

    /// Stage everything, commit, and push `branch`
    ///
    /// Returns `false` without committing when the tree has no changes. A branch
    /// that already exists on the remote is fetched (best-effort) and force-pushed.
    pub async fn commit_and_push(
        &self,
        branch: &str,
        message: &str,
    ) -> Result<bool, WorkingCopyError> {
        let span = info_span!("git.commit_and_push", branch = %branch);
        async {
            self.run("add", &["add", "-A"], false, true).await?;
            let status = self
                .run("status", &["status", "--porcelain"], false, true)
                .await?;
            if status.trim().is_empty() {
                info!("No changes to commit on {}", branch);
                return Ok(false);
            }

            let name = format!("user.name={}", self.credentials.username);
            let email = format!("user.email={}", self.credentials.email);
            self.run(
                "commit",
                &["-c", &name, "-c", &email, "commit", "-m", message],
                false,
                true,
            )
            .await?;

            let refspec = format!("HEAD:refs/heads/{branch}");
            if self.remote_branch_exists(branch).await? {
                if let Err(e) = self
                    .run("fetch", &["fetch", "origin", branch], true, true)
                    .await
                {
                    debug!("Fetch of existing branch {} failed: {}", branch, e);
                }
                self.run("push", &["push", "--force", "origin", &refspec], true, true)
                    .await?;
                info!("Force-pushed existing branch {}", branch);
            } else {
                self.run("push", &["push", "origin", &refspec], true, true)
                    .await?;
                info!("Pushed new branch {}", branch);
            }
            Ok::<bool, WorkingCopyError>(true)
        }
        .instrument(span)
        .await
    }

    /// Resolve `relative` under the root
    ///
    /// Rejects absolute paths, `..`, and any existing symlink on the way down,
    /// since a link committed to the repository may point outside the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, WorkingCopyError> {
        let path = Path::new(relative);
        if relative.is_empty()
            || path
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(WorkingCopyError::PathEscape(relative.to_string()));
        }

        let mut current = self.dir.path().to_path_buf();
        for component in path.components() {
            let Component::Normal(part) = component else {
                continue;
            };
            current.push(part);
            match std::fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(WorkingCopyError::PathEscape(relative.to_string()));
                }
                Ok(_) => {}
                // Nothing below a missing component can exist yet
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => {
                    return Err(WorkingCopyError::io(format!("failed to stat {relative}"), e));
                }
            }
        }
        Ok(self.dir.path().join(path))
    }

    pub async fn read_file(&self, relative: &str) -> Result<String, WorkingCopyError> {
        let path = self.resolve(relative)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| WorkingCopyError::io(format!("failed to read {relative}"), e))
    }

    /// Write `contents` to `relative`, creating parent directories
    pub async fn write_file(&self, relative: &str, contents: &str) -> Result<(), WorkingCopyError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkingCopyError::io(format!("failed to create directory for {relative}"), e))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| WorkingCopyError::io(format!("failed to write {relative}"), e))
    }

    pub async fn exists(&self, relative: &str) -> Result<bool, WorkingCopyError> {
        let path = self.resolve(relative)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| WorkingCopyError::io(format!("failed to stat {relative}"), e))
    }

    pub async fn remove_file(&self, relative: &str) -> Result<(), WorkingCopyError> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkingCopyError::io(format!("failed to remove {relative}"), e)),
        }
    }

    /// YAML files under `relative_dir`, as sorted root-relative paths with `/` separators
    ///
    /// A missing directory yields an empty list.
    pub fn list_yaml_files(&self, relative_dir: &str) -> Result<Vec<String>, WorkingCopyError> {
        let dir = self.resolve(relative_dir)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| {
                let message = e.to_string();
                WorkingCopyError::io(
                    format!("failed to list {relative_dir}"),
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other(message)),
                )
            })?;
            if !entry.file_type().is_file() || !is_yaml(entry.path()) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(self.dir.path()) {
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push(parts.join("/"));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Run git with `args`; `network` adds the auth header and TLS options,
    /// `in_repo` runs it inside the working copy
    async fn run(
        &self,
        operation: &'static str,
        args: &[&str],
        network: bool,
        in_repo: bool,
    ) -> Result<String, WorkingCopyError> {
        let mut cmd = Command::new("git");
        if in_repo {
            cmd.arg("-C").arg(self.dir.path());
        }
        if network {
            let basic = base64::engine::general_purpose::STANDARD.encode(format!(
                "{}:{}",
                self.credentials.username, self.credentials.token
            ));
            cmd.arg("-c")
                .arg(format!("http.extraHeader=Authorization: Basic {basic}"));
            if !self.tls_verify {
                cmd.arg("-c").arg("http.sslVerify=false");
            }
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| WorkingCopyError::Git {
            operation,
            message: sanitize(Some(&self.credentials), &e.to_string()),
        });
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                self.metrics.record_git_operation(operation, false);
                return Err(e);
            }
        };

        let success = output.status.success();
        self.metrics.record_git_operation(operation, success);
        if !success {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkingCopyError::Git {
                operation,
                message: sanitize(Some(&self.credentials), stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yaml() {
        assert!(is_yaml(Path::new("a/b.yaml")));
        assert!(is_yaml(Path::new("b.YML")));
        assert!(!is_yaml(Path::new("README.md")));
        assert!(!is_yaml(Path::new("yaml")));
    }
}
