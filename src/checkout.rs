//! Git worktree management for session checkouts.
//!
//! Each session runs in an isolated worktree of the surrounding
//! repository so concurrent agents never trample each other's working
//! copies. Checkouts live under `<base>/<repo-name>/<branch>`, with the
//! branch name used verbatim as the directory component (slashes create
//! nested directories).
//!
//! Worktree verbs go through the `git` CLI (the libgit2 worktree API
//! does not handle existing branches properly), while repository
//! discovery and branch lookup use `git2`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use globset::{Glob, GlobSetBuilder};

use crate::error::HydraError;

/// Patterns file read from the repository root when seeding a checkout.
const COPY_PATTERNS_FILE: &str = ".hydra-copy";

/// A checkout on disk, as discovered by [`CheckoutManager::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutEntry {
    /// Absolute worktree path.
    pub path: PathBuf,
    /// Branch checked out there.
    pub branch: String,
}

/// Creates, lists, and removes session checkouts.
#[derive(Debug)]
pub struct CheckoutManager {
    /// Root of the surrounding repository's main working tree.
    repo_root: PathBuf,
    /// Basename of the repository root.
    repo_name: String,
    /// Directory holding this repository's checkouts.
    base_dir: PathBuf,
}

impl CheckoutManager {
    /// Discover the surrounding repository and derive the checkout base.
    ///
    /// `checkout_base` is the configured root (`~/.hydra/worktrees`); the
    /// repository gets its own subdirectory named after the repo root's
    /// basename. Fails with [`HydraError::Preflight`] outside a git
    /// working tree.
    pub fn new(checkout_base: &Path) -> Result<Self, HydraError> {
        let cwd = std::env::current_dir()
            .map_err(|e| HydraError::Preflight(format!("cannot read current directory: {e}")))?;
        Self::discover_from(checkout_base, &cwd)
    }

    /// Like [`Self::new`], but discovery starts at `start_dir` instead
    /// of the process working directory.
    pub fn discover_from(checkout_base: &Path, start_dir: &Path) -> Result<Self, HydraError> {
        let repo = git2::Repository::discover(start_dir)
            .map_err(|_| HydraError::Preflight("not inside a git working tree".to_string()))?;

        let repo_root = repo
            .workdir()
            .ok_or_else(|| HydraError::Preflight("repository has no working tree".to_string()))?
            .to_path_buf();

        let repo_name = repo_root
            .file_name()
            .ok_or_else(|| HydraError::Preflight("cannot determine repository name".to_string()))?
            .to_string_lossy()
            .to_string();

        let base_dir = checkout_base.join(&repo_name);

        Ok(Self {
            repo_root,
            repo_name,
            base_dir,
        })
    }

    /// Root of the main working tree.
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Basename of the repository root.
    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    /// Directory holding this repository's checkouts.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Whether a local branch with this name exists.
    pub fn branch_exists(&self, branch: &str) -> bool {
        git2::Repository::open(&self.repo_root)
            .map(|repo| repo.find_branch(branch, git2::BranchType::Local).is_ok())
            .unwrap_or(false)
    }

    /// Create (or attach to) a checkout for `branch`.
    ///
    /// Reuses an existing local branch; creates one with `-b` otherwise.
    /// A directory already registered as a worktree is attached as-is so
    /// restarts find their sessions again. Newly created checkouts are
    /// seeded with files matching the repo's `.hydra-copy` patterns.
    pub fn add(&self, branch: &str) -> Result<PathBuf> {
        let worktree_path = self.base_dir.join(branch);

        if worktree_path.join(".git").is_file() {
            log::info!("Attaching to existing checkout at {}", worktree_path.display());
            return Ok(worktree_path);
        }

        if let Some(parent) = worktree_path.parent() {
            fs::create_dir_all(parent).context("Failed to create checkout base directory")?;
        }

        let path_str = worktree_path
            .to_str()
            .context("Checkout path is not valid UTF-8")?;

        let output = if self.branch_exists(branch) {
            log::info!("Using existing branch: {branch}");
            Command::new("git")
                .args(["worktree", "add", path_str, branch])
                .current_dir(&self.repo_root)
                .output()?
        } else {
            log::info!("Creating new branch: {branch}");
            Command::new("git")
                .args(["worktree", "add", "-b", branch, path_str])
                .current_dir(&self.repo_root)
                .output()?
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to create worktree: {}", stderr.trim());
        }

        if let Err(e) = self.seed_checkout(&worktree_path) {
            log::warn!("Checkout seeding failed for {branch}: {e}");
        }

        Ok(worktree_path)
    }

    /// Remove a checkout and its administrative entry. Best-effort.
    pub fn remove(&self, worktree_path: &Path) -> Result<(), HydraError> {
        let path_str = worktree_path.to_string_lossy();
        let output = Command::new("git")
            .args(["worktree", "remove", path_str.as_ref(), "--force"])
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| HydraError::Cleanup {
                path: worktree_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(HydraError::Cleanup {
                path: worktree_path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// List checkouts under the base directory.
    ///
    /// Parses `git worktree list --porcelain` and keeps entries whose
    /// path sits under [`Self::base_dir`]; the main working tree and
    /// unrelated worktrees are excluded.
    pub fn list(&self) -> Result<Vec<CheckoutEntry>> {
        let output = Command::new("git")
            .args(["worktree", "list", "--porcelain"])
            .current_dir(&self.repo_root)
            .output()
            .context("Failed to list worktrees")?;

        if !output.status.success() {
            anyhow::bail!(
                "Failed to list worktrees: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_porcelain(&stdout)
            .into_iter()
            .filter(|entry| entry.path.starts_with(&self.base_dir))
            .collect())
    }

    /// Remove stale checkout directories left behind by a crash.
    ///
    /// Runs `git worktree prune` to drop dangling administrative
    /// entries, then deletes any directory under the base that is no
    /// longer a registered worktree. Run at startup, before restore.
    pub fn prune_orphans(&self) {
        let _ = Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(&self.repo_root)
            .output();

        let registered: Vec<PathBuf> = match self.list() {
            Ok(entries) => entries.into_iter().map(|e| e.path).collect(),
            Err(e) => {
                log::warn!("Skipping orphan prune, cannot list worktrees: {e}");
                return;
            }
        };

        for dir in leaf_checkout_dirs(&self.base_dir) {
            if !registered.contains(&dir) {
                log::info!("Removing orphaned checkout directory {}", dir.display());
                if let Err(e) = fs::remove_dir_all(&dir) {
                    log::warn!("Failed to remove orphan {}: {e}", dir.display());
                }
            }
        }
    }

    /// Copy files matching `.hydra-copy` patterns into a new checkout.
    ///
    /// Reads one glob per line from the repository root (blanks and
    /// `#`-comments ignored) and copies every matching file, preserving
    /// relative paths. Untracked local files like `.env` survive into
    /// the isolated checkout this way.
    fn seed_checkout(&self, dest: &Path) -> Result<()> {
        let patterns_path = self.repo_root.join(COPY_PATTERNS_FILE);
        if !patterns_path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(&patterns_path)
            .with_context(|| format!("Failed to read {COPY_PATTERNS_FILE}"))?;

        let patterns: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();

        if patterns.is_empty() {
            return Ok(());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => log::warn!("Invalid glob pattern '{pattern}': {e}"),
            }
        }
        let globset = builder.build()?;

        copy_matching_files(&self.repo_root, dest, &self.repo_root, &globset)?;
        log::info!("Seeded checkout from {} pattern(s)", patterns.len());
        Ok(())
    }
}

/// Parse `git worktree list --porcelain` output into entries.
fn parse_porcelain(output: &str) -> Vec<CheckoutEntry> {
    let mut entries = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_branch = String::new();

    let mut push = |path: &mut Option<PathBuf>, branch: &mut String| {
        if let Some(p) = path.take() {
            entries.push(CheckoutEntry {
                path: p,
                branch: std::mem::take(branch),
            });
        }
    };

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            push(&mut current_path, &mut current_branch);
            current_path = Some(PathBuf::from(path));
        } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
            current_branch = branch.to_string();
        }
    }
    push(&mut current_path, &mut current_branch);

    entries
}

/// Directories under `base` that look like checkouts (contain a `.git`
/// file; worktrees have a `.git` *file*, main repos a directory).
fn leaf_checkout_dirs(base: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![base.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if path.join(".git").is_file() {
                found.push(path);
            } else {
                stack.push(path);
            }
        }
    }
    found
}

/// Recursively copy files matching the globset, preserving layout.
fn copy_matching_files(
    source_root: &Path,
    dest_root: &Path,
    current_dir: &Path,
    globset: &globset::GlobSet,
) -> Result<()> {
    if !current_dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(current_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
            continue;
        }

        let rel_path = path
            .strip_prefix(source_root)
            .context("Failed to get relative path")?;

        if path.is_dir() {
            copy_matching_files(source_root, dest_root, &path, globset)?;
        } else if globset.is_match(rel_path) {
            let dest_path = dest_root.join(rel_path);
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&path, &dest_path).with_context(|| {
                format!("Failed to copy {} to {}", path.display(), dest_path.display())
            })?;
            log::debug!("Copied: {}", rel_path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn porcelain_parsing_extracts_paths_and_branches() {
        let output = "\
worktree /home/u/proj
HEAD abcdef
branch refs/heads/main

worktree /home/u/.hydra/worktrees/proj/feature-a
HEAD 123456
branch refs/heads/feature-a
";
        let entries = parse_porcelain(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, PathBuf::from("/home/u/proj"));
        assert_eq!(entries[0].branch, "main");
        assert_eq!(entries[1].branch, "feature-a");
    }

    #[test]
    fn porcelain_parsing_handles_detached_worktrees() {
        let output = "\
worktree /home/u/proj
HEAD abcdef
detached
";
        let entries = parse_porcelain(output);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].branch, "");
    }

    #[test]
    fn porcelain_parsing_empty_input() {
        assert!(parse_porcelain("").is_empty());
    }

    #[test]
    fn leaf_dirs_skips_missing_base() {
        let dirs = leaf_checkout_dirs(Path::new("/nonexistent/hydra-test"));
        assert!(dirs.is_empty());
    }
}
