use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;
use tracing::debug;
use crate::error::{RegistryError, Result};
use crate::registry::SourceLocation;

/// Fetches registry repositories into local checkouts.
pub trait RepositoryFetcher {
    /// Clones `url` into `dest`, which does not exist yet.
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;
    /// Updates an existing checkout. `force_reset` discards local changes.
    fn pull(&self, dest: &Path, force_reset: bool) -> Result<()>;
    /// Checks out a branch, tag or commit.
    fn checkout(&self, dest: &Path, git_ref: &str) -> Result<()>;
}

/// Brings the checkout at `dest` up to date with `source`.
///
/// Clones when `dest` does not exist and pulls otherwise, then checks out the
/// configured ref if there is one.
///
/// # Errors
/// Returns [`RegistryError::FetchFailed`] if any git step fails.
pub fn fetch(
    fetcher: &dyn RepositoryFetcher,
    source: &SourceLocation,
    dest: &Path,
    force_reset: bool,
) -> Result<()> {
    if dest.exists() {
        debug!("{} already exists; pulling instead of cloning", dest.display());
        fetcher.pull(dest, force_reset)?;
    } else {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::FetchFailed {
                url: source.url.clone(),
                reason: e.to_string(),
            })?;
        }
        debug!("cloning {} into {}", source.url, dest.display());
        fetcher.clone_repo(&source.url, dest)?;
    }
    if let Some(git_ref) = source.git_ref.as_deref() {
        debug!("checking out {git_ref}");
        fetcher.checkout(dest, git_ref)?;
    }
    Ok(())
}

/// [`RepositoryFetcher`] backed by the system `git` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitFetcher;

impl RepositoryFetcher for GitFetcher {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        run_git(url, [OsStr::new("clone"), OsStr::new(url), dest.as_os_str()])?;
        Ok(())
    }

    fn pull(&self, dest: &Path, force_reset: bool) -> Result<()> {
        let dir = dest.as_os_str();
        let label = dest.display().to_string();
        let git = |args: &[&str]| {
            let args = [OsStr::new("-C"), dir].into_iter().chain(args.iter().map(OsStr::new));
            run_git(&label, args)
        };
        git(&["fetch", "--tags", "origin"])?;
        // a checked out tag or commit has nothing to merge
        if git(&["symbolic-ref", "-q", "HEAD"]).is_err() {
            return Ok(());
        }
        if force_reset {
            git(&["reset", "--hard", "@{u}"])?;
        } else {
            git(&["merge", "--ff-only", "@{u}"])?;
        }
        Ok(())
    }

    fn checkout(&self, dest: &Path, git_ref: &str) -> Result<()> {
        let label = dest.display().to_string();
        let args = [OsStr::new("-C"), dest.as_os_str(), OsStr::new("checkout"), OsStr::new("--quiet"), OsStr::new(git_ref)];
        run_git(&label, args)?;
        Ok(())
    }
}

fn run_git<'a>(url: &str, args: impl IntoIterator<Item = &'a OsStr>) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .map_err(|e| RegistryError::FetchFailed {
            url: url.to_string(),
            reason: format!("unable to run git: {e}"),
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RegistryError::FetchFailed {
            url: url.to_string(),
            reason: stderr.trim().to_string(),
        });
    }
    Ok(stdout.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl RepositoryFetcher for Recorder {
        fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
            std::fs::create_dir_all(dest).unwrap();
            self.calls.borrow_mut().push(format!("clone {url}"));
            Ok(())
        }

        fn pull(&self, _dest: &Path, force_reset: bool) -> Result<()> {
            self.calls.borrow_mut().push(format!("pull {force_reset}"));
            Ok(())
        }

        fn checkout(&self, _dest: &Path, git_ref: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("checkout {git_ref}"));
            Ok(())
        }
    }

    #[test]
    fn test_fetch_clones_then_pulls() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("checkouts").join("core");
        let mut source = SourceLocation::new("https://example.com/core.git");
        source.git_ref = Some("v1".to_string());
        let fetcher = Recorder::default();

        fetch(&fetcher, &source, &dest, false).unwrap();
        fetch(&fetcher, &source, &dest, true).unwrap();
        assert_eq!(
            *fetcher.calls.borrow(),
            vec![
                "clone https://example.com/core.git",
                "checkout v1",
                "pull true",
                "checkout v1",
            ]
        );
    }

    #[test]
    fn test_failing_git_is_fetch_failed() {
        let dir = tempdir().unwrap();
        let err = GitFetcher.pull(&dir.path().join("missing"), false).unwrap_err();
        assert!(matches!(err, RegistryError::FetchFailed { .. }));
    }
}
