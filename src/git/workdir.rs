//! Working-copy management for per-job isolation.
//!
//! Each job clones the manifest repository into its own directory,
//! `<base>/puppetfile_repo_<random>`. The random suffix keeps concurrent jobs
//! apart, and the directory is removed when the job ends, whatever the
//! outcome.
//!
//! If the process dies mid-job the directory is left behind;
//! [`sweep_stale_workdirs`] removes such leftovers at startup.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use super::GitResult;

/// Name prefix shared by every working copy.
pub const WORKDIR_PREFIX: &str = "puppetfile_repo_";

/// A job's private clone directory.
///
/// Dropping a `WorkingCopy` removes the directory silently; callers on the
/// normal path use [`WorkingCopy::remove`] so that a failed removal is logged.
#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
}

impl WorkingCopy {
    /// Allocates a new, empty working directory under `base`.
    pub fn create(base: &Path) -> GitResult<Self> {
        std::fs::create_dir_all(base)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir_in(base)?;
        tracing::debug!(path = %dir.path().display(), "allocated working copy");
        Ok(WorkingCopy { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the directory.
    ///
    /// A failure is logged and swallowed: cleanup must never mask the error
    /// of the job that owned the directory.
    pub fn remove(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "removed working copy"),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to remove working copy"
            ),
        }
    }
}

/// Removes leftover working copies older than `max_age`.
///
/// Only directories carrying [`WORKDIR_PREFIX`] are considered. Returns the
/// removed paths.
pub fn sweep_stale_workdirs(base: &Path, max_age: Duration) -> GitResult<Vec<PathBuf>> {
    if !base.exists() {
        return Ok(vec![]);
    }

    let mut removed = Vec::new();

    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();

        let is_workdir = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(WORKDIR_PREFIX));
        if !is_workdir || !entry.file_type()?.is_dir() {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        // >= so that a zero max age sweeps everything
        if age >= max_age {
            tracing::info!(
                path = %path.display(),
                age_hours = age.as_secs() / 3600,
                "removing stale working copy"
            );
            std::fs::remove_dir_all(&path)?;
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_copy_is_prefixed_and_unique() {
        let base = TempDir::new().unwrap();

        let a = WorkingCopy::create(base.path()).unwrap();
        let b = WorkingCopy::create(base.path()).unwrap();

        assert_ne!(a.path(), b.path());
        for wc in [&a, &b] {
            assert!(wc.path().is_dir());
            assert_eq!(wc.path().parent(), Some(base.path()));
            let name = wc.path().file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with(WORKDIR_PREFIX), "name was {name}");
        }
    }

    #[test]
    fn create_makes_missing_base() {
        let base = TempDir::new().unwrap();
        let nested = base.path().join("a/b");

        let wc = WorkingCopy::create(&nested).unwrap();

        assert!(wc.path().starts_with(&nested));
    }

    #[test]
    fn remove_deletes_directory_and_contents() {
        let base = TempDir::new().unwrap();
        let wc = WorkingCopy::create(base.path()).unwrap();
        let path = wc.path().to_path_buf();
        std::fs::create_dir(path.join(".git")).unwrap();
        std::fs::write(path.join("Puppetfile"), "mod 'x'\n").unwrap();

        wc.remove();

        assert!(!path.exists());
    }

    #[test]
    fn remove_tolerates_already_deleted_directory() {
        let base = TempDir::new().unwrap();
        let wc = WorkingCopy::create(base.path()).unwrap();
        std::fs::remove_dir_all(wc.path()).unwrap();

        // Logged, not raised.
        wc.remove();
    }

    #[test]
    fn sweep_removes_only_prefixed_directories() {
        let base = TempDir::new().unwrap();
        let stale = base.path().join(format!("{WORKDIR_PREFIX}old"));
        let other = base.path().join("unrelated");
        let file = base.path().join(format!("{WORKDIR_PREFIX}file"));
        std::fs::create_dir(&stale).unwrap();
        std::fs::create_dir(&other).unwrap();
        std::fs::write(&file, "x").unwrap();

        let removed = sweep_stale_workdirs(base.path(), Duration::ZERO).unwrap();

        assert_eq!(removed, vec![stale.clone()]);
        assert!(!stale.exists());
        assert!(other.exists());
        assert!(file.exists());
    }

    #[test]
    fn sweep_keeps_recent_directories() {
        let base = TempDir::new().unwrap();
        let wc = WorkingCopy::create(base.path()).unwrap();

        let removed = sweep_stale_workdirs(base.path(), Duration::from_secs(3600)).unwrap();

        assert!(removed.is_empty());
        assert!(wc.path().exists());
    }

    #[test]
    fn sweep_of_missing_base_is_empty() {
        let base = TempDir::new().unwrap();
        let removed =
            sweep_stale_workdirs(&base.path().join("missing"), Duration::ZERO).unwrap();
        assert!(removed.is_empty());
    }
}
