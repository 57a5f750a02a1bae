//! File model and timestamp-based freshness

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use tracing::{debug, warn};

/// A path with a lazily computed, memoized modification time
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
    modified: OnceLock<Option<SystemTime>>,
}

impl File {
    /// Create a file entry; nothing is read until needed
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            modified: OnceLock::new(),
        }
    }

    /// Get the path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time, `None` if the file does not exist.
    ///
    /// The filesystem is consulted at most once per `File`.
    pub fn modified(&self) -> Option<SystemTime> {
        *self.modified.get_or_init(|| {
            fs::metadata(&self.path)
                .ok()
                .map(|meta| meta.modified().unwrap_or(SystemTime::UNIX_EPOCH))
        })
    }

    /// Check if the file exists
    pub fn exists(&self) -> bool {
        self.modified().is_some()
    }

    /// Set the modification time to now, creating the file if missing
    pub fn touch(&self) -> io::Result<()> {
        touch(&self.path)
    }
}

/// Expand one path or glob pattern.
///
/// An entry containing `*` is treated as a glob and yields only existing
/// files. Anything else yields a single file whether or not it exists.
pub fn expand(entry: &str) -> Vec<File> {
    if !entry.contains('*') {
        return vec![File::new(entry)];
    }
    match glob::glob(entry) {
        Ok(paths) => paths
            .flatten()
            .map(File::new)
            .filter(File::exists)
            .collect(),
        Err(e) => {
            warn!(pattern = entry, error = %e, "invalid glob pattern");
            Vec::new()
        }
    }
}

/// Expand every entry in order
pub fn expand_all<S: AsRef<str>>(entries: &[S]) -> Vec<File> {
    entries.iter().flat_map(|s| expand(s.as_ref())).collect()
}

/// Why a target has to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    /// Nothing to compare
    NoSourcesOrTargets,
    /// A declared output does not exist
    TargetMissing(PathBuf),
    /// Inputs exist but no outputs were declared
    NoTargets,
    /// The newest input is newer than the oldest output
    SourceNewer { source: PathBuf, target: PathBuf },
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSourcesOrTargets => write!(f, "no known sources or targets"),
            Self::TargetMissing(path) => write!(f, "target '{}' is missing", path.display()),
            Self::NoTargets => write!(f, "no targets were specified"),
            Self::SourceNewer { source, target } => write!(
                f,
                "source '{}' is newer than target '{}'",
                source.display(),
                target.display()
            ),
        }
    }
}

/// Decide whether outputs are stale relative to inputs.
///
/// Returns `None` when no rebuild is needed.
pub fn needs_rebuild(inputs: &[File], outputs: &[File]) -> Option<RebuildReason> {
    if inputs.is_empty() {
        if outputs.iter().any(File::exists) {
            return None;
        }
        return Some(RebuildReason::NoSourcesOrTargets);
    }
    if let Some(missing) = outputs.iter().find(|f| !f.exists()) {
        return Some(RebuildReason::TargetMissing(missing.path.clone()));
    }
    let Some(oldest) = outputs.iter().min_by_key(|f| f.modified()) else {
        return Some(RebuildReason::NoTargets);
    };
    let newest = inputs.iter().max_by_key(|f| f.modified())?;
    if newest.modified() > oldest.modified() {
        return Some(RebuildReason::SourceNewer {
            source: newest.path.clone(),
            target: oldest.path.clone(),
        });
    }
    debug!(
        newest_input = %newest.path.display(),
        oldest_output = %oldest.path.display(),
        "outputs are up to date"
    );
    None
}

/// Set a path's modification time to now, creating an empty file if missing.
///
/// Existing paths are opened read-only so directories can be touched too.
pub fn touch(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::File::open(path)?.set_modified(SystemTime::now())
    } else {
        fs::File::create(path).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_with_mtime(dir: &Path, name: &str, mtime: SystemTime) -> File {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(mtime).unwrap();
        File::new(path)
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + secs)
    }

    #[test]
    fn test_no_inputs_existing_output_is_fresh() {
        let temp = TempDir::new().unwrap();
        let out = write_with_mtime(temp.path(), "out", at(0));
        assert_eq!(needs_rebuild(&[], &[out]), None);
    }

    #[test]
    fn test_no_inputs_no_outputs_rebuilds() {
        assert_eq!(
            needs_rebuild(&[], &[]),
            Some(RebuildReason::NoSourcesOrTargets)
        );
    }

    #[test]
    fn test_inputs_without_outputs_rebuilds() {
        let temp = TempDir::new().unwrap();
        let src = write_with_mtime(temp.path(), "src", at(0));
        assert_eq!(needs_rebuild(&[src], &[]), Some(RebuildReason::NoTargets));
    }

    #[test]
    fn test_missing_output_rebuilds() {
        let temp = TempDir::new().unwrap();
        let src = write_with_mtime(temp.path(), "src", at(0));
        let out = File::new(temp.path().join("missing"));
        assert!(matches!(
            needs_rebuild(&[src], &[out]),
            Some(RebuildReason::TargetMissing(_))
        ));
    }

    #[test]
    fn test_compares_newest_input_to_oldest_output() {
        let temp = TempDir::new().unwrap();
        let a = write_with_mtime(temp.path(), "a", at(10));
        let b = write_with_mtime(temp.path(), "b", at(30));
        let x = write_with_mtime(temp.path(), "x", at(20));
        let y = write_with_mtime(temp.path(), "y", at(40));

        let reason = needs_rebuild(&[a.clone(), b.clone()], &[x.clone(), y.clone()]);
        assert_eq!(
            reason,
            Some(RebuildReason::SourceNewer {
                source: b.path().to_path_buf(),
                target: x.path().to_path_buf(),
            })
        );

        let older = write_with_mtime(temp.path(), "older", at(5));
        assert_eq!(needs_rebuild(&[older], &[x, y]), None);
    }

    #[test]
    fn test_equal_mtimes_are_fresh() {
        let temp = TempDir::new().unwrap();
        let src = write_with_mtime(temp.path(), "src", at(10));
        let out = write_with_mtime(temp.path(), "out", at(10));
        assert_eq!(needs_rebuild(&[src], &[out]), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_touch_bumps_directory_mtime() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dist");
        fs::create_dir(&dir).unwrap();
        fs::File::open(&dir).unwrap().set_modified(at(0)).unwrap();

        touch(&dir).unwrap();
        let modified = fs::metadata(&dir).unwrap().modified().unwrap();
        assert!(modified > at(0));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_stat_is_memoized() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("late");
        let file = File::new(&path);
        assert!(!file.exists());
        fs::write(&path, "now it exists").unwrap();
        assert!(!file.exists());
        assert!(File::new(&path).exists());
    }

    #[test]
    fn test_expand_glob_and_literal() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.src"), "").unwrap();
        fs::write(temp.path().join("b.src"), "").unwrap();
        fs::write(temp.path().join("c.txt"), "").unwrap();

        let pattern = temp.path().join("*.src").to_string_lossy().to_string();
        let mut found: Vec<_> = expand(&pattern)
            .iter()
            .map(|f| f.path().file_name().unwrap().to_string_lossy().to_string())
            .collect();
        found.sort();
        assert_eq!(found, vec!["a.src", "b.src"]);

        let literal = temp.path().join("nope").to_string_lossy().to_string();
        let files = expand(&literal);
        assert_eq!(files.len(), 1);
        assert!(!files[0].exists());
    }

    #[test]
    fn test_touch_creates_and_updates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out");
        touch(&path).unwrap();
        assert!(path.exists());

        let old = write_with_mtime(temp.path(), "old", at(0));
        old.touch().unwrap();
        let refreshed = File::new(old.path());
        assert!(refreshed.modified().unwrap() > at(0));
    }
}
