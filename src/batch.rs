//! Loading every log under a directory tree.
//!
//! Logs are independent of each other, so they are parsed in parallel and a
//! bad file never keeps the rest from loading.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::codec::{self, ParsedLog};
use crate::error::LogError;

/// File name the uploader writes each suite to.
pub const LOG_FILE_NAME: &str = "data.js";

#[derive(Debug)]
pub struct LoadedLog {
    pub path: PathBuf,
    /// Directory of the log relative to the discovery root, e.g.
    /// `X86/standard/latency/read`.
    pub suite: String,
    pub parsed: ParsedLog,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub loaded: Vec<LoadedLog>,
    pub errors: Vec<LogError>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Logs found under one root, plus the parts of the tree that could not be
/// walked.
#[derive(Debug, Default)]
pub struct Discovered {
    pub paths: Vec<PathBuf>,
    pub errors: Vec<LogError>,
}

/// Every `data.js` under `root`, in sorted path order.
///
/// A file path is returned as-is whatever its name, so a log saved as
/// `*.json` can still be checked by naming it. Unreadable directories and
/// broken links are recorded and skipped; the rest of the tree is still
/// walked.
pub fn discover<P: AsRef<Path>>(root: P) -> Discovered {
    let root = root.as_ref();
    if root.is_file() {
        return Discovered {
            paths: vec![root.to_path_buf()],
            errors: Vec::new(),
        };
    }

    let mut found = Discovered::default();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && entry.file_name() == LOG_FILE_NAME {
                    found.paths.push(entry.into_path());
                }
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                let err = LogError::io(path, e.into());
                warn!("{err}");
                found.errors.push(err);
            }
        }
    }

    debug!(
        root = %root.display(),
        logs = found.paths.len(),
        errors = found.errors.len(),
        "discovered suite logs"
    );
    found
}

/// Suite label for `path`: its parent directory relative to `root`.
pub fn suite_label(root: &Path, path: &Path) -> String {
    let dir = path.parent().unwrap_or(Path::new(""));
    let rel = dir.strip_prefix(root).unwrap_or(dir);
    let label = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if label.is_empty() {
        ".".to_string()
    } else {
        label
    }
}

/// Parse `paths` in parallel. Results keep the order of `paths`.
pub fn load_all(root: &Path, paths: &[PathBuf]) -> BatchReport {
    let results: Vec<Result<LoadedLog, LogError>> = paths
        .par_iter()
        .map(|path| {
            codec::read_file(path).map(|parsed| LoadedLog {
                path: path.clone(),
                suite: suite_label(root, path),
                parsed,
            })
        })
        .collect();

    let mut report = BatchReport::default();
    for result in results {
        match result {
            Ok(loaded) => report.loaded.push(loaded),
            Err(e) => {
                warn!("{e}");
                report.errors.push(e);
            }
        }
    }
    report
}

/// Discover and load every log under each root.
pub fn load_roots<P: AsRef<Path>>(roots: &[P]) -> BatchReport {
    let mut report = BatchReport::default();
    for root in roots {
        let root = root.as_ref();
        let found = discover(root);
        report.errors.extend(found.errors);

        // A lone file is labelled by its own directory name.
        let base = if root.is_file() {
            root.parent()
                .and_then(Path::parent)
                .unwrap_or(Path::new(""))
        } else {
            root
        };
        let part = load_all(base, &found.paths);
        report.loaded.extend(part.loaded);
        report.errors.extend(part.errors);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_file;
    use crate::synth::{generate, SynthConfig};
    use crate::Format;
    use std::fs;
    use tempfile::tempdir;

    fn write_suite(root: &Path, rel: &str, seed: u64) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(LOG_FILE_NAME);
        let log = generate(&SynthConfig {
            runs: 5,
            seed,
            ..Default::default()
        });
        write_file(&path, &log, Format::Wrapped).unwrap();
        path
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        write_suite(dir.path(), "X86/standard/latency/read", 1);
        write_suite(dir.path(), "ARM64/disk/write", 2);
        fs::write(dir.path().join("README.md"), "not a log").unwrap();

        let found = discover(dir.path());
        assert!(found.errors.is_empty());
        assert_eq!(found.paths.len(), 2);
        assert!(found.paths[0].ends_with("ARM64/disk/write/data.js"));
        assert!(found.paths[1].ends_with("X86/standard/latency/read/data.js"));
    }

    #[test]
    fn test_discover_ignores_other_json_files() {
        let dir = tempdir().unwrap();
        write_suite(dir.path(), "X86/standard/time/list", 6);
        fs::write(dir.path().join("package.json"), r#"{"name": "dashboard"}"#).unwrap();
        fs::write(
            dir.path().join("X86/standard/time/list/tsconfig.json"),
            "{}",
        )
        .unwrap();

        let report = load_roots(&[dir.path()]);
        assert!(report.is_clean());
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.loaded[0].suite, "X86/standard/time/list");
    }

    #[test]
    fn test_json_file_named_directly_is_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.json");
        let log = generate(&SynthConfig {
            runs: 3,
            seed: 7,
            ..Default::default()
        });
        write_file(&path, &log, Format::Json).unwrap();

        assert_eq!(discover(&path).paths, vec![path.clone()]);
        let report = load_roots(&[&path]);
        assert!(report.is_clean());
        assert_eq!(report.loaded[0].parsed.format, Format::Json);
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_subtree_does_not_hide_siblings() {
        let dir = tempdir().unwrap();
        write_suite(dir.path(), "ARM/premium/latency/create", 8);
        let broken = dir.path().join("X86/disk");
        fs::create_dir_all(&broken).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), broken.join("read")).unwrap();
        write_suite(dir.path(), "standard_hns/latency/write", 9);

        let found = discover(dir.path());
        assert_eq!(found.paths.len(), 2);
        assert_eq!(found.errors.len(), 1);
        assert!(found.errors[0].to_string().contains("X86"));

        let report = load_roots(&[dir.path()]);
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.errors.len(), 1);
        let suites: Vec<&str> = report.loaded.iter().map(|l| l.suite.as_str()).collect();
        assert_eq!(suites, vec!["ARM/premium/latency/create", "standard_hns/latency/write"]);
    }

    #[test]
    fn test_bad_file_does_not_stop_batch() {
        let dir = tempdir().unwrap();
        write_suite(dir.path(), "ARM/premium/latency/create", 3);
        let bad = dir.path().join("X86/disk/read");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join(LOG_FILE_NAME), "window.BENCHMARK_DATA = {\"lastUpdate\": 1").unwrap();
        write_suite(dir.path(), "standard_hns/latency/write", 4);

        let report = load_roots(&[dir.path()]);
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert!(!report.is_clean());
        assert!(report.errors[0].to_string().contains("X86"));

        let suites: Vec<&str> = report.loaded.iter().map(|l| l.suite.as_str()).collect();
        assert_eq!(suites, vec!["ARM/premium/latency/create", "standard_hns/latency/write"]);
    }

    #[test]
    fn test_single_file_root() {
        let dir = tempdir().unwrap();
        let path = write_suite(dir.path(), "premium/bandwidth/create", 5);

        let report = load_roots(&[&path]);
        assert!(report.is_clean());
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.loaded[0].suite, "create");
    }

    #[test]
    fn test_missing_root_reported() {
        let dir = tempdir().unwrap();
        let report = load_roots(&[dir.path().join("absent")]);
        assert!(report.loaded.is_empty());
        assert_eq!(report.errors.len(), 1);
    }
}
