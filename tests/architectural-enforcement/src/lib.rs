//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No blocking sleep in production code
//! - No `unwrap()`/`expect()` outside test modules
//! - No presentation-layer dependencies in the core crate
//!
//! The helpers here locate the workspace and strip test modules so the tests
//! in `tests/` only inspect production code.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// All `.rs` files under `dir`
#[must_use]
pub fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Source directories of every monitor crate
#[must_use]
pub fn production_source_dirs() -> Vec<PathBuf> {
    let root = workspace_root();
    ["monitor/core/src", "monitor/daemon/src"]
        .iter()
        .map(|dir| root.join(dir))
        .collect()
}

/// File contents up to the first `#[cfg(test)]`, with `//` comment lines removed
#[must_use]
pub fn production_code(source: &str) -> String {
    let end = source.find("#[cfg(test)]").unwrap_or(source.len());
    source[..end]
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A forbidden pattern found in production code
#[derive(Debug, PartialEq, Eq)]
pub struct Violation {
    /// File containing the pattern
    pub file: PathBuf,
    /// 1-based line within the production portion of the file
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

/// Every production line in the monitor crates containing one of `patterns`
#[must_use]
pub fn find_in_production(patterns: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for dir in production_source_dirs() {
        for file in rust_sources(&dir) {
            let Ok(source) = fs::read_to_string(&file) else {
                continue;
            };
            for (idx, line) in production_code(&source).lines().enumerate() {
                if patterns.iter().any(|p| line.contains(p)) {
                    violations.push(Violation {
                        file: file.clone(),
                        line: idx + 1,
                        text: line.trim().to_string(),
                    });
                }
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_code_strips_tests_and_comments() {
        let source = "fn a() {}\n// x.unwrap()\n#[cfg(test)]\nmod tests { fn b() { x.unwrap(); } }";
        let code = production_code(source);
        assert_eq!(code, "fn a() {}");
    }

    #[test]
    fn test_workspace_root_contains_monitor() {
        assert!(workspace_root().join("monitor").is_dir());
    }
}
