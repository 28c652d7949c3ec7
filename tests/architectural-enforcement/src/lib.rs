//! Architectural Enforcement
//!
//! Source-scanning helpers shared by the policy tests in `tests/`:
//! - No blocking I/O inside async code
//! - No `std::thread::sleep` anywhere in production code
//!
//! The scanners are line based. They are deliberately simple and err towards
//! reporting; a false positive is fixed by restructuring the code, not by
//! teaching the scanner exceptions.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["tether/core/src", "tether/cli/src"];

/// A policy violation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// File the violation is in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What rule was broken
    pub rule: &'static str,
    /// The offending line, trimmed
    pub code: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}: {}", self.path.display(), self.line, self.rule, self.code)
    }
}

/// Root of the workspace this crate belongs to
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// All `.rs` files under the production directories
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        assert!(path.exists(), "production directory {} is missing", path.display());

        for entry in walkdir::WalkDir::new(&path).into_iter().filter_map(Result::ok) {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files
}

/// Read a file into lines, or nothing if unreadable
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Code part of a line (before any `//` comment)
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Index of the first line of the file's test module, if any
///
/// Everything from a top-level `#[cfg(test)]` onwards is test code.
pub fn test_region_start(lines: &[String]) -> Option<usize> {
    lines.iter().position(|line| line.starts_with("#[cfg(test)]"))
}

/// Whether a trimmed line is a function header; `Some(true)` for async ones
pub fn fn_header(line: &str) -> Option<bool> {
    let mut rest = line.trim_start();
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }

    let mut is_async = false;
    loop {
        if let Some(stripped) = rest.strip_prefix("async ") {
            is_async = true;
            rest = stripped;
        } else if let Some(stripped) = rest
            .strip_prefix("const ")
            .or_else(|| rest.strip_prefix("unsafe "))
        {
            rest = stripped;
        } else {
            break;
        }
    }

    rest.starts_with("fn ").then_some(is_async)
}

/// Whether line `idx` runs in async context
///
/// True inside an `async fn`, or inside an `async` block opened between the
/// enclosing function header and the line.
pub fn is_async_context(lines: &[String], idx: usize) -> bool {
    for line in lines[..=idx].iter().rev() {
        let code = code_part(line);
        if code.contains("async move {") || code.contains("async {") {
            return true;
        }
        if let Some(is_async) = fn_header(code) {
            return is_async;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(code: &[&str]) -> Vec<String> {
        code.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_fn_header_detection() {
        assert_eq!(fn_header("pub async fn connect(&self) {"), Some(true));
        assert_eq!(fn_header("    pub(crate) fn load() -> Config {"), Some(false));
        assert_eq!(fn_header("async unsafe fn raw() {"), Some(true));
        assert_eq!(fn_header("let f = fn_pointer;"), None);
        assert_eq!(fn_header("// fn in a comment"), None);
    }

    #[test]
    fn test_async_context() {
        let code = lines(&[
            "pub fn schedule(&mut self) {",
            "    let delay = self.delay;",
            "    tokio::spawn(async move {",
            "        work().await;",
            "    });",
            "}",
            "async fn run() {",
            "    step().await;",
            "}",
        ]);
        assert!(!is_async_context(&code, 1));
        assert!(is_async_context(&code, 3));
        assert!(is_async_context(&code, 7));
    }

    #[test]
    fn test_test_region() {
        let code = lines(&["fn a() {}", "", "#[cfg(test)]", "mod tests {"]);
        assert_eq!(test_region_start(&code), Some(2));
        assert_eq!(test_region_start(&code[..2]), None);
    }

    #[test]
    fn test_workspace_root_has_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
    }
}
