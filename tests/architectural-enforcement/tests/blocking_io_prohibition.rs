//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async code in the core and the CLI must not block the runtime.
//! **Required**: `tokio::fs`, `tokio::io`, `tokio::net` and async `reqwest`.
//!
//! Blocking calls are acceptable in plain functions that run before the
//! runtime does anything (configuration loading) and in test code.

use architectural_enforcement::{
    code_part, is_async_context, production_files, read_lines, test_region_start, Violation,
};

/// Patterns that block when called, checked inside async code
const BLOCKING_CALLS: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
    (".blocking_recv(", "Blocking channel receive"),
    (".blocking_send(", "Blocking channel send"),
    (".blocking_lock(", "Blocking mutex lock"),
];

/// Imports that make blocking calls look innocent at the call site
const BLOCKING_IMPORTS: &[&str] = &["use std::fs", "use std::net", "use reqwest::blocking"];

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = find_violations();

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::fs / tokio::io / tokio::net instead, or move the call");
        eprintln!("into a plain function that runs before the runtime starts work.");

        panic!("Found {} blocking I/O violation(s)", violations.len());
    }
}

fn find_violations() -> Vec<Violation> {
    let mut violations = Vec::new();

    for path in production_files() {
        let lines = read_lines(&path);
        let end = test_region_start(&lines).unwrap_or(lines.len());

        for idx in 0..end {
            let code = code_part(&lines[idx]);

            for import in BLOCKING_IMPORTS {
                if code.trim_start().starts_with(import) {
                    violations.push(Violation {
                        path: path.clone(),
                        line: idx + 1,
                        rule: "Blocking import",
                        code: lines[idx].trim().to_string(),
                    });
                }
            }

            for (pattern, rule) in BLOCKING_CALLS {
                if code.contains(pattern) && is_async_context(&lines, idx) {
                    violations.push(Violation {
                        path: path.clone(),
                        line: idx + 1,
                        rule: *rule,
                        code: lines[idx].trim().to_string(),
                    });
                }
            }
        }
    }

    violations
}

#[test]
fn test_detector_flags_blocking_read_in_async_fn() {
    let lines: Vec<String> = [
        "pub async fn load(&self) -> String {",
        "    std::fs::read_to_string(&self.path).unwrap_or_default()",
        "}",
        "pub fn load_sync(path: &Path) -> String {",
        "    std::fs::read_to_string(path).unwrap_or_default()",
        "}",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    assert!(is_async_context(&lines, 1));
    assert!(!is_async_context(&lines, 4));
}
