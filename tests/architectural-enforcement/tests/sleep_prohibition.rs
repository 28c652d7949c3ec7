//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code never parks a thread. Every delay (reconnect
//! backoff, heartbeat, reveal pacing, settle) is a tokio timer owned by a
//! cancellable task.

use architectural_enforcement::{code_part, production_files, read_lines, test_region_start, Violation};

const THREAD_SLEEPS: &[&str] = &["thread::sleep(", "std::thread::sleep", "use std::thread::sleep"];

#[test]
fn test_no_thread_sleep_in_production_code() {
    let mut violations = Vec::new();

    for path in production_files() {
        let lines = read_lines(&path);
        let end = test_region_start(&lines).unwrap_or(lines.len());

        for (idx, line) in lines[..end].iter().enumerate() {
            let code = code_part(line);
            if THREAD_SLEEPS.iter().any(|pattern| code.contains(pattern)) {
                violations.push(Violation {
                    path: path.clone(),
                    line: idx + 1,
                    rule: "Thread sleep",
                    code: line.trim().to_string(),
                });
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nThread sleeps found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::time::sleep / sleep_until / interval in a task whose");
        eprintln!("AbortHandle is held by the owner.");

        panic!("Found {} sleep violation(s)", violations.len());
    }
}

#[test]
fn test_timers_are_async() {
    // The core must have timers, and they must all be tokio ones
    let mut tokio_timers = 0;
    for path in production_files() {
        let lines = read_lines(&path);
        let end = test_region_start(&lines).unwrap_or(lines.len());
        tokio_timers += lines[..end]
            .iter()
            .filter(|line| {
                let code = code_part(line);
                code.contains("tokio::time::sleep") || code.contains("tokio::time::interval")
            })
            .count();
    }
    assert!(tokio_timers > 0, "expected tokio timers in production code");
}
