//! Structural tests for architectural boundary enforcement.
//!
//! These scan source files so the layering (domain → application → infra,
//! with commands and output on the outside) cannot erode silently.

use std::path::{Path, PathBuf};

fn src() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src")
}

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

fn relative(file: &Path) -> String {
    file.strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .display()
        .to_string()
        .replace('\\', "/")
}

/// Track brace depth and report whether a line is inside a test-only block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if !self.in_test_block
            && (trimmed.starts_with("#[cfg(test)]") || trimmed.starts_with("#[cfg(all(test"))
        {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Production (non-test, non-comment) lines of every file under `dir`,
/// as `(relative path, 1-based line number, line)`.
fn production_lines(dir: &Path) -> Vec<(String, usize, String)> {
    let mut out = Vec::new();
    for file in collect_rs_files(dir) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let rel = relative(&file);
        let mut tracker = CfgTestTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") || trimmed.starts_with("#[cfg(test)]") {
                continue;
            }
            out.push((rel.clone(), i + 1, line.to_string()));
        }
    }
    out
}

fn assert_none(violations: &[String], what: &str) {
    assert!(violations.is_empty(), "{what}:\n{}", violations.join("\n"));
}

fn forbid(dir: &Path, needles: &[&str], what: &str) {
    let violations: Vec<String> = production_lines(dir)
        .into_iter()
        .filter(|(rel, _, line)| {
            !rel.ends_with("test_support.rs") && needles.iter().any(|n| line.contains(n))
        })
        .map(|(rel, n, line)| format!("{rel}:{n}: {}", line.trim()))
        .collect();
    assert_none(&violations, what);
}

// ── Layer boundaries ──────────────────────────────────────────────────────────

#[test]
fn domain_is_pure() {
    forbid(
        &src().join("domain"),
        &[
            "crate::infra",
            "crate::application",
            "crate::commands",
            "crate::output",
            "tokio::",
            "std::fs",
            "std::process",
            "std::net",
        ],
        "domain/ must stay free of I/O and outer layers",
    );
}

#[test]
fn application_does_not_reach_outward() {
    forbid(
        &src().join("application"),
        &["crate::infra", "crate::commands", "crate::output", "std::fs", "tokio::process"],
        "application/ may only use domain and ports",
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    forbid(
        &src().join("infra"),
        &["crate::commands", "crate::output", "crate::application::services"],
        "infra/ must not import from commands/, output/ or services",
    );
}

#[test]
fn infra_has_no_print_macros_outside_tests() {
    forbid(
        &src().join("infra"),
        &["println!", "eprintln!"],
        "infra/ must log through tracing, not print",
    );
}

// ── Wiring ────────────────────────────────────────────────────────────────────

#[test]
fn no_tokio_command_runner_new_outside_infra_and_app() {
    let violations: Vec<String> = production_lines(&src())
        .into_iter()
        .filter(|(rel, _, _)| !rel.contains("/infra/") && !rel.ends_with("app.rs"))
        .filter(|(_, _, line)| line.contains("TokioCommandRunner::new"))
        .map(|(rel, n, line)| format!("{rel}:{n}: {}", line.trim()))
        .collect();
    assert_none(&violations, "processes are spawned only through infra adapters");
}

#[test]
fn no_concrete_adapter_types_in_service_signatures() {
    let concrete = [
        "SlurmCluster",
        "SshShell",
        "LocalMachine",
        "StateManager",
        "TokioCommandRunner",
        "TokioClock",
    ];
    let violations: Vec<String> = production_lines(&src().join("application"))
        .into_iter()
        .filter(|(_, _, line)| line.contains("fn ") && concrete.iter().any(|c| line.contains(c)))
        .map(|(rel, n, line)| format!("{rel}:{n}: {}", line.trim()))
        .collect();
    assert_none(&violations, "services take trait bounds, not adapters");
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[test]
fn no_inline_json_branching_in_commands() {
    let violations: Vec<String> = production_lines(&src().join("commands"))
        .into_iter()
        .filter(|(_, _, line)| {
            let t = line.trim();
            line.contains("json: bool") || t.starts_with("if json") || t.starts_with("if !json")
        })
        .map(|(rel, n, line)| format!("{rel}:{n}: {}", line.trim()))
        .collect();
    assert_none(&violations, "commands render through app.renderer()");
}

#[test]
fn commands_prompt_through_app_context() {
    forbid(
        &src().join("commands"),
        &["dialoguer::", "stdin().lock()"],
        "commands prompt via AppContext::input/confirm so --yes and the TTY guard apply",
    );
}

#[test]
fn command_handlers_accept_app_context() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src().join("commands")) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        if content.contains("pub async fn run(") && !content.contains("app: &AppContext") {
            violations.push(relative(&file));
        }
    }
    assert_none(&violations, "async command handlers take &AppContext");
}

// ── Blocking I/O safety ───────────────────────────────────────────────────────

/// Track whether a line is inside an async fn and outside `spawn_blocking`.
struct AsyncContextTracker {
    in_async_fn: bool,
    in_spawn_blocking: bool,
    brace_depth: i32,
    async_fn_start_depth: i32,
    spawn_blocking_start_depth: i32,
}

impl AsyncContextTracker {
    fn new() -> Self {
        Self {
            in_async_fn: false,
            in_spawn_blocking: false,
            brace_depth: 0,
            async_fn_start_depth: 0,
            spawn_blocking_start_depth: 0,
        }
    }

    /// Returns `true` if the line is in an async fn but not in `spawn_blocking`.
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.contains("async fn ") {
            self.in_async_fn = true;
            self.async_fn_start_depth = self.brace_depth;
        } else if trimmed.contains("fn ") && !trimmed.contains("async ") {
            self.in_async_fn = false;
            self.in_spawn_blocking = false;
        }
        if self.in_async_fn && line.contains("spawn_blocking") {
            self.in_spawn_blocking = true;
            self.spawn_blocking_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_spawn_blocking && self.brace_depth <= self.spawn_blocking_start_depth
                    {
                        self.in_spawn_blocking = false;
                    }
                    if self.in_async_fn && self.brace_depth <= self.async_fn_start_depth {
                        self.in_async_fn = false;
                    }
                }
                _ => {}
            }
        }
        self.in_async_fn && !self.in_spawn_blocking
    }
}

#[test]
fn infra_async_functions_do_not_use_blocking_fs() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src().join("infra")) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let rel = relative(&file);
        let mut tests = CfgTestTracker::new();
        let mut tracker = AsyncContextTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tests.process_line(line);
            let unguarded = tracker.process_line(line);
            if in_test || !unguarded || line.trim().starts_with("//") {
                continue;
            }
            if line.contains("std::fs::") {
                violations.push(format!("{rel}:{}: {}", i + 1, line.trim()));
            }
        }
    }
    assert_none(
        &violations,
        "infra/ async functions must use spawn_blocking for std::fs",
    );
}
