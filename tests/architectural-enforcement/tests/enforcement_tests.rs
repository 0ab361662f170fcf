//! Enforcement checks over the monitor crates

use std::fs;

use architectural_enforcement::{find_in_production, rust_sources, workspace_root, Violation};

fn report(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  {}:{}: {}", v.file.display(), v.line, v.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Blocking sleeps stall the runtime; timers must go through `tokio::time`
#[test]
fn no_blocking_sleep_in_production_code() {
    let violations = find_in_production(&["thread::sleep", "std::thread::sleep"]);
    assert!(
        violations.is_empty(),
        "Blocking sleep found:\n{}",
        report(&violations)
    );
}

#[test]
fn no_unwrap_or_expect_in_production_code() {
    let violations = find_in_production(&[".unwrap()", ".expect("]);
    assert!(
        violations.is_empty(),
        "unwrap()/expect() found outside tests:\n{}",
        report(&violations)
    );
}

#[test]
fn core_has_no_presentation_dependencies() {
    let manifest = fs::read_to_string(workspace_root().join("monitor/core/Cargo.toml"))
        .expect("core manifest readable");
    for forbidden in ["ratatui", "crossterm", "axum", "clap", "tracing-subscriber"] {
        assert!(
            !manifest.contains(forbidden),
            "monitor-core must not depend on {forbidden}"
        );
    }
}

#[test]
fn core_does_not_print() {
    let violations = find_in_production(&["println!", "eprintln!"]);
    let in_core: Vec<Violation> = violations
        .into_iter()
        .filter(|v| v.file.to_string_lossy().contains("monitor/core"))
        .collect();
    assert!(
        in_core.is_empty(),
        "Core must log through tracing:\n{}",
        report(&in_core)
    );
}

#[test]
fn sources_are_found() {
    let core = rust_sources(&workspace_root().join("monitor/core/src"));
    assert!(core.iter().any(|p| p.ends_with("scheduler.rs")));
}
