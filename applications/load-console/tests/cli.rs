use gpuload_types::{Outcome, RunReport, Shape};
use std::process::{Command, Output};

fn run_console(args: &[&str]) -> Output {
    let binary = env!("CARGO_BIN_EXE_load-console");
    Command::new(binary)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run {}: {}", binary, e))
}

#[test]
fn cpu_run_prints_console_report() {
    let output = run_console(&["--backend", "cpu", "--rows", "2000", "--dims", "50", "--seed", "1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {}\nstderr: {}", stdout, String::from_utf8_lossy(&output.stderr));

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "GPU Load Test");
    assert_eq!(lines[1], "Creating 0MB matrix... Done");
    assert_eq!(lines[2], "");
    assert!(lines[3].starts_with("CPU [CPU: "), "device line: {}", lines[3]);
    assert!(lines[4].starts_with("Load time: ") && lines[4].ends_with("ms"));
    assert!(lines[5].starts_with("Run time: ") && lines[5].ends_with("ms"));
    assert!(lines[6].starts_with("Last value = "));
    let last: f32 = lines[6]["Last value = ".len()..].parse().unwrap();
    assert!(last.is_finite() && last >= 0.0);
    assert!(lines[7].starts_with("Check: \u{2713}"));
}

#[test]
fn json_report_parses() {
    let output = run_console(&["--backend", "cpu", "--rows", "3", "--dims", "2", "--seed", "4", "--json"]);
    assert!(output.status.success());

    let report: RunReport = serde_json::from_slice(&output.stdout).expect("stdout is a JSON run report");
    assert_eq!(report.shape, Shape::new(3, 2));
    assert_eq!(report.seed, Some(4));
    assert_eq!(report.devices.len(), 1);
    match &report.devices[0].outcome {
        Outcome::Completed { output_len, last_value, timings, check } => {
            assert_eq!(*output_len, 3);
            assert!(last_value.is_some());
            assert!(timings.load_ms >= 0.0 && timings.run_ms >= 0.0);
            assert!(check.map_or(false, |c| c.passed && c.sampled == 3));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn seeded_runs_report_the_same_last_value() {
    let a = run_console(&["--backend", "cpu", "--rows", "500", "--dims", "8", "--seed", "99", "--json"]);
    let b = run_console(&["--backend", "cpu", "--rows", "500", "--dims", "8", "--seed", "99", "--json"]);
    let a: RunReport = serde_json::from_slice(&a.stdout).unwrap();
    let b: RunReport = serde_json::from_slice(&b.stdout).unwrap();
    let last = |r: &RunReport| match &r.devices[0].outcome {
        Outcome::Completed { last_value, .. } => *last_value,
        Outcome::Failed { .. } => None,
    };
    assert!(last(&a).is_some());
    assert_eq!(last(&a), last(&b));
}

#[test]
fn zero_rows_run_cleanly() {
    let output = run_console(&["--backend", "cpu", "--rows", "0", "--json"]);
    assert!(output.status.success());
    let report: RunReport = serde_json::from_slice(&output.stdout).unwrap();
    assert!(matches!(
        report.devices[0].outcome,
        Outcome::Completed { output_len: 0, last_value: None, .. }
    ));
}

#[test]
fn help_exits_successfully() {
    let output = run_console(&["--help"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage: load-console"));
}

#[test]
fn unknown_flag_fails() {
    let output = run_console(&["--frobnicate"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown flag: --frobnicate"));
}

#[test]
fn oversized_shape_is_rejected_before_generation() {
    let output = run_console(&["--rows", "4294967296", "--dims", "1"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}
