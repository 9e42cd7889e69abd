use gpuload_types::{DeviceReport, Outcome, Shape};
use std::fmt::Write;

/// Whole elapsed milliseconds with thousands separators, e.g. `1,234ms`.
pub fn format_ms(ms: f64) -> String {
    let whole = ms.floor().max(0.0) as u64;
    format!("{}ms", group_thousands(whole))
}

pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_megabytes(shape: Shape) -> String {
    let bytes = shape.matrix_bytes().unwrap_or(usize::MAX);
    format!("{}MB", bytes / 1_000_000)
}

/// Per-device block: blank line, identity, load time, run time, last value.
pub fn device_block(report: &DeviceReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.device);

    match &report.outcome {
        Outcome::Completed {
            timings,
            last_value,
            check,
            ..
        } => {
            let _ = writeln!(out, "Load time: {}", format_ms(timings.load_ms));
            let _ = writeln!(out, "Run time: {}", format_ms(timings.run_ms));
            if let Some(v) = last_value {
                let _ = writeln!(out, "Last value = {}", v);
            }
            if let Some(c) = check {
                let mark = if c.passed { "\u{2713}" } else { "\u{2717}" };
                let _ = writeln!(
                    out,
                    "Check: {} ({} rows, max rel err {:.2e})",
                    mark, c.sampled, c.max_rel_err
                );
            }
        }
        Outcome::Failed { stage, message } => {
            let _ = writeln!(out, "Failed during {}: {}", stage, message);
        }
    }
    out
}

/// Summary table over every device.
pub fn summary_table(reports: &[DeviceReport]) -> String {
    let name_w = 32;
    let col_w = 12;
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<name_w$} {:>col_w$} {:>col_w$} {:>col_w$} {:>6}",
        "Device", "Load", "Dispatch", "Run", "Check",
        name_w = name_w, col_w = col_w
    );
    let _ = writeln!(out, "{}", "-".repeat(name_w + col_w * 3 + 6 + 4));

    for r in reports {
        let mut name = r.device.name.clone();
        if name.chars().count() > name_w {
            name = name.chars().take(name_w - 1).collect::<String>() + "\u{2026}";
        }

        let (load, dispatch, run, check) = match &r.outcome {
            Outcome::Completed { timings, check, .. } => (
                format!("{:.1}ms", timings.load_ms),
                format!("{:.2}ms", timings.dispatch_ms),
                format!("{:.1}ms", timings.run_ms),
                match check {
                    Some(c) if c.passed => "\u{2713}",
                    Some(_) => "\u{2717}",
                    None => "\u{2014}",
                },
            ),
            Outcome::Failed { .. } => (
                "N/A".to_string(),
                "N/A".to_string(),
                "N/A".to_string(),
                "\u{2717}",
            ),
        };

        let _ = writeln!(
            out,
            "{:<name_w$} {:>col_w$} {:>col_w$} {:>col_w$} {:>6}",
            name, load, dispatch, run, check,
            name_w = name_w, col_w = col_w
        );
    }
    out
}
