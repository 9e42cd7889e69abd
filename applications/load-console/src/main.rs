mod report;

use std::io::Write;
use std::process::ExitCode;

use gpuload::config::{DEFAULT_DIMS, DEFAULT_ROWS, DEFAULT_VERIFY_SAMPLES};
use gpuload::{BenchConfig, Context, Dataset};
use gpuload_types::Backend;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn print_usage() {
    eprintln!("Usage: load-console [OPTIONS]");
    eprintln!();
    eprintln!("  --rows <n>         Matrix rows (default: {})", DEFAULT_ROWS);
    eprintln!("  --dims <n>         Vector dimension (default: {})", DEFAULT_DIMS);
    eprintln!("  --seed <n>         Seed the data generator (default: random)");
    eprintln!("  --backend <list>   all, cpu, wgpu, cuda; comma separated (default: all)");
    eprintln!("  --verify <n>       Rows to recheck on the host, 0 disables (default: {})", DEFAULT_VERIFY_SAMPLES);
    eprintln!("  --json             Print the run report as JSON");
    eprintln!("  --help             Show this help");
}

struct Args {
    config: BenchConfig,
    json: bool,
}

fn parse_backends(list: &str) -> Option<Vec<Backend>> {
    if list == "all" {
        return Some(Backend::ALL.to_vec());
    }
    let mut backends = Vec::new();
    for name in list.split(',') {
        let backend = Backend::parse(name)?;
        if !backends.contains(&backend) {
            backends.push(backend);
        }
    }
    Some(backends)
}

fn parse_args(args: &[String]) -> Result<Option<Args>, String> {
    let mut config = BenchConfig::default();
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--rows" | "--dims" | "--seed" | "--backend" | "--verify" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| format!("{} needs a value", flag))?;
                let bad = || format!("invalid value for {}: {}", flag, value);
                match flag {
                    "--rows" => config.shape.rows = value.parse().map_err(|_| bad())?,
                    "--dims" => config.shape.dims = value.parse().map_err(|_| bad())?,
                    "--seed" => config.seed = Some(value.parse().map_err(|_| bad())?),
                    "--verify" => config.verify_samples = value.parse().map_err(|_| bad())?,
                    _ => config.backends = parse_backends(value).ok_or_else(bad)?,
                }
            }
            "--json" => json = true,
            "--help" | "-h" => return Ok(None),
            other => return Err(format!("Unknown flag: {}", other)),
        }
        i += 1;
    }

    Ok(Some(Args { config, json }))
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("warn")),
                ),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Args { config, json } = match parse_args(&args) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(msg) => {
            eprintln!("{}", msg);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gpuload::validate(&config) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let text = !json;
    if text {
        println!("GPU Load Test");
        print!("Creating {} matrix... ", report::format_megabytes(config.shape));
        let _ = std::io::stdout().flush();
    }

    let mut rng = config.rng();
    let dataset = match Dataset::generate(config.shape, &mut rng) {
        Ok(ds) => ds,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if text {
        println!("Done");
    }

    let context = Context::create(&config.backends);
    let run = gpuload::run(&config, &context, &dataset, &mut rng, |device| {
        if text {
            print!("{}", report::device_block(device));
            let _ = std::io::stdout().flush();
        }
    });

    if json {
        match serde_json::to_string_pretty(&run) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else if !run.devices.is_empty() {
        print!("{}", report::summary_table(&run.devices));
    }

    if run.all_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuload_types::Shape;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("load-console")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        let parsed = parse_args(&args(&[])).unwrap().unwrap();
        assert_eq!(parsed.config, BenchConfig::default());
        assert!(!parsed.json);
    }

    #[test]
    fn every_flag_is_applied() {
        let parsed = parse_args(&args(&[
            "--rows", "10", "--dims", "3", "--seed", "9", "--backend", "cpu,wgpu", "--verify",
            "0", "--json",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(parsed.config.shape, Shape::new(10, 3));
        assert_eq!(parsed.config.seed, Some(9));
        assert_eq!(parsed.config.backends, vec![Backend::Cpu, Backend::Wgpu]);
        assert_eq!(parsed.config.verify_samples, 0);
        assert!(parsed.json);
    }

    #[test]
    fn duplicate_backends_collapse() {
        assert_eq!(parse_backends("cpu,CPU"), Some(vec![Backend::Cpu]));
        assert_eq!(parse_backends("all"), Some(Backend::ALL.to_vec()));
        assert_eq!(parse_backends("cpu,metal"), None);
    }

    #[test]
    fn help_short_circuits() {
        assert!(parse_args(&args(&["--help"])).unwrap().is_none());
    }

    #[test]
    fn bad_input_is_an_error() {
        assert!(parse_args(&args(&["--rows"])).is_err());
        assert!(parse_args(&args(&["--rows", "many"])).is_err());
        assert!(parse_args(&args(&["--frobnicate"])).is_err());
    }
}
