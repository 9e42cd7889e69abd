use gpuload_types::{DeviceReport, Outcome, RunReport, Stage, Timings};
use quanta::Clock;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

use crate::device::{Accelerator, Context};
use crate::timing::{millis, Stopwatch};
use crate::verify::{spot_check, TOLERANCE};
use crate::{BenchConfig, Dataset, Error};

pub struct Measurement {
    /// Matrix allocation and synchronous copy.
    pub load: Duration,
    /// Launch issue only.
    pub dispatch: Duration,
    /// Launch, synchronize and readback.
    pub run: Duration,
    pub output: Vec<f32>,
}

impl Measurement {
    pub fn timings(&self) -> Timings {
        Timings {
            load_ms: millis(self.load),
            dispatch_ms: millis(self.dispatch),
            run_ms: millis(self.run),
        }
    }
}

/// Transfer and kernel stages for one device. Device buffers are released
/// when the session drops at the end of this call, on success or failure.
pub fn measure(
    accelerator: &dyn Accelerator,
    dataset: &Dataset,
    clock: &Clock,
) -> Result<Measurement, Error> {
    let rows = dataset.matrix.rows();
    let mut session = accelerator.bind()?;

    let watch = Stopwatch::start(clock);
    session.upload_matrix(&dataset.matrix)?;
    let load = watch.elapsed();
    debug!(load_ms = millis(load), bytes = dataset.matrix.as_slice().len() * 4, "matrix_loaded");

    session.upload_query(&dataset.query)?;
    session.allocate_output(rows)?;
    session.compile()?;

    let watch = Stopwatch::start(clock);
    session.launch()?;
    let dispatch = watch.elapsed();
    session.synchronize()?;
    let output = session.read_output()?;
    let run = watch.elapsed();
    debug!(dispatch_ms = millis(dispatch), run_ms = millis(run), "kernel_complete");

    if output.len() != rows {
        return Err(Error::Readback(format!(
            "read {} values for {} rows",
            output.len(),
            rows
        )));
    }

    Ok(Measurement {
        load,
        dispatch,
        run,
        output,
    })
}

/// Measure one device and fold any failure, including a failed spot check,
/// into its report.
pub fn run_device<R: Rng + ?Sized>(
    accelerator: &dyn Accelerator,
    dataset: &Dataset,
    clock: &Clock,
    verify_samples: usize,
    rng: &mut R,
) -> DeviceReport {
    let info = accelerator.info().clone();
    let _span = info_span!("device", name = %info.name, backend = %info.backend).entered();

    let outcome = match measure(accelerator, dataset, clock) {
        Ok(m) => {
            let check = (verify_samples > 0)
                .then(|| spot_check(dataset, &m.output, verify_samples, rng));
            match check {
                Some(c) if !c.passed => Outcome::Failed {
                    stage: Stage::Verify,
                    message: format!(
                        "max relative error {:.2e} over {} sampled rows exceeds {:.0e}",
                        c.max_rel_err, c.sampled, TOLERANCE
                    ),
                },
                _ => {
                    info!(load_ms = millis(m.load), run_ms = millis(m.run), "device complete");
                    Outcome::Completed {
                        timings: m.timings(),
                        output_len: m.output.len(),
                        last_value: m.output.last().copied(),
                        check,
                    }
                }
            }
        }
        Err(e) => {
            warn!(stage = %e.stage(), error = %e, "device failed");
            Outcome::Failed {
                stage: e.stage(),
                message: e.to_string(),
            }
        }
    };

    DeviceReport {
        device: info,
        outcome,
    }
}

/// Benchmark every device in `context`, one after another. `on_device` sees
/// each report as soon as it is ready.
pub fn run<R, F>(
    cfg: &BenchConfig,
    context: &Context,
    dataset: &Dataset,
    rng: &mut R,
    mut on_device: F,
) -> RunReport
where
    R: Rng + ?Sized,
    F: FnMut(&DeviceReport),
{
    let clock = Clock::new();
    let mut devices = Vec::with_capacity(context.len());

    if context.is_empty() {
        warn!("no compute devices found");
    }

    for accelerator in context.devices() {
        let report = run_device(accelerator, dataset, &clock, cfg.verify_samples, rng);
        on_device(&report);
        devices.push(report);
    }

    RunReport {
        shape: dataset.shape(),
        seed: cfg.seed,
        devices,
    }
}
