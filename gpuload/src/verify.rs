use gpuload_types::Check;
use rand::Rng;
use tracing::warn;

use crate::kernel::euclidean_square;
use crate::Dataset;

/// Maximum relative error accepted between device and host distances.
pub const TOLERANCE: f64 = 1e-4;

/// Error recorded for NaN output or a length mismatch. Stays finite so the
/// report survives a JSON round trip.
const UNBOUNDED: f64 = f64::MAX;

/// Recompute `samples` random rows on the host and compare against `output`.
/// Asking for at least as many samples as rows checks every row.
pub fn spot_check<R: Rng + ?Sized>(
    dataset: &Dataset,
    output: &[f32],
    samples: usize,
    rng: &mut R,
) -> Check {
    let rows = dataset.matrix.rows();
    if output.len() != rows {
        warn!(expected = rows, actual = output.len(), "output length mismatch");
        return Check {
            sampled: 0,
            max_rel_err: UNBOUNDED,
            passed: false,
        };
    }

    let indices: Vec<usize> = if samples >= rows {
        (0..rows).collect()
    } else {
        rand::seq::index::sample(rng, rows, samples).into_vec()
    };

    let mut max_rel_err = 0.0f64;
    for &i in &indices {
        let expected = euclidean_square(i, &dataset.query, &dataset.matrix) as f64;
        let actual = output[i] as f64;
        let rel = (actual - expected).abs() / expected.abs().max(1.0);
        // NaN compares false; treat it as a failure
        if rel.is_nan() {
            max_rel_err = UNBOUNDED;
        } else if rel > max_rel_err {
            max_rel_err = rel;
        }
    }

    let passed = max_rel_err < TOLERANCE;
    if !passed {
        warn!(max_rel_err, sampled = indices.len(), "VERIFY FAIL");
    }
    Check {
        sampled: indices.len(),
        max_rel_err,
        passed,
    }
}
