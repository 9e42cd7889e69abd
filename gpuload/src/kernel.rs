//! The squared-Euclidean-distance kernel in its three forms: a host function
//! over index space, a WGSL compute shader and CUDA C for NVRTC.
//!
//! All three accumulate in the same order, `sum += (q[j] - m[i][j])^2` for
//! `j` ascending, so device results only differ from the host by
//! float rounding (FMA contraction on the device).

use crate::Matrix;

/// Invocations per workgroup (WGSL) and threads per block (CUDA).
pub const WORKGROUP_SIZE: u32 = 64;

pub const ENTRY_POINT: &str = "euclidean_square";

pub fn squared_distance(query: &[f32], row: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for (q, m) in query.iter().zip(row) {
        let diff = q - m;
        sum += diff * diff;
    }
    sum
}

/// One work item: the squared distance between `query` and row `index`.
pub fn euclidean_square(index: usize, query: &[f32], matrix: &Matrix) -> f32 {
    squared_distance(query, matrix.row(index))
}

/// Host evaluation over the whole index range.
pub fn euclidean_square_all(query: &[f32], matrix: &Matrix) -> Vec<f32> {
    (0..matrix.rows())
        .map(|i| euclidean_square(i, query, matrix))
        .collect()
}

/// Kernel parameters, laid out to match the WGSL `Params` uniform.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Params {
    pub rows: u32,
    pub dims: u32,
    /// Invocations per grid row: `groups_x * WORKGROUP_SIZE`.
    pub stride: u32,
    pub _pad: u32,
}

/// Workgroup grid covering `rows` invocations. When the 1-D count exceeds
/// `max_per_dim` the grid folds into `(max_per_dim, y)`.
pub fn dispatch_grid(rows: u32, max_per_dim: u32) -> (u32, u32) {
    let groups = rows.div_ceil(WORKGROUP_SIZE);
    if groups <= max_per_dim {
        (groups, 1)
    } else {
        (max_per_dim, groups.div_ceil(max_per_dim))
    }
}

pub const WGSL_EUCLIDEAN_SQUARE: &str = r#"
struct Params {
    rows: u32,
    dims: u32,
    stride: u32,
    _pad: u32,
}

@group(0) @binding(0) var<storage, read> matrix: array<f32>;
@group(0) @binding(1) var<storage, read> query: array<f32>;
@group(0) @binding(2) var<storage, read_write> output: array<f32>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(64)
fn euclidean_square(@builtin(global_invocation_id) gid: vec3<u32>) {
    let row = gid.y * params.stride + gid.x;
    if (row >= params.rows) { return; }
    let base = row * params.dims;
    var sum: f32 = 0.0;
    for (var j: u32 = 0u; j < params.dims; j = j + 1u) {
        let diff = query[j] - matrix[base + j];
        sum = sum + diff * diff;
    }
    output[row] = sum;
}
"#;

#[cfg(feature = "cuda")]
pub const CUDA_EUCLIDEAN_SQUARE: &str = r#"
extern "C" __global__ void euclidean_square(
    const float* matrix,
    const float* query,
    float* output,
    unsigned int rows,
    unsigned int dims)
{
    unsigned int row = blockIdx.x * blockDim.x + threadIdx.x;
    if (row >= rows) {
        return;
    }
    const float* point = matrix + (size_t)row * dims;
    float sum = 0.0f;
    for (unsigned int j = 0; j < dims; ++j) {
        float diff = query[j] - point[j];
        sum += diff * diff;
    }
    output[row] = sum;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pythagorean_rows() {
        let m = Matrix::from_rows(&[vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(euclidean_square_all(&[0.0, 0.0], &m), vec![0.0, 25.0]);
    }

    #[test]
    fn identical_point_is_zero() {
        let m = Matrix::from_rows(&[vec![1.0, 1.0, 1.0]]).unwrap();
        assert_eq!(euclidean_square_all(&[1.0, 1.0, 1.0], &m), vec![0.0]);
    }

    #[test]
    fn empty_matrix_has_empty_output() {
        let m = Matrix::from_vec(0, 4, vec![]).unwrap();
        assert!(euclidean_square_all(&[0.0; 4], &m).is_empty());
    }

    #[test]
    fn zero_dims_distance_is_zero() {
        assert_eq!(squared_distance(&[], &[]), 0.0);
    }

    #[test]
    fn grid_stays_one_dimensional_under_limit() {
        // 500_000 / 64 rounds up to 7813 workgroups
        assert_eq!(dispatch_grid(500_000, 65_535), (7_813, 1));
        assert_eq!(dispatch_grid(64, 65_535), (1, 1));
        assert_eq!(dispatch_grid(65, 65_535), (2, 1));
        assert_eq!(dispatch_grid(0, 65_535), (0, 1));
    }

    #[test]
    fn grid_folds_past_the_per_dimension_limit() {
        let rows = 10_000_000;
        let (x, y) = dispatch_grid(rows, 65_535);
        assert_eq!(x, 65_535);
        assert_eq!(y, 3);
        assert!(x as u64 * y as u64 * WORKGROUP_SIZE as u64 >= rows as u64);
    }

    #[test]
    fn params_match_uniform_layout() {
        assert_eq!(std::mem::size_of::<Params>(), 16);
    }

    #[test]
    fn shader_entry_point_is_declared() {
        assert!(WGSL_EUCLIDEAN_SQUARE.contains(&format!("fn {ENTRY_POINT}(")));
        assert!(WGSL_EUCLIDEAN_SQUARE.contains(&format!("@workgroup_size({WORKGROUP_SIZE})")));
    }
}
