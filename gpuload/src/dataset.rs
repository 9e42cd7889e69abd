use gpuload_types::Shape;
use rand::Rng;
use tracing::{debug, info_span};

use crate::validation::validate_shape;
use crate::Error;

/// Dense row-major `f32` matrix. Each row is one reference point.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    dims: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn from_vec(rows: usize, dims: usize, data: Vec<f32>) -> Result<Self, Error> {
        let shape = Shape::new(rows, dims);
        validate_shape(shape)?;
        if Some(data.len()) != shape.elements() {
            return Err(Error::InvalidConfig(format!(
                "matrix data has {} elements, expected {}x{}",
                data.len(),
                rows,
                dims
            )));
        }
        Ok(Self { rows, dims, data })
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, Error> {
        let dims = rows.first().map_or(0, |r| r.len());
        if let Some(bad) = rows.iter().position(|r| r.len() != dims) {
            return Err(Error::InvalidConfig(format!(
                "row {} has {} elements, expected {}",
                bad,
                rows[bad].len(),
                dims
            )));
        }
        Self::from_vec(rows.len(), dims, rows.concat())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.rows, self.dims)
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dims;
        &self.data[start..start + self.dims]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Reference matrix plus the query vector compared against every row.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub matrix: Matrix,
    pub query: Vec<f32>,
}

impl Dataset {
    /// Fill a matrix and query with uniform values in [0, 1) from `rng`.
    pub fn generate<R: Rng + ?Sized>(shape: Shape, rng: &mut R) -> Result<Self, Error> {
        validate_shape(shape)?;
        let _span = info_span!("generate", rows = shape.rows, dims = shape.dims).entered();

        let elements = shape.rows * shape.dims;
        let data: Vec<f32> = (0..elements).map(|_| rng.gen::<f32>()).collect();
        let query: Vec<f32> = (0..shape.dims).map(|_| rng.gen::<f32>()).collect();
        debug!(elements, bytes = elements * 4, "dataset_generated");

        Ok(Self {
            matrix: Matrix {
                rows: shape.rows,
                dims: shape.dims,
                data,
            },
            query,
        })
    }

    /// Pair an injected matrix and query, checking their dimensions agree.
    pub fn from_parts(matrix: Matrix, query: Vec<f32>) -> Result<Self, Error> {
        if query.len() != matrix.dims() {
            return Err(Error::InvalidConfig(format!(
                "query has {} elements, matrix rows have {}",
                query.len(),
                matrix.dims()
            )));
        }
        Ok(Self { matrix, query })
    }

    pub fn shape(&self) -> Shape {
        self.matrix.shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_values_lie_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(42);
        let ds = Dataset::generate(Shape::new(1_000, 50), &mut rng).unwrap();
        assert_eq!(ds.matrix.as_slice().len(), 50_000);
        assert_eq!(ds.query.len(), 50);
        assert!(ds
            .matrix
            .as_slice()
            .iter()
            .chain(ds.query.iter())
            .all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn same_seed_same_data() {
        let a = Dataset::generate(Shape::new(64, 8), &mut StdRng::seed_from_u64(3)).unwrap();
        let b = Dataset::generate(Shape::new(64, 8), &mut StdRng::seed_from_u64(3)).unwrap();
        let c = Dataset::generate(Shape::new(64, 8), &mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rows_are_contiguous_slices() {
        let m = Matrix::from_rows(&[vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.dims(), 2);
        assert_eq!(m.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(Matrix::from_vec(2, 3, vec![0.0; 5]).is_err());

        let m = Matrix::from_vec(1, 3, vec![1.0; 3]).unwrap();
        assert!(Dataset::from_parts(m.clone(), vec![1.0; 2]).is_err());
        assert!(Dataset::from_parts(m, vec![1.0; 3]).is_ok());
    }

    #[test]
    fn zero_rows_is_an_empty_matrix() {
        let ds = Dataset::generate(Shape::new(0, 50), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(ds.matrix.rows(), 0);
        assert!(ds.matrix.as_slice().is_empty());
        assert_eq!(ds.query.len(), 50);
    }
}
