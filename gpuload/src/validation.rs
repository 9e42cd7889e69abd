use gpuload_types::Shape;
use crate::{BenchConfig, Error};

pub fn validate(cfg: &BenchConfig) -> Result<(), Error> {
    validate_shape(cfg.shape)?;

    if cfg.backends.is_empty() {
        return Err(Error::InvalidConfig("No backends selected".into()));
    }

    Ok(())
}

pub(crate) fn validate_shape(shape: Shape) -> Result<(), Error> {
    // Kernels index rows with 32-bit invocation ids
    if shape.rows > u32::MAX as usize {
        return Err(Error::InvalidConfig(format!(
            "{} rows exceeds the 32-bit index space",
            shape.rows
        )));
    }

    if shape.dims > u32::MAX as usize {
        return Err(Error::InvalidConfig(format!(
            "{} dimensions exceeds the 32-bit index space",
            shape.dims
        )));
    }

    let elements = shape.elements().ok_or_else(|| {
        Error::InvalidConfig(format!("{}x{} matrix overflows", shape.rows, shape.dims))
    })?;
    if elements > u32::MAX as usize || shape.matrix_bytes().is_none() {
        return Err(Error::InvalidConfig(format!(
            "{}x{} matrix exceeds the 32-bit element index space",
            shape.rows, shape.dims
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&BenchConfig::default()).is_ok());
    }

    #[test]
    fn empty_and_single_row_shapes_are_valid() {
        assert!(validate_shape(Shape::new(0, 50)).is_ok());
        assert!(validate_shape(Shape::new(1, 3)).is_ok());
        assert!(validate_shape(Shape::new(4, 0)).is_ok());
    }

    #[test]
    fn oversized_shapes_are_rejected() {
        assert!(matches!(
            validate_shape(Shape::new(u32::MAX as usize + 1, 1)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            validate_shape(Shape::new(100_000_000, 50)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn no_backends_is_rejected() {
        let cfg = BenchConfig {
            backends: vec![],
            ..Default::default()
        };
        assert!(matches!(validate(&cfg), Err(Error::InvalidConfig(_))));
    }
}
