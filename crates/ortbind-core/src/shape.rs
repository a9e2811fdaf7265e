use std::fmt;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Largest dimension a host value may declare.
pub const MAX_DIMENSION: u64 = u32::MAX as u64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }

    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Product of all dimensions; 1 for a scalar, 0 if any dimension is 0.
    pub fn element_count(&self) -> Result<usize> {
        element_count(&self.0)
    }

    /// Converts engine-reported dims. Negative (symbolic) dims are rejected here because a
    /// concrete tensor must have a concrete shape.
    pub fn from_native(dims: &[i64]) -> Result<Self> {
        let mut shape = SmallVec::with_capacity(dims.len());
        for (idx, &dim) in dims.iter().enumerate() {
            let dim = usize::try_from(dim)
                .map_err(|_| Error::InvalidShape(format!("dims[{idx}] = {dim} is negative")))?;
            shape.push(dim);
        }
        let shape = Self(shape);
        shape.element_count()?;
        Ok(shape)
    }

    pub fn to_native(&self) -> Vec<i64> {
        self.0.iter().map(|&d| d as i64).collect()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, dim) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

pub fn element_count(dims: &[usize]) -> Result<usize> {
    dims.iter().try_fold(1usize, |acc, &dim| {
        acc.checked_mul(dim).ok_or_else(|| {
            Error::InvalidShape(format!("element count of {dims:?} overflows"))
        })
    })
}

/// Validates host-supplied dimensions.
///
/// Host numbers are doubles, so each dimension must be finite, integral, non-negative and
/// no larger than [`MAX_DIMENSION`]; the product must fit in `usize`.
pub fn validate_dims(dims: &[f64]) -> Result<Shape> {
    let mut shape = SmallVec::with_capacity(dims.len());
    for (idx, &dim) in dims.iter().enumerate() {
        if !dim.is_finite() || dim.fract() != 0.0 {
            return Err(Error::InvalidShape(format!(
                "dims[{idx}] = {dim} is not an integer"
            )));
        }
        if dim < 0.0 {
            return Err(Error::InvalidShape(format!("dims[{idx}] = {dim} is negative")));
        }
        if dim > MAX_DIMENSION as f64 {
            return Err(Error::InvalidShape(format!(
                "dims[{idx}] = {dim} exceeds {MAX_DIMENSION}"
            )));
        }
        shape.push(dim as usize);
    }
    let shape = Shape(shape);
    shape.element_count()?;
    Ok(shape)
}
