//! Duplicable Values
//!
//! Everything stored in or read from the cache implements [`Duplicable`]:
//! it exposes its content through `value()` and can produce a deep copy of
//! itself through `duplicate()`. The cache never looks inside a value.
//!
//! Values are shared between snapshots as [`DuplicableValue`]
//! (`Arc<dyn Duplicable>`). Nothing hands out mutable access to a stored
//! value, so sharing is safe across threads.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{CacheError, Result};

/// A shared, immutable value held by a cache node.
pub type DuplicableValue = Arc<dyn Duplicable>;

/// Contract for values stored in the cache.
pub trait Duplicable: Any + Send + Sync + Debug {
    /// The wrapped content, for callers that know its concrete type.
    fn value(&self) -> &dyn Any;

    /// A deep copy of this value.
    fn duplicate(&self) -> DuplicableValue;
}

impl dyn Duplicable {
    /// Downcast the wrapped content to `T`.
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.value().downcast_ref::<T>()
    }
}

/// A scalar wrapper. `value()` yields the bare `T`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicableNumber<T>(T);

impl<T> DuplicableNumber<T>
where
    T: Copy + Send + Sync + Debug + 'static,
{
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Wrap `value` and share it, ready to hand to the cache.
    pub fn shared(value: T) -> DuplicableValue {
        Arc::new(Self(value))
    }

    pub fn get(&self) -> T {
        self.0
    }
}

impl<T> Duplicable for DuplicableNumber<T>
where
    T: Copy + Send + Sync + Debug + 'static,
{
    fn value(&self) -> &dyn Any {
        &self.0
    }

    fn duplicate(&self) -> DuplicableValue {
        Arc::new(Self(self.0))
    }
}

/// A dense row-major array of `f64`. `value()` yields the array itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicableArray {
    shape: SmallVec<[usize; 4]>,
    data: Vec<f64>,
}

impl DuplicableArray {
    /// Build an array from a shape and row-major data.
    pub fn from_shape_vec(shape: &[usize], data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(CacheError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape: SmallVec::from_slice(shape),
            data,
        })
    }

    /// A one-dimensional array.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: SmallVec::from_slice(&[data.len()]),
            data,
        }
    }

    pub fn filled(shape: &[usize], value: f64) -> Self {
        Self {
            shape: SmallVec::from_slice(shape),
            data: vec![value; shape.iter().product()],
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::filled(shape, 0.0)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Share this array, ready to hand to the cache.
    pub fn into_shared(self) -> DuplicableValue {
        Arc::new(self)
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two arrays of identical shape element by element.
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Result<Self> {
        if self.shape != other.shape {
            return Err(CacheError::ShapeMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        Ok(Self {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }
}

impl Duplicable for DuplicableArray {
    fn value(&self) -> &dyn Any {
        self
    }

    fn duplicate(&self) -> DuplicableValue {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_exposes_bare_value() {
        let value = DuplicableNumber::shared(2.5f64);
        assert_eq!(value.value_as::<f64>(), Some(&2.5));
        assert_eq!(value.value_as::<i32>(), None);
    }

    #[test]
    fn duplicate_is_a_distinct_allocation() {
        let original = DuplicableArray::from_vec(vec![1.0, 2.0, 3.0]).into_shared();
        let copy = original.duplicate();

        assert!(!Arc::ptr_eq(&original, &copy));
        assert_eq!(
            original.value_as::<DuplicableArray>(),
            copy.value_as::<DuplicableArray>()
        );
    }

    #[test]
    fn shape_must_match_data() {
        let err = DuplicableArray::from_shape_vec(&[2, 3], vec![0.0; 5]).unwrap_err();
        assert_eq!(err, CacheError::ShapeMismatch { expected: 6, actual: 5 });

        let ok = DuplicableArray::from_shape_vec(&[2, 3], vec![1.0; 6]).unwrap();
        assert_eq!(ok.shape(), &[2, 3]);
        assert_eq!(ok.sum(), 6.0);
    }

    #[test]
    fn elementwise_arithmetic() {
        let a = DuplicableArray::from_vec(vec![1.0, 2.0]);
        let b = DuplicableArray::from_vec(vec![3.0, 4.0]);

        assert_eq!(a.add(&b).unwrap().data(), &[4.0, 6.0]);
        assert_eq!(a.sub(&b).unwrap().data(), &[-2.0, -2.0]);
        assert_eq!(a.mul(&b).unwrap().data(), &[3.0, 8.0]);
        assert_eq!(a.map(|v| v * 10.0).data(), &[10.0, 20.0]);
    }

    #[test]
    fn mismatched_shapes_do_not_combine() {
        let a = DuplicableArray::zeros(&[2, 2]);
        let b = DuplicableArray::zeros(&[4]);
        assert!(a.add(&b).is_err());
    }
}
