//! Dense n-dimensional tensors.
//!
//! A [`Tensor`] is a row-major array with an arbitrary shape, stored as a
//! flat `nalgebra` vector. MEI candidates are typically laid out as
//! `[batch, channel, (depth,) height, width]`; the helpers in this module
//! (`fill_index`, `narrow`, `roll`, `squeeze_batch`) operate on that layout
//! without assuming a fixed rank.
//!
//! Shape-changing and binary operations return [`Result`] and report
//! incompatible shapes as [`MeiError::DimensionMismatch`].

use crate::error::{MeiError, Result};
use crate::types::{DVector, Scalar};
use num_traits::Float;
use rand::RngCore;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;

/// A dense n-dimensional array of scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T: Scalar> {
    shape: Vec<usize>,
    data: DVector<T>,
}

fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

fn shape_string(shape: &[usize]) -> String {
    format!("{:?}", shape)
}

impl<T: Scalar> Tensor<T> {
    /// Creates a tensor filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_element(shape, T::zero())
    }

    /// Creates a tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::from_element(shape, T::one())
    }

    /// Creates a tensor with every entry set to `value`.
    pub fn from_element(shape: &[usize], value: T) -> Self {
        Self {
            shape: shape.to_vec(),
            data: DVector::from_element(numel(shape), value),
        }
    }

    /// Creates a 0-dimensional tensor holding a single value.
    pub fn scalar(value: T) -> Self {
        Self::from_element(&[], value)
    }

    /// Creates a tensor from row-major data.
    pub fn from_vec(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        let expected = numel(&shape);
        if expected != data.len() {
            return Err(MeiError::dimension_mismatch(
                format!("{} elements for shape {}", expected, shape_string(&shape)),
                format!("{} elements", data.len()),
            ));
        }
        Ok(Self {
            shape,
            data: DVector::from_vec(data),
        })
    }

    /// Creates a tensor whose entries are produced from their flat index.
    pub fn from_fn<F: FnMut(usize) -> T>(shape: &[usize], mut f: F) -> Self {
        let n = numel(shape);
        Self {
            shape: shape.to_vec(),
            data: DVector::from_iterator(n, (0..n).map(&mut f)),
        }
    }

    /// Draws a tensor with i.i.d. standard normal entries.
    pub fn random_normal(shape: &[usize], rng: &mut dyn RngCore) -> Self {
        Self::from_fn(shape, |_| T::sample_standard_normal(&mut *rng))
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the flat storage.
    pub fn data(&self) -> &DVector<T> {
        &self.data
    }

    /// Returns the elements in row-major order.
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    /// Returns the elements in row-major order, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    /// Consumes the tensor and returns its row-major elements.
    pub fn into_vec(self) -> Vec<T> {
        self.data.as_slice().to_vec()
    }

    /// Returns the single value of a one-element tensor.
    pub fn item(&self) -> Result<T> {
        if self.data.len() != 1 {
            return Err(MeiError::dimension_mismatch(
                "a single-element tensor",
                shape_string(&self.shape),
            ));
        }
        Ok(self.data[0])
    }

    /// Row-major strides of the tensor, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        for axis in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.shape[axis + 1];
        }
        strides
    }

    /// Checks that `other` has exactly the same shape.
    pub fn check_same_shape(&self, other: &Self) -> Result<()> {
        if self.shape != other.shape {
            return Err(MeiError::dimension_mismatch(
                shape_string(&self.shape),
                shape_string(&other.shape),
            ));
        }
        Ok(())
    }

    fn check_axis(&self, axis: usize) -> Result<()> {
        if axis >= self.shape.len() {
            return Err(MeiError::dimension_mismatch(
                format!("a tensor with more than {} axes", axis),
                shape_string(&self.shape),
            ));
        }
        Ok(())
    }

    /// Elements per step along `axis` (product of the trailing extents).
    fn inner_size(&self, axis: usize) -> usize {
        numel(&self.shape[axis + 1..])
    }

    /// Returns a tensor with the same data and a new shape.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        if numel(shape) != self.len() {
            return Err(MeiError::dimension_mismatch(
                format!("a shape with {} elements", self.len()),
                shape_string(shape),
            ));
        }
        Ok(Self {
            shape: shape.to_vec(),
            data: self.data.clone(),
        })
    }

    /// Removes every axis of extent 1.
    pub fn squeeze(&self) -> Self {
        Self {
            shape: self.shape.iter().copied().filter(|&d| d != 1).collect(),
            data: self.data.clone(),
        }
    }

    /// Removes `axis`, which must have extent 1.
    pub fn squeeze_axis(&self, axis: usize) -> Result<Self> {
        self.check_axis(axis)?;
        if self.shape[axis] != 1 {
            return Err(MeiError::dimension_mismatch(
                format!("extent 1 on axis {}", axis),
                shape_string(&self.shape),
            ));
        }
        let mut shape = self.shape.clone();
        shape.remove(axis);
        Ok(Self {
            shape,
            data: self.data.clone(),
        })
    }

    /// Removes a leading batch axis of extent 1, leaving other tensors untouched.
    pub fn squeeze_batch(self) -> Self {
        if self.shape.first() != Some(&1) {
            return self;
        }
        Self {
            shape: self.shape[1..].to_vec(),
            data: self.data,
        }
    }

    /// Sets every entry whose coordinate along `axis` equals `index` to `value`.
    pub fn fill_index(&mut self, axis: usize, index: usize, value: T) -> Result<()> {
        self.check_axis(axis)?;
        let extent = self.shape[axis];
        if index >= extent {
            return Err(MeiError::dimension_mismatch(
                format!("index below {} on axis {}", extent, axis),
                index,
            ));
        }
        let inner = self.inner_size(axis);
        for (i, v) in self.data.iter_mut().enumerate() {
            if (i / inner) % extent == index {
                *v = value;
            }
        }
        Ok(())
    }

    /// Returns the sub-tensor `start..start + len` along `axis`.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Self> {
        self.check_axis(axis)?;
        let extent = self.shape[axis];
        if start + len > extent {
            return Err(MeiError::dimension_mismatch(
                format!("range {}..{} within extent {}", start, start + len, extent),
                shape_string(&self.shape),
            ));
        }
        let inner = self.inner_size(axis);
        let mut shape = self.shape.clone();
        shape[axis] = len;
        let source = &self.data;
        Ok(Self::from_fn(&shape, |i| {
            let outer = i / (len * inner);
            let a = (i / inner) % len;
            let r = i % inner;
            source[outer * extent * inner + (start + a) * inner + r]
        }))
    }

    /// Adds `values` into the `start..start + values.shape[axis]` range along `axis`.
    ///
    /// This is the adjoint of [`Tensor::narrow`].
    pub fn add_narrowed(&mut self, axis: usize, start: usize, values: &Self) -> Result<()> {
        self.check_axis(axis)?;
        let len = values.shape.get(axis).copied().unwrap_or(0);
        let mut expected = self.shape.clone();
        expected[axis] = len;
        if values.shape != expected || start + len > self.shape[axis] {
            return Err(MeiError::dimension_mismatch(
                shape_string(&expected),
                shape_string(&values.shape),
            ));
        }
        let extent = self.shape[axis];
        let inner = self.inner_size(axis);
        for (i, v) in values.data.iter().enumerate() {
            let outer = i / (len * inner);
            let a = (i / inner) % len;
            let r = i % inner;
            self.data[outer * extent * inner + (start + a) * inner + r] += *v;
        }
        Ok(())
    }

    /// Circularly shifts the tensor by `shift` positions along `axis`.
    pub fn roll(&self, axis: usize, shift: isize) -> Result<Self> {
        self.check_axis(axis)?;
        let extent = self.shape[axis];
        if extent == 0 {
            return Ok(self.clone());
        }
        let inner = self.inner_size(axis);
        let shift = shift.rem_euclid(extent as isize) as usize;
        let source = &self.data;
        Ok(Self::from_fn(&self.shape, |i| {
            let outer = i / (extent * inner);
            let dest = (i / inner) % extent;
            let src = (dest + extent - shift) % extent;
            source[outer * extent * inner + src * inner + i % inner]
        }))
    }

    /// Applies `f` to every element.
    pub fn map<F: FnMut(T) -> T>(&self, f: F) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.map(f),
        }
    }

    /// Applies `f` to every element in place.
    pub fn apply<F: FnMut(&mut T)>(&mut self, f: F) {
        self.data.iter_mut().for_each(f);
    }

    /// Combines two tensors of the same shape element by element.
    pub fn zip_map<F: FnMut(T, T) -> T>(&self, other: &Self, mut f: F) -> Result<Self> {
        self.check_same_shape(other)?;
        Ok(Self {
            shape: self.shape.clone(),
            data: self.data.zip_map(&other.data, |a, b| f(a, b)),
        })
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a + b)
    }

    /// Element-wise difference.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a - b)
    }

    /// Element-wise product.
    pub fn component_mul(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a * b)
    }

    /// Adds `alpha * other` in place.
    pub fn axpy(&mut self, alpha: T, other: &Self) -> Result<()> {
        self.check_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += alpha * *b;
        }
        Ok(())
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: T) -> Self {
        self.map(|v| v * factor)
    }

    /// Multiplies every element by `factor` in place.
    pub fn scale_mut(&mut self, factor: T) {
        self.apply(|v| *v *= factor);
    }

    /// Sum of all elements.
    pub fn sum(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &v| acc + v)
    }

    /// Mean of all elements (zero for an empty tensor).
    pub fn mean(&self) -> T {
        if self.is_empty() {
            return T::zero();
        }
        self.sum() / <T as Scalar>::from_usize(self.len())
    }

    /// Inner product with a tensor of the same shape.
    pub fn dot(&self, other: &Self) -> Result<T> {
        self.check_same_shape(other)?;
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .fold(T::zero(), |acc, (&a, &b)| acc + a * b))
    }

    /// Euclidean norm of the flattened tensor.
    pub fn norm(&self) -> T {
        let sq = self.data.iter().fold(T::zero(), |acc, &v| acc + v * v);
        <T as Float>::sqrt(sq)
    }

    /// Largest element (negative infinity for an empty tensor).
    pub fn max(&self) -> T {
        self.data
            .iter()
            .fold(<T as Float>::neg_infinity(), |acc, &v| <T as Float>::max(acc, v))
    }

    /// Smallest element (positive infinity for an empty tensor).
    pub fn min(&self) -> T {
        self.data
            .iter()
            .fold(<T as Float>::infinity(), |acc, &v| <T as Float>::min(acc, v))
    }

    /// Clamps every element into `[lower, upper]`.
    pub fn clamp_mut(&mut self, lower: T, upper: T) {
        self.apply(|v| {
            if *v < lower {
                *v = lower;
            } else if *v > upper {
                *v = upper;
            }
        });
    }

    /// Returns true if every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| <T as Float>::is_finite(*v))
    }
}

impl<T: Scalar> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={:?}, numel={})", self.shape, self.len())
    }
}

impl<T: Scalar + Serialize> Serialize for Tensor<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Tensor", 2)?;
        state.serialize_field("shape", &self.shape)?;
        state.serialize_field("data", self.data.as_slice())?;
        state.end()
    }
}

impl<'de, T: Scalar + Deserialize<'de>> Deserialize<'de> for Tensor<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Repr<T> {
            shape: Vec<usize>,
            data: Vec<T>,
        }

        let repr = Repr::<T>::deserialize(deserializer)?;
        Tensor::from_vec(repr.shape, repr.data).map_err(serde::de::Error::custom)
    }
}
