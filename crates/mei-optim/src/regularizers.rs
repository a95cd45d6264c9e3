//! Built-in regularizations.
//!
//! Each penalty is a single-element node that the ascent loop subtracts
//! from the model response.

use crate::strategy::Regularization;
use mei_autodiff::{Graph, NodeId, TensorGraph};
use mei_core::{MeiError, Result, Scalar};

/// `weight * Σ x²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L2Penalty<T: Scalar> {
    /// Penalty weight
    pub weight: T,
}

impl<T: Scalar> L2Penalty<T> {
    /// Creates the penalty.
    pub fn new(weight: T) -> Self {
        Self { weight }
    }
}

impl<T: Scalar> Regularization<T> for L2Penalty<T> {
    fn apply(&self, graph: &Graph<T>, x: NodeId, _iteration: usize) -> Result<NodeId> {
        let sq = graph.square(x)?;
        let total = graph.sum(sq)?;
        graph.scale(total, self.weight)
    }
}

/// Anisotropic total variation over the last two axes:
/// `weight * (Σ |x[i+1, j] - x[i, j]| + Σ |x[i, j+1] - x[i, j]|)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TotalVariation<T: Scalar> {
    /// Penalty weight
    pub weight: T,
}

impl<T: Scalar> TotalVariation<T> {
    /// Creates the penalty.
    pub fn new(weight: T) -> Self {
        Self { weight }
    }

    fn axis_variation(graph: &Graph<T>, x: NodeId, axis: usize, extent: usize) -> Result<NodeId> {
        let next = graph.narrow(x, axis, 1, extent - 1)?;
        let current = graph.narrow(x, axis, 0, extent - 1)?;
        let diff = graph.sub(next, current)?;
        let magnitude = graph.abs(diff)?;
        graph.sum(magnitude)
    }
}

impl<T: Scalar> Regularization<T> for TotalVariation<T> {
    fn apply(&self, graph: &Graph<T>, x: NodeId, _iteration: usize) -> Result<NodeId> {
        let shape = graph.shape(x)?;
        let ndim = shape.len();
        if ndim < 2 {
            return Err(MeiError::dimension_mismatch(
                "an input with at least two axes",
                format!("{:?}", shape),
            ));
        }

        let mut terms = Vec::with_capacity(2);
        for axis in [ndim - 2, ndim - 1] {
            if shape[axis] > 1 {
                terms.push(Self::axis_variation(graph, x, axis, shape[axis])?);
            }
        }
        let total = match terms.as_slice() {
            [] => {
                let zero = graph.scale(x, T::zero())?;
                graph.sum(zero)?
            }
            [single] => *single,
            [vertical, horizontal, ..] => graph.add(*vertical, *horizontal)?,
        };
        graph.scale(total, self.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mei_autodiff::grad;
    use mei_core::Tensor;

    #[test]
    fn test_l2_penalty() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_vec(vec![1, 3], vec![1.0_f64, -2.0, 2.0]).unwrap());
        let p = L2Penalty::new(0.5).apply(&graph, x.id, 0).unwrap();
        assert_relative_eq!(graph.scalar_value(p).unwrap(), 4.5);

        let g = grad(&graph, p, &[x.id]).unwrap();
        assert_eq!(g[0].as_slice(), &[1.0, -2.0, 2.0]);
    }

    #[test]
    fn test_total_variation_of_constant_is_zero() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_element(&[1, 1, 3, 3], 0.7_f64));
        let p = TotalVariation::new(1.0).apply(&graph, x.id, 0).unwrap();
        assert_relative_eq!(graph.scalar_value(p).unwrap(), 0.0);
    }

    #[test]
    fn test_total_variation_value() {
        // [[0, 1], [3, 3]]: vertical |3-0| + |3-1| = 5, horizontal |1-0| + |3-3| = 1
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_vec(vec![1, 2, 2], vec![0.0_f64, 1.0, 3.0, 3.0]).unwrap());
        let p = TotalVariation::new(2.0).apply(&graph, x.id, 0).unwrap();
        assert_relative_eq!(graph.scalar_value(p).unwrap(), 12.0);
    }

    #[test]
    fn test_total_variation_single_pixel() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_element(&[1, 1, 1, 1], 3.0_f64));
        let p = TotalVariation::new(1.0).apply(&graph, x.id, 0).unwrap();
        assert_eq!(graph.scalar_value(p).unwrap(), 0.0);
    }
}
