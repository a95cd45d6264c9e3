//! Method-style construction of graph operations.
//!
//! [`TensorGraph`] wraps [`Graph::apply_op`] so that models and
//! regularizers can be written as ordinary expressions over node ids.

use crate::graph::{Graph, NodeId};
use crate::ops::{
    Abs, Add, AddScalar, Divide, Exp, Log, Mean, Multiply, Narrow, Negate, Pow, ReLU, Reshape,
    Roll, Scale, Select, Sigmoid, Softplus, Square, Stack, Subtract, Sum, Tanh,
};
use mei_core::{Result, Scalar, Tensor};

/// Extension trait for [`Graph`] adding tensor operations.
pub trait TensorGraph<T: Scalar> {
    /// Element-wise `a + b`.
    fn add(&self, a: NodeId, b: NodeId) -> Result<NodeId>;
    /// Element-wise `a - b`.
    fn sub(&self, a: NodeId, b: NodeId) -> Result<NodeId>;
    /// Element-wise `a * b`.
    fn mul(&self, a: NodeId, b: NodeId) -> Result<NodeId>;
    /// Element-wise `a / b`.
    fn div(&self, a: NodeId, b: NodeId) -> Result<NodeId>;
    /// Multiplies by a constant.
    fn scale(&self, x: NodeId, factor: T) -> Result<NodeId>;
    /// Adds a constant to every element.
    fn add_scalar(&self, x: NodeId, value: T) -> Result<NodeId>;
    /// Element-wise negation.
    fn neg(&self, x: NodeId) -> Result<NodeId>;
    /// Element-wise power.
    fn pow(&self, x: NodeId, exponent: T) -> Result<NodeId>;
    /// Element-wise square.
    fn square(&self, x: NodeId) -> Result<NodeId>;
    /// Element-wise exponential.
    fn exp(&self, x: NodeId) -> Result<NodeId>;
    /// Element-wise natural logarithm.
    fn ln(&self, x: NodeId) -> Result<NodeId>;
    /// Element-wise hyperbolic tangent.
    fn tanh(&self, x: NodeId) -> Result<NodeId>;
    /// Element-wise logistic sigmoid.
    fn sigmoid(&self, x: NodeId) -> Result<NodeId>;
    /// Element-wise rectified linear unit.
    fn relu(&self, x: NodeId) -> Result<NodeId>;
    /// Element-wise softplus.
    fn softplus(&self, x: NodeId) -> Result<NodeId>;
    /// Element-wise absolute value.
    fn abs(&self, x: NodeId) -> Result<NodeId>;
    /// Sum of all elements.
    fn sum(&self, x: NodeId) -> Result<NodeId>;
    /// Mean of all elements.
    fn mean(&self, x: NodeId) -> Result<NodeId>;
    /// One element by flat index.
    fn select(&self, x: NodeId, index: usize) -> Result<NodeId>;
    /// Stacks single-element nodes into a vector.
    fn stack(&self, xs: &[NodeId]) -> Result<NodeId>;
    /// Same elements under a new shape.
    fn reshape(&self, x: NodeId, shape: &[usize]) -> Result<NodeId>;
    /// Slice along one axis.
    fn narrow(&self, x: NodeId, axis: usize, start: usize, len: usize) -> Result<NodeId>;
    /// Circular shift along one axis.
    fn roll(&self, x: NodeId, axis: usize, shift: isize) -> Result<NodeId>;
    /// Inner product of two nodes of the same shape.
    fn dot(&self, a: NodeId, b: NodeId) -> Result<NodeId>;
    /// Inner product with a constant tensor.
    fn dot_constant(&self, x: NodeId, weights: &Tensor<T>) -> Result<NodeId>;
}

impl<T: Scalar> TensorGraph<T> for Graph<T> {
    fn add(&self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Add), &[a, b])
    }

    fn sub(&self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Subtract), &[a, b])
    }

    fn mul(&self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Multiply), &[a, b])
    }

    fn div(&self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Divide), &[a, b])
    }

    fn scale(&self, x: NodeId, factor: T) -> Result<NodeId> {
        self.apply_op(Box::new(Scale::new(factor)), &[x])
    }

    fn add_scalar(&self, x: NodeId, value: T) -> Result<NodeId> {
        self.apply_op(Box::new(AddScalar::new(value)), &[x])
    }

    fn neg(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Negate), &[x])
    }

    fn pow(&self, x: NodeId, exponent: T) -> Result<NodeId> {
        self.apply_op(Box::new(Pow::new(exponent)), &[x])
    }

    fn square(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Square), &[x])
    }

    fn exp(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Exp), &[x])
    }

    fn ln(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Log), &[x])
    }

    fn tanh(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Tanh), &[x])
    }

    fn sigmoid(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Sigmoid), &[x])
    }

    fn relu(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(ReLU), &[x])
    }

    fn softplus(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Softplus), &[x])
    }

    fn abs(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Abs), &[x])
    }

    fn sum(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Sum), &[x])
    }

    fn mean(&self, x: NodeId) -> Result<NodeId> {
        self.apply_op(Box::new(Mean), &[x])
    }

    fn select(&self, x: NodeId, index: usize) -> Result<NodeId> {
        self.apply_op(Box::new(Select::new(index)), &[x])
    }

    fn stack(&self, xs: &[NodeId]) -> Result<NodeId> {
        self.apply_op(Box::new(Stack), xs)
    }

    fn reshape(&self, x: NodeId, shape: &[usize]) -> Result<NodeId> {
        self.apply_op(Box::new(Reshape::new(shape)), &[x])
    }

    fn narrow(&self, x: NodeId, axis: usize, start: usize, len: usize) -> Result<NodeId> {
        self.apply_op(Box::new(Narrow::new(axis, start, len)), &[x])
    }

    fn roll(&self, x: NodeId, axis: usize, shift: isize) -> Result<NodeId> {
        self.apply_op(Box::new(Roll::new(axis, shift)), &[x])
    }

    fn dot(&self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let prod = self.mul(a, b)?;
        self.sum(prod)
    }

    fn dot_constant(&self, x: NodeId, weights: &Tensor<T>) -> Result<NodeId> {
        let w = self.constant(weights.clone());
        self.dot(x, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::grad;

    #[test]
    fn test_dot_constant() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_vec(vec![3], vec![1.0_f64, 2.0, 3.0]).unwrap());
        let w = Tensor::from_vec(vec![3], vec![0.5, -1.0, 2.0]).unwrap();
        let y = graph.dot_constant(x.id, &w).unwrap();

        assert_eq!(graph.scalar_value(y).unwrap(), 4.5);
        let g = grad(&graph, y, &[x.id]).unwrap();
        assert_eq!(g[0], w);
    }

    #[test]
    fn test_stack_of_selections() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_vec(vec![2, 2], vec![1.0_f64, 2.0, 3.0, 4.0]).unwrap());
        let a = graph.select(x.id, 0).unwrap();
        let b = graph.select(x.id, 3).unwrap();
        let v = graph.stack(&[a, b]).unwrap();
        assert_eq!(graph.value(v).unwrap().as_slice(), &[1.0, 4.0]);

        let picked = graph.select(v, 1).unwrap();
        let g = grad(&graph, picked, &[x.id]).unwrap();
        assert_eq!(g[0].as_slice(), &[0.0, 0.0, 0.0, 1.0]);
    }
}
