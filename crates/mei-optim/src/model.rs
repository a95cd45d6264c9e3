//! The contract between the optimizer and the model being maximized.

use mei_autodiff::{Graph, NodeId};
use mei_core::{Result, Scalar};
use std::fmt;
use std::sync::Arc;

/// A differentiable map from an input tensor to a single response.
///
/// `evaluate` records the model computation on `graph`, starting from the
/// `input` node, and returns the node holding the response. The response
/// must have exactly one element.
pub trait DifferentiableFunction<T: Scalar> {
    /// Builds the response node for `input`.
    fn evaluate(&self, graph: &Graph<T>, input: NodeId) -> Result<NodeId>;
}

impl<T: Scalar, M: DifferentiableFunction<T> + ?Sized> DifferentiableFunction<T> for &M {
    fn evaluate(&self, graph: &Graph<T>, input: NodeId) -> Result<NodeId> {
        (**self).evaluate(graph, input)
    }
}

impl<T: Scalar, M: DifferentiableFunction<T> + ?Sized> DifferentiableFunction<T> for Box<M> {
    fn evaluate(&self, graph: &Graph<T>, input: NodeId) -> Result<NodeId> {
        (**self).evaluate(graph, input)
    }
}

impl<T: Scalar, M: DifferentiableFunction<T> + ?Sized> DifferentiableFunction<T> for Arc<M> {
    fn evaluate(&self, graph: &Graph<T>, input: NodeId) -> Result<NodeId> {
        (**self).evaluate(graph, input)
    }
}

/// A closure-backed model.
pub struct FnModel<F> {
    f: F,
}

impl<F> FnModel<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnModel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnModel")
    }
}

impl<T, F> DifferentiableFunction<T> for FnModel<F>
where
    T: Scalar,
    F: Fn(&Graph<T>, NodeId) -> Result<NodeId>,
{
    fn evaluate(&self, graph: &Graph<T>, input: NodeId) -> Result<NodeId> {
        (self.f)(graph, input)
    }
}
