//! Pluggable functions of the gradient ascent loop.
//!
//! Four seams are exposed, each called once per iteration with the
//! 0-based iteration index:
//!
//! - [`Transform`]: differentiable map applied to the candidate before the
//!   model sees it
//! - [`Regularization`]: differentiable penalty on the untransformed
//!   candidate, subtracted from the response
//! - [`GradientFunction`]: non-differentiable preconditioner of the ascent
//!   gradient
//! - [`PostUpdate`]: non-differentiable in-place constraint applied after
//!   each step
//!
//! Closures plug in through the `Fn*` adapters.

use mei_autodiff::{Graph, NodeId};
use mei_core::{Result, Scalar, Tensor};
use std::fmt::{self, Debug};

/// Differentiable transformation of the candidate.
pub trait Transform<T: Scalar>: Debug + Send + Sync {
    /// Builds the transformed candidate from the candidate node `x`.
    fn apply(&self, graph: &Graph<T>, x: NodeId, iteration: usize) -> Result<NodeId>;
}

/// Differentiable penalty on the candidate.
pub trait Regularization<T: Scalar>: Debug + Send + Sync {
    /// Builds a single-element penalty node from the candidate node `x`.
    fn apply(&self, graph: &Graph<T>, x: NodeId, iteration: usize) -> Result<NodeId>;
}

/// Preconditioner applied to the ascent gradient.
pub trait GradientFunction<T: Scalar>: Debug + Send + Sync {
    /// Returns the preconditioned gradient. The shape must be preserved.
    fn apply(&self, gradient: Tensor<T>, iteration: usize) -> Result<Tensor<T>>;
}

/// In-place constraint applied to the candidate after each step.
pub trait PostUpdate<T: Scalar>: Debug + Send + Sync {
    /// Constrains `candidate` in place.
    fn apply(&self, candidate: &mut Tensor<T>, iteration: usize) -> Result<()>;
}

macro_rules! fn_adapter {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<F> {
            name: String,
            f: F,
        }

        impl<F> $name<F> {
            /// Wraps `f` under a display name.
            pub fn new(name: impl Into<String>, f: F) -> Self {
                Self {
                    name: name.into(),
                    f,
                }
            }

            /// The display name.
            pub fn name(&self) -> &str {
                &self.name
            }
        }

        impl<F> Debug for $name<F> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("name", &self.name)
                    .finish()
            }
        }
    };
}

fn_adapter!(
    /// Closure-backed [`Transform`].
    FnTransform
);
fn_adapter!(
    /// Closure-backed [`Regularization`].
    FnRegularization
);
fn_adapter!(
    /// Closure-backed [`GradientFunction`].
    FnGradient
);
fn_adapter!(
    /// Closure-backed [`PostUpdate`].
    FnPostUpdate
);

impl<T, F> Transform<T> for FnTransform<F>
where
    T: Scalar,
    F: Fn(&Graph<T>, NodeId, usize) -> Result<NodeId> + Send + Sync,
{
    fn apply(&self, graph: &Graph<T>, x: NodeId, iteration: usize) -> Result<NodeId> {
        (self.f)(graph, x, iteration)
    }
}

impl<T, F> Regularization<T> for FnRegularization<F>
where
    T: Scalar,
    F: Fn(&Graph<T>, NodeId, usize) -> Result<NodeId> + Send + Sync,
{
    fn apply(&self, graph: &Graph<T>, x: NodeId, iteration: usize) -> Result<NodeId> {
        (self.f)(graph, x, iteration)
    }
}

impl<T, F> GradientFunction<T> for FnGradient<F>
where
    T: Scalar,
    F: Fn(Tensor<T>, usize) -> Result<Tensor<T>> + Send + Sync,
{
    fn apply(&self, gradient: Tensor<T>, iteration: usize) -> Result<Tensor<T>> {
        (self.f)(gradient, iteration)
    }
}

impl<T, F> PostUpdate<T> for FnPostUpdate<F>
where
    T: Scalar,
    F: Fn(&mut Tensor<T>, usize) -> Result<()> + Send + Sync,
{
    fn apply(&self, candidate: &mut Tensor<T>, iteration: usize) -> Result<()> {
        (self.f)(candidate, iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mei_autodiff::TensorGraph;

    #[test]
    fn test_fn_transform() {
        let t = FnTransform::new("double", |g: &Graph<f64>, x: NodeId, _i: usize| {
            g.scale(x, 2.0)
        });
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_element(&[2], 1.5));
        let y = t.apply(&graph, x.id, 0).unwrap();
        assert_eq!(graph.value(y).unwrap().as_slice(), &[3.0, 3.0]);
        assert_eq!(t.name(), "double");
        assert!(format!("{:?}", t).contains("double"));
    }

    #[test]
    fn test_fn_gradient_sees_iteration() {
        let f = FnGradient::new("by_iteration", |g: Tensor<f64>, i: usize| -> Result<Tensor<f64>> {
            Ok(g.scale(i as f64))
        });
        let out = f.apply(Tensor::ones(&[3]), 4).unwrap();
        assert_eq!(out.as_slice(), &[4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_fn_post_update_errors_propagate() {
        let f = FnPostUpdate::new("fail", |_c: &mut Tensor<f64>, _i: usize| -> Result<()> {
            Err(mei_core::MeiError::strategy_failed("fail", "always"))
        });
        let mut candidate = Tensor::zeros(&[1]);
        assert!(f.apply(&mut candidate, 0).is_err());
    }
}
