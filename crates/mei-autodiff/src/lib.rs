//! Automatic differentiation for MEI optimization.
//!
//! This crate provides a small reverse-mode autodiff engine over
//! [`mei_core::Tensor`]. Models, input transforms and regularizers are
//! written against it so that the optimizer can obtain the gradient of a
//! response with respect to the candidate image.
//!
//! # Architecture
//!
//! The autodiff engine is built around three core components:
//!
//! 1. **Graph**: Records nodes and evaluates operations eagerly
//! 2. **Operations**: Defines forward and backward operations
//! 3. **Backward**: Implements the backpropagation algorithm
//!
//! # Example
//!
//! ```
//! use mei_autodiff::prelude::*;
//! use mei_core::Tensor;
//!
//! let graph = Graph::new();
//! let x = graph.variable(Tensor::from_element(&[3], 2.0_f64));
//! let y = graph.square(x.id).unwrap();
//! let loss = graph.sum(y).unwrap();
//!
//! let gradient = grad(&graph, loss, &[x.id]).unwrap();
//! assert_eq!(gradient[0].as_slice(), &[4.0, 4.0, 4.0]);
//! ```

pub mod backward;
pub mod functional;
pub mod graph;
pub mod ops;

pub use backward::{backward, check_gradients, grad, GradientMap};
pub use functional::TensorGraph;
pub use graph::{Graph, Node, NodeId, Variable};
pub use ops::Op;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backward::{backward, check_gradients, grad, GradientMap};
    pub use crate::functional::TensorGraph;
    pub use crate::graph::{Graph, Node, NodeId, Variable};
    pub use crate::ops::Op;
}
