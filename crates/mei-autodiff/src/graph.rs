//! Computation graph for automatic differentiation.
//!
//! This module implements an eager computation graph: every operation is
//! evaluated as soon as it is recorded, and the graph keeps the values and
//! the operations needed for the backward pass. A graph lives for a single
//! forward/backward evaluation; dropping it clears all accumulated state.

use crate::ops::Op;
use mei_core::{MeiError, Result, Scalar, Tensor};
use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

/// Unique identifier for nodes in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in creation order.
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node{}", self.0)
    }
}

/// A variable in the computation graph.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Unique identifier for this variable
    pub id: NodeId,
    /// Name of the variable (optional)
    pub name: Option<String>,
    /// Whether this variable requires gradient computation
    pub requires_grad: bool,
}

impl Variable {
    /// Creates a new variable with the given ID.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            name: None,
            requires_grad: true,
        }
    }

    /// Sets the name of the variable.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A node in the computation graph.
pub struct Node<T: Scalar> {
    /// Unique identifier
    pub id: NodeId,
    /// The value computed at this node
    pub value: Tensor<T>,
    /// The operation that produced this node
    pub op: Option<Box<dyn Op<T>>>,
    /// Input nodes to this operation
    pub inputs: Vec<NodeId>,
    /// Whether this node requires gradient
    pub requires_grad: bool,
    /// Optional name for debugging
    pub name: Option<String>,
}

impl<T: Scalar> Node<T> {
    /// Checks if this node is a leaf (has no operation).
    pub fn is_leaf(&self) -> bool {
        self.op.is_none()
    }
}

impl<T: Scalar> Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("shape", &self.value.shape())
            .field("op", &self.op.as_ref().map(|op| op.name().to_string()))
            .field("inputs", &self.inputs)
            .field("requires_grad", &self.requires_grad)
            .field("name", &self.name)
            .finish()
    }
}

/// The computation graph structure.
///
/// Nodes are appended after their inputs, so creation order is a
/// topological order of the graph.
#[derive(Debug)]
pub struct Graph<T: Scalar> {
    nodes: RefCell<Vec<Rc<Node<T>>>>,
    track_gradients: bool,
}

impl<T: Scalar> Graph<T> {
    /// Creates a new empty computation graph.
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(Vec::new()),
            track_gradients: true,
        }
    }

    /// Creates a new graph with gradient tracking disabled.
    pub fn no_grad() -> Self {
        Self {
            nodes: RefCell::new(Vec::new()),
            track_gradients: false,
        }
    }

    fn push(&self, build: impl FnOnce(NodeId) -> Node<T>) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len());
        nodes.push(Rc::new(build(id)));
        id
    }

    /// Creates a new variable (input node) in the graph.
    pub fn variable(&self, value: Tensor<T>) -> Variable {
        let requires_grad = self.track_gradients;
        let id = self.push(|id| Node {
            id,
            value,
            op: None,
            inputs: Vec::new(),
            requires_grad,
            name: None,
        });
        Variable {
            id,
            name: None,
            requires_grad,
        }
    }

    /// Creates a new variable with a name.
    pub fn named_variable(&self, value: Tensor<T>, name: impl Into<String>) -> Variable {
        let name = name.into();
        let requires_grad = self.track_gradients;
        let node_name = name.clone();
        let id = self.push(|id| Node {
            id,
            value,
            op: None,
            inputs: Vec::new(),
            requires_grad,
            name: Some(node_name),
        });
        Variable {
            id,
            name: Some(name),
            requires_grad,
        }
    }

    /// Creates a constant (non-differentiable) node in the graph.
    pub fn constant(&self, value: Tensor<T>) -> NodeId {
        self.push(|id| Node {
            id,
            value,
            op: None,
            inputs: Vec::new(),
            requires_grad: false,
            name: None,
        })
    }

    /// Records an operation and evaluates it immediately.
    pub fn apply_op(&self, op: Box<dyn Op<T>>, inputs: &[NodeId]) -> Result<NodeId> {
        let input_nodes = inputs
            .iter()
            .map(|&id| self.get_node(id))
            .collect::<Result<Vec<_>>>()?;

        let value = {
            let values: Vec<&Tensor<T>> = input_nodes.iter().map(|n| &n.value).collect();
            op.forward(&values)?
        };
        let requires_grad = self.track_gradients && input_nodes.iter().any(|n| n.requires_grad);

        Ok(self.push(|id| Node {
            id,
            value,
            op: Some(op),
            inputs: inputs.to_vec(),
            requires_grad,
            name: None,
        }))
    }

    /// Gets a node by its ID.
    pub fn get_node(&self, id: NodeId) -> Result<Rc<Node<T>>> {
        self.nodes
            .borrow()
            .get(id.0)
            .cloned()
            .ok_or_else(|| MeiError::not_found(format!("graph node {}", id)))
    }

    /// Gets a copy of the value of a node.
    pub fn value(&self, id: NodeId) -> Result<Tensor<T>> {
        Ok(self.get_node(id)?.value.clone())
    }

    /// Gets the value of a single-element node.
    pub fn scalar_value(&self, id: NodeId) -> Result<T> {
        self.get_node(id)?.value.item()
    }

    /// Gets the shape of the value of a node.
    pub fn shape(&self, id: NodeId) -> Result<Vec<usize>> {
        Ok(self.get_node(id)?.value.shape().to_vec())
    }

    /// Whether gradients flow into the node.
    pub fn requires_grad(&self, id: NodeId) -> Result<bool> {
        Ok(self.get_node(id)?.requires_grad)
    }

    /// Returns the number of nodes in the graph.
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Whether the graph records gradients.
    pub fn is_tracking(&self) -> bool {
        self.track_gradients
    }
}

impl<T: Scalar> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Add, Multiply};

    #[test]
    fn test_graph_creation() {
        let graph = Graph::<f64>::new();
        assert_eq!(graph.num_nodes(), 0);
        assert!(graph.is_tracking());
    }

    #[test]
    fn test_variable_creation() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_element(&[2, 2], 1.0_f64));

        assert_eq!(graph.num_nodes(), 1);
        assert_eq!(x.id.index(), 0);
        assert!(x.requires_grad);
        assert_eq!(graph.shape(x.id).unwrap(), vec![2, 2]);
    }

    #[test]
    fn test_named_variable() {
        let graph = Graph::new();
        let x = graph.named_variable(Tensor::from_element(&[3], 2.0_f64), "input");

        assert_eq!(x.name.as_deref(), Some("input"));
        assert_eq!(graph.get_node(x.id).unwrap().name.as_deref(), Some("input"));
    }

    #[test]
    fn test_no_grad_graph() {
        let graph = Graph::<f64>::no_grad();
        let x = graph.variable(Tensor::ones(&[2]));
        assert!(!graph.is_tracking());
        assert!(!graph.requires_grad(x.id).unwrap());
    }

    #[test]
    fn test_eager_forward() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_element(&[2], 3.0_f64));
        let c = graph.constant(Tensor::from_element(&[2], 2.0));
        let sum = graph.apply_op(Box::new(Add), &[x.id, c]).unwrap();
        let prod = graph.apply_op(Box::new(Multiply), &[sum, c]).unwrap();

        assert_eq!(graph.value(prod).unwrap().as_slice(), &[10.0, 10.0]);
        assert!(graph.requires_grad(prod).unwrap());
        assert!(!graph.requires_grad(c).unwrap());
    }

    #[test]
    fn test_shape_mismatch_surfaces() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::ones(&[2]));
        let y = graph.variable(Tensor::<f64>::ones(&[3]));
        assert!(graph.apply_op(Box::new(Add), &[x.id, y.id]).is_err());
    }

    #[test]
    fn test_unknown_node() {
        let graph = Graph::<f64>::new();
        let other = Graph::<f64>::new();
        other.variable(Tensor::ones(&[1]));
        other.variable(Tensor::ones(&[1]));
        let id = other.variable(Tensor::ones(&[1])).id;
        assert!(graph.value(id).is_err());
    }
}
