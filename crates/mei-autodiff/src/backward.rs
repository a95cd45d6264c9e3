//! Backward pass implementation for automatic differentiation.
//!
//! This module implements the backpropagation algorithm to compute
//! gradients through the computation graph.

use crate::graph::{Graph, NodeId};
use mei_core::{MeiError, Result, Scalar, Tensor};
use num_traits::Float;
use std::collections::HashMap;

/// Type alias for gradient storage.
pub type GradientMap<T> = HashMap<NodeId, Tensor<T>>;

/// Performs backward pass (backpropagation) through the graph.
///
/// # Arguments
/// * `graph` - The computation graph
/// * `output_node` - The node to compute gradients from
/// * `grad_output` - The initial gradient (defaults to ones shaped like the output)
///
/// # Returns
/// A map from node IDs to their gradients. Nodes that do not require
/// gradients, or that the output does not depend on, have no entry.
pub fn backward<T: Scalar>(
    graph: &Graph<T>,
    output_node: NodeId,
    grad_output: Option<Tensor<T>>,
) -> Result<GradientMap<T>> {
    let output = graph.get_node(output_node)?;
    let initial_grad = match grad_output {
        Some(grad) => {
            output.value.check_same_shape(&grad)?;
            grad
        }
        None => Tensor::ones(output.value.shape()),
    };

    let mut gradients = GradientMap::new();
    if !output.requires_grad {
        return Ok(gradients);
    }
    gradients.insert(output_node, initial_grad);

    // Creation order is topological, so walking the ids downwards visits
    // every node after all of its consumers.
    for index in (0..=output_node.index()).rev() {
        let node = graph.get_node(NodeId::from_index(index))?;
        let node_grad = match gradients.get(&node.id) {
            Some(grad) => grad.clone(),
            None => continue,
        };
        let op = match &node.op {
            Some(op) if node.requires_grad => op,
            _ => continue,
        };

        let inputs = node
            .inputs
            .iter()
            .map(|&id| graph.get_node(id))
            .collect::<Result<Vec<_>>>()?;
        let input_values: Vec<&Tensor<T>> = inputs.iter().map(|n| &n.value).collect();

        let input_grads = op.backward(&node_grad, &input_values, &node.value)?;
        if input_grads.len() != inputs.len() {
            return Err(MeiError::numerical_error(format!(
                "{} returned {} gradients for {} inputs",
                op.name(),
                input_grads.len(),
                inputs.len()
            )));
        }

        for (input, grad) in inputs.iter().zip(input_grads) {
            if !input.requires_grad {
                continue;
            }
            match gradients.get_mut(&input.id) {
                Some(acc) => acc.axpy(T::one(), &grad)?,
                None => {
                    gradients.insert(input.id, grad);
                }
            }
        }
    }

    Ok(gradients)
}

/// Computes the gradient of a scalar output with respect to specified inputs.
///
/// Inputs the output does not depend on receive a zero gradient.
pub fn grad<T: Scalar>(
    graph: &Graph<T>,
    output_node: NodeId,
    input_nodes: &[NodeId],
) -> Result<Vec<Tensor<T>>> {
    let output = graph.get_node(output_node)?;
    if output.value.len() != 1 {
        return Err(MeiError::dimension_mismatch(
            "a single-element output",
            format!("{:?}", output.value.shape()),
        ));
    }

    let mut all_grads = backward(graph, output_node, None)?;
    input_nodes
        .iter()
        .map(|&id| match all_grads.remove(&id) {
            Some(grad) => Ok(grad),
            None => Ok(Tensor::zeros(&graph.shape(id)?)),
        })
        .collect()
}

/// Checks gradients using central finite differences.
///
/// `f` builds a scalar function of its input node on a fresh graph; it is
/// called once for the analytical gradient and twice per element of
/// `point` for the numerical one.
///
/// # Returns
/// The maximum relative error between analytical and numerical gradients
pub fn check_gradients<T, F>(f: F, point: &Tensor<T>, epsilon: T) -> Result<T>
where
    T: Scalar,
    F: Fn(&Graph<T>, NodeId) -> Result<NodeId>,
{
    let graph = Graph::new();
    let x = graph.variable(point.clone());
    let output = f(&graph, x.id)?;
    let analytical = grad(&graph, output, &[x.id])?
        .pop()
        .ok_or_else(|| MeiError::numerical_error("no gradient computed for input node"))?;

    let evaluate = |value: Tensor<T>| -> Result<T> {
        let graph = Graph::no_grad();
        let x = graph.variable(value);
        let output = f(&graph, x.id)?;
        graph.scalar_value(output)
    };

    let two = T::one() + T::one();
    let mut max_error = T::zero();
    for i in 0..point.len() {
        let mut plus = point.clone();
        plus.as_mut_slice()[i] += epsilon;
        let mut minus = point.clone();
        minus.as_mut_slice()[i] -= epsilon;

        let numerical = (evaluate(plus)? - evaluate(minus)?) / (two * epsilon);
        let exact = analytical.as_slice()[i];
        let scale = <T as Float>::max(
            T::one(),
            <T as Float>::max(<T as Float>::abs(numerical), <T as Float>::abs(exact)),
        );
        let error = <T as Float>::abs(numerical - exact) / scale;
        max_error = <T as Float>::max(max_error, error);
    }

    Ok(max_error)
}
