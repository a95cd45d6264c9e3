//! Multi-session response models.
//!
//! A trained model predicts the responses of every recorded neuron of a
//! session at once. [`SessionModel`] captures that contract; restricting it
//! to a single neuron (see [`crate::selector`]) yields the scalar
//! [`DifferentiableFunction`](mei_optim::DifferentiableFunction) the
//! optimizer maximizes.

use mei_autodiff::{Graph, NodeId, TensorGraph};
use mei_core::{MeiError, Result, Scalar, Tensor};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A differentiable model with one output vector per recording session.
pub trait SessionModel<T: Scalar>: Debug + Send + Sync {
    /// Builds the response vector (one element per neuron) of `session_id`
    /// for the batch-1 input node `input`.
    fn evaluate_session(&self, graph: &Graph<T>, input: NodeId, session_id: &str)
        -> Result<NodeId>;

    /// Number of neurons predicted for `session_id`.
    fn num_neurons(&self, session_id: &str) -> Result<usize>;
}

/// Output nonlinearity of a [`LinearNonlinearModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nonlinearity {
    /// `ln(1 + e^x)`
    #[default]
    Softplus,
    /// `e^x`
    Exp,
    /// `max(x, 0)`
    Relu,
    /// No nonlinearity
    Identity,
}

impl Nonlinearity {
    fn apply<T: Scalar>(self, graph: &Graph<T>, x: NodeId) -> Result<NodeId> {
        match self {
            Nonlinearity::Softplus => graph.softplus(x),
            Nonlinearity::Exp => graph.exp(x),
            Nonlinearity::Relu => graph.relu(x),
            Nonlinearity::Identity => Ok(x),
        }
    }
}

/// One linear filter per neuron followed by a pointwise nonlinearity.
///
/// `response[n] = f(<filter[n], input> + bias[n])`
#[derive(Debug, Clone)]
pub struct LinearNonlinearModel<T: Scalar> {
    sessions: BTreeMap<String, Readout<T>>,
    nonlinearity: Nonlinearity,
}

#[derive(Debug, Clone)]
struct Readout<T: Scalar> {
    filters: Vec<Tensor<T>>,
    biases: Vec<T>,
}

impl<T: Scalar> LinearNonlinearModel<T> {
    /// Creates a model without sessions.
    pub fn new(nonlinearity: Nonlinearity) -> Self {
        Self {
            sessions: BTreeMap::new(),
            nonlinearity,
        }
    }

    /// Adds a session with one filter and bias per neuron.
    ///
    /// All filters must share one shape.
    pub fn with_session(
        mut self,
        session_id: impl Into<String>,
        filters: Vec<Tensor<T>>,
        biases: Vec<T>,
    ) -> Result<Self> {
        if filters.len() != biases.len() {
            return Err(MeiError::invalid_parameter(format!(
                "{} filters but {} biases",
                filters.len(),
                biases.len()
            )));
        }
        if let Some(first) = filters.first() {
            for filter in &filters[1..] {
                first.check_same_shape(filter)?;
            }
        }
        self.sessions
            .insert(session_id.into(), Readout { filters, biases });
        Ok(self)
    }

    fn readout(&self, session_id: &str) -> Result<&Readout<T>> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| MeiError::not_found(format!("session {}", session_id)))
    }

    /// Session identifiers known to the model.
    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }
}

impl<T: Scalar> SessionModel<T> for LinearNonlinearModel<T> {
    fn evaluate_session(
        &self,
        graph: &Graph<T>,
        input: NodeId,
        session_id: &str,
    ) -> Result<NodeId> {
        let readout = self.readout(session_id)?;
        let responses = readout
            .filters
            .iter()
            .zip(&readout.biases)
            .map(|(filter, &bias)| {
                let drive = graph.dot_constant(input, filter)?;
                let shifted = graph.add_scalar(drive, bias)?;
                self.nonlinearity.apply(graph, shifted)
            })
            .collect::<Result<Vec<_>>>()?;
        graph.stack(&responses)
    }

    fn num_neurons(&self, session_id: &str) -> Result<usize> {
        Ok(self.readout(session_id)?.filters.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> LinearNonlinearModel<f64> {
        let filters = vec![
            Tensor::from_vec(vec![1, 2], vec![1.0, 0.0]).unwrap(),
            Tensor::from_vec(vec![1, 2], vec![0.0, 2.0]).unwrap(),
        ];
        LinearNonlinearModel::new(Nonlinearity::Identity)
            .with_session("s1", filters, vec![0.5, -1.0])
            .unwrap()
    }

    #[test]
    fn test_session_responses() {
        let m = model();
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_vec(vec![1, 2], vec![3.0, 4.0]).unwrap());
        let out = m.evaluate_session(&graph, x.id, "s1").unwrap();
        let values = graph.value(out).unwrap();
        assert_eq!(values.shape(), &[2]);
        assert_relative_eq!(values.as_slice()[0], 3.5);
        assert_relative_eq!(values.as_slice()[1], 7.0);
        assert_eq!(m.num_neurons("s1").unwrap(), 2);
    }

    #[test]
    fn test_unknown_session() {
        let m = model();
        let graph = Graph::new();
        let x = graph.variable(Tensor::zeros(&[1, 2]));
        assert!(matches!(
            m.evaluate_session(&graph, x.id, "s2"),
            Err(MeiError::NotFound { .. })
        ));
    }

    #[test]
    fn test_mismatched_readout_is_rejected() {
        let filters = vec![Tensor::<f64>::zeros(&[2]), Tensor::zeros(&[3])];
        let err = LinearNonlinearModel::new(Nonlinearity::Softplus)
            .with_session("s", filters, vec![0.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, MeiError::DimensionMismatch { .. }));

        let err = LinearNonlinearModel::<f64>::new(Nonlinearity::Softplus)
            .with_session("s", vec![Tensor::zeros(&[2])], vec![])
            .unwrap_err();
        assert!(matches!(err, MeiError::InvalidParameter { .. }));
    }
}
