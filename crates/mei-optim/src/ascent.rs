//! The gradient ascent loop.
//!
//! Each iteration builds a fresh computation graph, so gradients never
//! accumulate across iterations:
//!
//! 1. Register the candidate as a variable and apply the transform
//! 2. Evaluate the model on the transformed candidate
//! 3. Subtract the regularization penalty of the untransformed candidate
//! 4. Backpropagate the objective to the candidate
//! 5. Precondition the gradient
//! 6. Let the step rule move the candidate up the gradient
//! 7. Apply the post-update

use crate::config::OptimizationConfig;
use crate::model::DifferentiableFunction;
use crate::step_rule::build_step_rule;
use mei_autodiff::{grad, Graph, TensorGraph};
use mei_core::{MeiError, Result, Scalar, Tensor};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Reason the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StopReason {
    /// All configured iterations were run
    Completed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => f.write_str("completed"),
        }
    }
}

/// Outcome of a gradient ascent run.
#[derive(Debug, Clone)]
pub struct MeiResult<T: Scalar> {
    /// The optimized input, without its leading batch axis
    pub mei: Tensor<T>,
    /// Model response at every iteration, in order
    pub evaluations: Vec<T>,
    /// Penalty at every iteration (empty without regularization)
    pub regularization_values: Vec<T>,
    /// Candidates kept every `save_every` iterations, as `(iteration, candidate)`
    pub snapshots: Vec<(usize, Tensor<T>)>,
    /// Number of iterations performed
    pub iterations: usize,
    /// Total optimization time
    pub duration: Duration,
    /// Reason for termination
    pub stop_reason: StopReason,
}

impl<T: Scalar> MeiResult<T> {
    /// Splits the result into `(mei, evaluations, stop_reason)`.
    pub fn into_parts(self) -> (Tensor<T>, Vec<T>, StopReason) {
        (self.mei, self.evaluations, self.stop_reason)
    }

    /// The last recorded response, if any iteration ran.
    pub fn final_evaluation(&self) -> Option<T> {
        self.evaluations.last().copied()
    }
}

/// Runs gradient ascent on `model` starting from `initial_guess`.
///
/// Runs exactly `config.num_iterations` iterations. Errors raised by the
/// model or by any strategy abort the run and are returned unchanged.
pub fn gradient_ascent<T, F>(
    model: &F,
    initial_guess: Tensor<T>,
    config: &OptimizationConfig<T>,
) -> Result<MeiResult<T>>
where
    T: Scalar,
    F: DifferentiableFunction<T> + ?Sized,
{
    config.validate()?;
    let mut step_rule = build_step_rule(&config.optimizer, config.step_size)?;
    let start_time = Instant::now();

    debug!(
        optimizer = step_rule.name(),
        step_size = Scalar::to_f64(config.step_size),
        num_iterations = config.num_iterations,
        shape = ?initial_guess.shape(),
        "starting gradient ascent"
    );

    let mut candidate = initial_guess;
    let mut evaluations = Vec::with_capacity(config.num_iterations);
    let mut regularization_values = Vec::new();
    let mut snapshots = Vec::new();

    for i in 0..config.num_iterations {
        let graph = Graph::new();
        let x = graph.variable(candidate.clone()).id;

        let transformed = match &config.transform {
            Some(transform) => transform.apply(&graph, x, i)?,
            None => x,
        };
        let response = model.evaluate(&graph, transformed)?;
        let evaluation = graph.scalar_value(response)?;
        evaluations.push(evaluation);

        let objective = match &config.regularization {
            Some(regularization) => {
                let penalty = regularization.apply(&graph, x, i)?;
                let reg_value = graph.scalar_value(penalty)?;
                regularization_values.push(reg_value);
                graph.sub(response, penalty)?
            }
            None => response,
        };

        let gradient = grad(&graph, objective, &[x])?
            .pop()
            .ok_or_else(|| MeiError::numerical_error("no gradient for the candidate"))?;
        let gradient = match &config.gradient_f {
            Some(gradient_f) => gradient_f.apply(gradient, i)?,
            None => gradient,
        };

        step_rule.ascend(&mut candidate, &gradient)?;
        if let Some(post_update) = &config.post_update {
            post_update.apply(&mut candidate, i)?;
        }

        let completed = i + 1;
        if config.log_every.is_some_and(|every| completed % every == 0) {
            info!(
                iteration = completed,
                evaluation = Scalar::to_f64(evaluation),
                regularization = regularization_values.last().map(|&v| Scalar::to_f64(v)),
                "gradient ascent progress"
            );
        }
        if config.save_every.is_some_and(|every| completed % every == 0) {
            snapshots.push((completed, candidate.clone()));
        }
    }

    let duration = start_time.elapsed();
    debug!(
        iterations = config.num_iterations,
        final_evaluation = evaluations.last().map(|&v| Scalar::to_f64(v)),
        elapsed_ms = duration.as_millis() as u64,
        "finished gradient ascent"
    );

    Ok(MeiResult {
        mei: candidate.squeeze_batch(),
        evaluations,
        regularization_values,
        snapshots,
        iterations: config.num_iterations,
        duration,
        stop_reason: StopReason::Completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FnModel;
    use crate::strategy::FnPostUpdate;
    use mei_autodiff::NodeId;
    use std::sync::Arc;

    fn negative_square_norm(graph: &Graph<f64>, x: NodeId) -> Result<NodeId> {
        let sq = graph.square(x)?;
        let total = graph.sum(sq)?;
        graph.neg(total)
    }

    #[test]
    fn test_zero_iterations_returns_initial_guess() {
        let model = FnModel::new(negative_square_norm);
        let guess = Tensor::from_fn(&[1, 2, 2], |i| i as f64);
        let config = OptimizationConfig::<f64>::new().with_num_iterations(0);

        let result = gradient_ascent(&model, guess.clone(), &config).unwrap();
        assert_eq!(result.mei, guess.squeeze_batch());
        assert!(result.evaluations.is_empty());
        assert_eq!(result.stop_reason, StopReason::Completed);
        assert_eq!(result.final_evaluation(), None);
    }

    #[test]
    fn test_batch_axis_is_removed() {
        let model = FnModel::new(negative_square_norm);
        let config = OptimizationConfig::<f64>::new().with_num_iterations(2);
        let result = gradient_ascent(&model, Tensor::ones(&[1, 3, 4]), &config).unwrap();
        assert_eq!(result.mei.shape(), &[3, 4]);
    }

    #[test]
    fn test_non_scalar_response_is_rejected() {
        let model = FnModel::new(|g: &Graph<f64>, x: NodeId| g.exp(x));
        let config = OptimizationConfig::<f64>::new().with_num_iterations(1);
        let err = gradient_ascent(&model, Tensor::ones(&[1, 2]), &config).unwrap_err();
        assert!(matches!(err, MeiError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_post_update_error_aborts() {
        let model = FnModel::new(negative_square_norm);
        let failing = FnPostUpdate::new("fail_at_3", |_c: &mut Tensor<f64>, i: usize| -> Result<()> {
            if i == 3 {
                Err(MeiError::strategy_failed("fail_at_3", "iteration 3"))
            } else {
                Ok(())
            }
        });
        let config = OptimizationConfig::<f64>::new()
            .with_num_iterations(10)
            .with_post_update(Arc::new(failing));
        let err = gradient_ascent(&model, Tensor::ones(&[1, 2]), &config).unwrap_err();
        assert!(matches!(err, MeiError::StrategyFailed { .. }));
    }

    #[test]
    fn test_snapshots_and_regularization_trace() {
        let model = FnModel::new(negative_square_norm);
        let config = OptimizationConfig::<f64>::new()
            .with_num_iterations(6)
            .with_save_every(2)
            .with_log_every(3)
            .with_regularization(Arc::new(crate::regularizers::L2Penalty::new(0.1)));
        let result = gradient_ascent(&model, Tensor::ones(&[1, 2]), &config).unwrap();

        assert_eq!(result.regularization_values.len(), 6);
        let kept: Vec<usize> = result.snapshots.iter().map(|(i, _)| *i).collect();
        assert_eq!(kept, vec![2, 4, 6]);
        assert_eq!(result.iterations, 6);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_running() {
        let model = FnModel::new(negative_square_norm);
        let config = OptimizationConfig::<f64>::new().with_step_size(-0.1);
        assert!(gradient_ascent(&model, Tensor::ones(&[1, 2]), &config).is_err());
    }
}
