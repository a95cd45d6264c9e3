//! Integration tests for the gradient ascent loop.

use approx::assert_relative_eq;
use mei_autodiff::{Graph, NodeId, TensorGraph};
use mei_core::{InitialGuessCreator, RandomNormal, Result, Tensor};
use mei_optim::{
    gradient_ascent, AdamKwargs, ChangeNorm, ClampRange, ClipGradient, DifferentiableFunction,
    FnGradient, FnTransform, Identity, Jitter, OptimizationConfig, OptimizerKwargs, SgdKwargs,
    StopReason, TotalVariation,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

/// `-||x||²`, maximized at the origin.
#[derive(Debug)]
struct NegativeSquareNorm;

impl DifferentiableFunction<f64> for NegativeSquareNorm {
    fn evaluate(&self, graph: &Graph<f64>, input: NodeId) -> Result<NodeId> {
        let sq = graph.square(input)?;
        let total = graph.sum(sq)?;
        graph.neg(total)
    }
}

/// A linear-nonlinear neuron with a fixed receptive field.
#[derive(Debug)]
struct ReceptiveField {
    weights: Tensor<f64>,
}

impl ReceptiveField {
    fn new(shape: &[usize]) -> Self {
        let weights = Tensor::from_fn(shape, |i| ((i * 37) % 17) as f64 / 17.0 - 0.5);
        Self { weights }
    }
}

impl DifferentiableFunction<f64> for ReceptiveField {
    fn evaluate(&self, graph: &Graph<f64>, input: NodeId) -> Result<NodeId> {
        let drive = graph.dot_constant(input, &self.weights)?;
        graph.softplus(drive)
    }
}

fn guess(shape: &[usize], seed: u64) -> Tensor<f64> {
    RandomNormal.create_seeded(shape, seed).unwrap()
}

#[test]
fn test_evaluation_count_matches_iterations() {
    for n in [1usize, 7, 25] {
        let config = OptimizationConfig::<f64>::new().with_num_iterations(n);
        let result = gradient_ascent(&NegativeSquareNorm, guess(&[1, 3, 3], 1), &config).unwrap();
        assert_eq!(result.evaluations.len(), n);
        assert_eq!(result.iterations, n);
    }
}

#[test]
fn test_first_evaluation_is_initial_response() {
    let initial = guess(&[1, 2, 3], 2);
    let expected = -initial.as_slice().iter().map(|v| v * v).sum::<f64>();
    let config = OptimizationConfig::<f64>::new().with_num_iterations(3);
    let result = gradient_ascent(&NegativeSquareNorm, initial, &config).unwrap();
    assert_relative_eq!(result.evaluations[0], expected, epsilon = 1e-12);
}

#[test]
fn test_sgd_increases_negative_square_norm() {
    let config = OptimizationConfig::<f64>::new()
        .with_step_size(0.05)
        .with_num_iterations(20);
    let result = gradient_ascent(&NegativeSquareNorm, guess(&[1, 4, 4], 3), &config).unwrap();

    for pair in result.evaluations.windows(2) {
        assert!(pair[1] > pair[0], "{} did not increase to {}", pair[0], pair[1]);
    }
}

#[test]
fn test_sgd_momentum_and_adam_reach_the_optimum() {
    let optimizers = [
        OptimizerKwargs::Sgd(SgdKwargs {
            momentum: 0.5,
            nesterov: true,
            ..SgdKwargs::default()
        }),
        OptimizerKwargs::Adam(AdamKwargs::default()),
    ];
    for optimizer in optimizers {
        let config = OptimizationConfig::<f64>::new()
            .with_step_size(0.05)
            .with_optimizer(optimizer)
            .with_num_iterations(400);
        let result = gradient_ascent(&NegativeSquareNorm, guess(&[1, 2, 2], 4), &config).unwrap();
        assert!(
            result.mei.norm() < 0.1,
            "{:?} ended at norm {}",
            optimizer,
            result.mei.norm()
        );
    }
}

#[test]
fn test_clamp_range_bounds_every_element() {
    let model = ReceptiveField::new(&[1, 1, 5, 5]);
    let config = OptimizationConfig::<f64>::new()
        .with_step_size(1.0)
        .with_num_iterations(30)
        .with_post_update(Arc::new(ClampRange::new(-0.5, 0.5).unwrap()));
    let result = gradient_ascent(&model, guess(&[1, 1, 5, 5], 5), &config).unwrap();

    assert_eq!(result.mei.shape(), &[1, 5, 5]);
    assert!(result.mei.as_slice().iter().all(|v| (-0.5..=0.5).contains(v)));
}

#[test]
fn test_omitted_strategies_equal_identity_strategies() {
    let model = ReceptiveField::new(&[1, 2, 3, 3]);
    let initial = guess(&[1, 2, 3, 3], 6);

    let plain = OptimizationConfig::<f64>::new().with_num_iterations(15);
    let explicit = OptimizationConfig::<f64>::new()
        .with_num_iterations(15)
        .with_transform(Arc::new(Identity))
        .with_gradient_f(Arc::new(FnGradient::new(
            "identity",
            |g: Tensor<f64>, _i: usize| -> Result<Tensor<f64>> { Ok(g) },
        )));

    let a = gradient_ascent(&model, initial.clone(), &plain).unwrap();
    let b = gradient_ascent(&model, initial, &explicit).unwrap();
    assert_eq!(a.mei, b.mei);
    assert_eq!(a.evaluations, b.evaluations);
    assert!(b.regularization_values.is_empty());
}

#[test]
fn test_transform_is_seen_by_the_model_only() {
    // A transform that zeroes the input hides it from the model: no gradient flows.
    let zero = FnTransform::new("zero", |g: &Graph<f64>, x: NodeId, _i: usize| {
        g.scale(x, 0.0)
    });
    let initial = guess(&[1, 3], 7);
    let config = OptimizationConfig::<f64>::new()
        .with_num_iterations(5)
        .with_transform(Arc::new(zero));
    let result = gradient_ascent(&NegativeSquareNorm, initial.clone(), &config).unwrap();

    assert!(result.evaluations.iter().all(|&e| e == 0.0));
    assert_eq!(result.mei, initial.squeeze_batch());
}

#[test]
fn test_full_pipeline_with_all_strategies() {
    let model = ReceptiveField::new(&[1, 1, 6, 6]);
    let config = OptimizationConfig::<f64>::new()
        .with_step_size(0.1)
        .with_num_iterations(40)
        .with_transform(Arc::new(Jitter::new(1).with_seed(3)))
        .with_regularization(Arc::new(TotalVariation::new(0.01)))
        .with_gradient_f(Arc::new(ClipGradient::new(1.0).unwrap()))
        .with_post_update(Arc::new(ChangeNorm::new(3.0).unwrap()))
        .with_optimizer(OptimizerKwargs::Adam(AdamKwargs::default()));

    let result = gradient_ascent(&model, guess(&[1, 1, 6, 6], 8), &config).unwrap();
    assert_eq!(result.regularization_values.len(), 40);
    assert_relative_eq!(result.mei.norm(), 3.0, epsilon = 1e-9);
    assert!(result.mei.is_finite());

    let (mei, evaluations, stop_reason) = result.into_parts();
    assert_eq!(mei.shape(), &[1, 6, 6]);
    assert_eq!(evaluations.len(), 40);
    assert_eq!(stop_reason, StopReason::Completed);
}

#[test]
fn test_runs_are_deterministic() {
    let model = ReceptiveField::new(&[1, 1, 4, 4]);
    let config = OptimizationConfig::<f64>::new()
        .with_num_iterations(10)
        .with_transform(Arc::new(Jitter::new(2)));
    let a = gradient_ascent(&model, guess(&[1, 1, 4, 4], 9), &config).unwrap();
    let b = gradient_ascent(&model, guess(&[1, 1, 4, 4], 9), &config).unwrap();
    assert_eq!(a.mei, b.mei);
    assert_eq!(a.evaluations, b.evaluations);
}

#[test]
fn test_f32_candidates() {
    #[derive(Debug)]
    struct Mean32;

    impl DifferentiableFunction<f32> for Mean32 {
        fn evaluate(&self, graph: &Graph<f32>, input: NodeId) -> Result<NodeId> {
            let t = graph.tanh(input)?;
            graph.mean(t)
        }
    }

    let config = OptimizationConfig::<f32>::new().with_num_iterations(10);
    let result = gradient_ascent(&Mean32, Tensor::<f32>::zeros(&[1, 2, 2]), &config).unwrap();
    assert!(result.evaluations[9] > result.evaluations[0]);
}

proptest! {
    #[test]
    fn prop_zero_iterations_is_identity(dims in prop::collection::vec(1usize..4, 1..4), seed in any::<u64>()) {
        let mut shape = vec![1];
        shape.extend(dims);
        let initial = guess(&shape, seed);
        let config = OptimizationConfig::<f64>::new().with_num_iterations(0);
        let result = gradient_ascent(&NegativeSquareNorm, initial.clone(), &config).unwrap();
        prop_assert!(result.evaluations.is_empty());
        prop_assert_eq!(result.mei, initial.squeeze_batch());
    }
}
