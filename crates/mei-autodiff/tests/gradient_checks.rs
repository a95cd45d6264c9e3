//! Finite-difference checks of the backward pass on image-shaped inputs.

use approx::assert_relative_eq;
use mei_autodiff::prelude::*;
use mei_core::{Result, Tensor};
use proptest::prelude::*;

fn image(values: Vec<f64>) -> Tensor<f64> {
    Tensor::from_vec(vec![1, 1, 3, 3], values).unwrap()
}

/// A tiny "neuron": weighted sum of the input followed by a softplus.
fn neuron(graph: &Graph<f64>, x: NodeId) -> Result<NodeId> {
    let weights = Tensor::from_fn(&[1, 1, 3, 3], |i| (i as f64 - 4.0) / 4.0);
    let drive = graph.dot_constant(x, &weights)?;
    let shifted = graph.add_scalar(drive, -0.2)?;
    graph.softplus(shifted)
}

/// Total variation along the two spatial axes.
fn total_variation(graph: &Graph<f64>, x: NodeId) -> Result<NodeId> {
    let down = graph.roll(x, 2, 1)?;
    let right = graph.roll(x, 3, 1)?;
    let dv = graph.sub(x, down)?;
    let dh = graph.sub(x, right)?;
    let v = graph.square(dv)?;
    let h = graph.square(dh)?;
    let tv = graph.add(v, h)?;
    graph.sum(tv)
}

#[test]
fn test_neuron_gradient_matches_finite_differences() {
    let point = image(vec![0.1, -0.4, 0.9, 1.2, 0.0, -0.3, 0.5, 0.7, -1.1]);
    let error = check_gradients(neuron, &point, 1e-6).unwrap();
    assert_relative_eq!(error, 0.0, epsilon = 1e-6);
}

#[test]
fn test_total_variation_gradient_matches_finite_differences() {
    let point = image(vec![0.3, -0.2, 0.8, 0.1, 0.4, -0.9, 1.5, 0.2, -0.6]);
    let error = check_gradients(total_variation, &point, 1e-6).unwrap();
    assert_relative_eq!(error, 0.0, epsilon = 1e-5);
}

#[test]
fn test_response_minus_penalty() {
    let point = image(vec![0.5; 9]);
    let error = check_gradients(
        |g, x| {
            let response = neuron(g, x)?;
            let sq = g.square(x)?;
            let norm = g.sum(sq)?;
            let penalty = g.scale(norm, 0.1)?;
            g.sub(response, penalty)
        },
        &point,
        1e-6,
    )
    .unwrap();
    assert_relative_eq!(error, 0.0, epsilon = 1e-6);
}

#[test]
fn test_narrowed_response() {
    let point = Tensor::from_fn(&[1, 2, 4, 2, 2], |i| ((i * 7) % 11) as f64 / 11.0 - 0.5);
    let error = check_gradients(
        |g, x| {
            let frames = g.narrow(x, 2, 1, 2)?;
            let act = g.tanh(frames)?;
            g.mean(act)
        },
        &point,
        1e-6,
    )
    .unwrap();
    assert_relative_eq!(error, 0.0, epsilon = 1e-6);
}

proptest! {
    #[test]
    fn prop_exp_sum_gradient_is_value(values in prop::collection::vec(-3.0f64..3.0, 1..16)) {
        let n = values.len();
        let graph = Graph::new();
        let x = graph.variable(Tensor::from_vec(vec![n], values.clone()).unwrap());
        let e = graph.exp(x.id).unwrap();
        let s = graph.sum(e).unwrap();

        let g = grad(&graph, s, &[x.id]).unwrap();
        for (gi, vi) in g[0].as_slice().iter().zip(&values) {
            prop_assert!((gi - vi.exp()).abs() < 1e-12);
        }
    }

    #[test]
    fn prop_roll_gradient_is_inverse_roll(shift in -5isize..5, seed in 0usize..100) {
        let point = Tensor::from_fn(&[1, 5], |i| ((i + seed) % 7) as f64);
        let error = check_gradients(
            |g, x| {
                let r = g.roll(x, 1, shift)?;
                let w = Tensor::from_fn(&[1, 5], |i| i as f64);
                g.dot_constant(r, &w)
            },
            &point,
            1e-6,
        ).unwrap();
        prop_assert!(error < 1e-6);
    }
}
