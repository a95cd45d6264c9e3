//! Adam step rule.
//!
//! Adam (Adaptive Moment Estimation) combines momentum with per-element
//! adaptive learning rates. The update at step t, for an ascent gradient g:
//!
//! 1. `g' = g - weight_decay * x`
//! 2. `m = β₁ m + (1-β₁) g'`
//! 3. `v = β₂ v + (1-β₂) g' ⊙ g'` (AMSGrad keeps `v_max = max(v_max, v)`)
//! 4. `m̂ = m / (1-β₁^t)`, `v̂ = v / (1-β₂^t)`
//! 5. `x = x + lr m̂ / (√v̂ + ε)`
//!
//! # References
//!
//! - Kingma & Ba, "Adam: A Method for Stochastic Optimization" (2014)
//! - Reddi et al., "On the Convergence of Adam and Beyond" (2018)

use crate::config::AdamKwargs;
use crate::step_rule::{decayed_gradient, StepRule};
use mei_core::{Result, Scalar, Tensor};
use num_traits::Float;

/// Moment estimates accumulated over a run.
#[derive(Debug, Clone)]
struct AdamState<T: Scalar> {
    /// First moment estimate
    m: Tensor<T>,
    /// Second moment estimate
    v: Tensor<T>,
    /// Maximum second moment (AMSGrad)
    v_max: Option<Tensor<T>>,
}

/// Adam step rule.
#[derive(Debug, Clone)]
pub struct Adam<T: Scalar> {
    learning_rate: T,
    beta1: T,
    beta2: T,
    epsilon: T,
    weight_decay: T,
    amsgrad: bool,
    /// Current time step (for bias correction)
    t: i32,
    state: Option<AdamState<T>>,
}

impl<T: Scalar> Adam<T> {
    /// Creates the step rule.
    pub fn new(learning_rate: T, kwargs: &AdamKwargs) -> Self {
        Self {
            learning_rate,
            beta1: <T as Scalar>::from_f64(kwargs.betas.0),
            beta2: <T as Scalar>::from_f64(kwargs.betas.1),
            epsilon: <T as Scalar>::from_f64(kwargs.eps),
            weight_decay: <T as Scalar>::from_f64(kwargs.weight_decay),
            amsgrad: kwargs.amsgrad,
            t: 0,
            state: None,
        }
    }

    /// Number of steps taken since creation or the last reset.
    pub fn steps(&self) -> usize {
        self.t as usize
    }
}

impl<T: Scalar> StepRule<T> for Adam<T> {
    fn ascend(&mut self, candidate: &mut Tensor<T>, gradient: &Tensor<T>) -> Result<()> {
        let g = decayed_gradient(candidate, gradient, self.weight_decay)?;
        let shape = candidate.shape().to_vec();
        let amsgrad = self.amsgrad;
        let state = self.state.get_or_insert_with(|| AdamState {
            m: Tensor::zeros(&shape),
            v: Tensor::zeros(&shape),
            v_max: if amsgrad {
                Some(Tensor::zeros(&shape))
            } else {
                None
            },
        });
        self.t = self.t.saturating_add(1);

        let (b1, b2) = (self.beta1, self.beta2);
        let one = T::one();
        for ((m, v), &gi) in state
            .m
            .as_mut_slice()
            .iter_mut()
            .zip(state.v.as_mut_slice().iter_mut())
            .zip(g.as_slice())
        {
            *m = b1 * *m + (one - b1) * gi;
            *v = b2 * *v + (one - b2) * gi * gi;
        }

        let second = match state.v_max.as_mut() {
            Some(v_max) => {
                for (vm, &v) in v_max.as_mut_slice().iter_mut().zip(state.v.as_slice()) {
                    *vm = <T as Float>::max(*vm, v);
                }
                &*v_max
            }
            None => &state.v,
        };

        let bias1 = one - <T as Float>::powi(b1, self.t);
        let bias2 = one - <T as Float>::powi(b2, self.t);
        let step = self.learning_rate / bias1;
        let eps = self.epsilon;
        for ((x, &m), &v) in candidate
            .as_mut_slice()
            .iter_mut()
            .zip(state.m.as_slice())
            .zip(second.as_slice())
        {
            *x += step * m / (<T as Float>::sqrt(v / bias2) + eps);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Adam"
    }

    fn reset(&mut self) {
        self.t = 0;
        self.state = None;
    }
}
