//! Stochastic gradient ascent step rule.
//!
//! The update follows PyTorch's SGD with `maximize = true`:
//!
//! 1. `g' = g - weight_decay * x`
//! 2. `b = momentum * b + (1 - dampening) * g'` (`b = g'` on the first step)
//! 3. `d = g' + momentum * b` with Nesterov momentum, `d = b` otherwise
//! 4. `x = x + lr * d`
//!
//! Without momentum the direction is `g'` itself.

use crate::config::SgdKwargs;
use crate::step_rule::{decayed_gradient, StepRule};
use mei_core::{Result, Scalar, Tensor};

/// SGD step rule with optional momentum and weight decay.
#[derive(Debug, Clone)]
pub struct Sgd<T: Scalar> {
    learning_rate: T,
    momentum: T,
    dampening: T,
    nesterov: bool,
    weight_decay: T,
    buffer: Option<Tensor<T>>,
}

impl<T: Scalar> Sgd<T> {
    /// Creates the step rule.
    pub fn new(learning_rate: T, kwargs: &SgdKwargs) -> Self {
        Self {
            learning_rate,
            momentum: <T as Scalar>::from_f64(kwargs.momentum),
            dampening: <T as Scalar>::from_f64(kwargs.dampening),
            nesterov: kwargs.nesterov,
            weight_decay: <T as Scalar>::from_f64(kwargs.weight_decay),
            buffer: None,
        }
    }

    /// Returns the learning rate.
    pub fn learning_rate(&self) -> T {
        self.learning_rate
    }

    /// Returns the momentum buffer, if one has been accumulated.
    pub fn momentum_buffer(&self) -> Option<&Tensor<T>> {
        self.buffer.as_ref()
    }
}

impl<T: Scalar> StepRule<T> for Sgd<T> {
    fn ascend(&mut self, candidate: &mut Tensor<T>, gradient: &Tensor<T>) -> Result<()> {
        let g = decayed_gradient(candidate, gradient, self.weight_decay)?;

        let direction = if self.momentum != T::zero() {
            let buffer = match self.buffer.take() {
                Some(mut buffer) => {
                    buffer.scale_mut(self.momentum);
                    buffer.axpy(T::one() - self.dampening, &g)?;
                    buffer
                }
                None => g.clone(),
            };
            let direction = if self.nesterov {
                let mut d = g;
                d.axpy(self.momentum, &buffer)?;
                d
            } else {
                buffer.clone()
            };
            self.buffer = Some(buffer);
            direction
        } else {
            g
        };

        candidate.axpy(self.learning_rate, &direction)
    }

    fn name(&self) -> &str {
        "SGD"
    }

    fn reset(&mut self) {
        self.buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vector(data: &[f64]) -> Tensor<f64> {
        Tensor::from_vec(vec![data.len()], data.to_vec()).unwrap()
    }

    #[test]
    fn test_plain_step() {
        let mut sgd = Sgd::new(0.5, &SgdKwargs::default());
        let mut x = vector(&[1.0, -1.0]);
        sgd.ascend(&mut x, &vector(&[2.0, 4.0])).unwrap();
        assert_eq!(x.as_slice(), &[2.0, 1.0]);
        assert!(sgd.momentum_buffer().is_none());
    }

    #[test]
    fn test_weight_decay_pulls_to_zero() {
        let kwargs = SgdKwargs {
            weight_decay: 0.5,
            ..SgdKwargs::default()
        };
        let mut sgd = Sgd::new(1.0, &kwargs);
        let mut x = vector(&[2.0]);
        sgd.ascend(&mut x, &vector(&[0.0])).unwrap();
        assert_relative_eq!(x.as_slice()[0], 1.0);
    }

    #[test]
    fn test_momentum_accumulates() {
        let kwargs = SgdKwargs {
            momentum: 0.9,
            ..SgdKwargs::default()
        };
        let mut sgd = Sgd::new(1.0, &kwargs);
        let mut x = vector(&[0.0]);
        let g = vector(&[1.0]);

        sgd.ascend(&mut x, &g).unwrap();
        assert_relative_eq!(x.as_slice()[0], 1.0);
        sgd.ascend(&mut x, &g).unwrap();
        // buffer = 0.9 * 1 + 1 = 1.9
        assert_relative_eq!(x.as_slice()[0], 2.9);

        sgd.reset();
        assert!(sgd.momentum_buffer().is_none());
    }

    #[test]
    fn test_dampening() {
        let kwargs = SgdKwargs {
            momentum: 0.5,
            dampening: 0.5,
            ..SgdKwargs::default()
        };
        let mut sgd = Sgd::new(1.0, &kwargs);
        let mut x = vector(&[0.0]);
        let g = vector(&[2.0]);
        sgd.ascend(&mut x, &g).unwrap();
        sgd.ascend(&mut x, &g).unwrap();
        // first: b = 2; second: b = 0.5 * 2 + 0.5 * 2 = 2
        assert_relative_eq!(x.as_slice()[0], 4.0);
    }

    #[test]
    fn test_nesterov() {
        let kwargs = SgdKwargs {
            momentum: 0.5,
            nesterov: true,
            ..SgdKwargs::default()
        };
        let mut sgd = Sgd::new(1.0, &kwargs);
        let mut x = vector(&[0.0]);
        sgd.ascend(&mut x, &vector(&[1.0])).unwrap();
        // b = 1, d = 1 + 0.5 * 1
        assert_relative_eq!(x.as_slice()[0], 1.5);
    }
}
