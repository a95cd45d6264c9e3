//! Step rules moving the candidate along the ascent gradient.

use crate::adam::Adam;
use crate::config::OptimizerKwargs;
use crate::sgd::Sgd;
use mei_core::{OptimizerError, Result, Scalar, Tensor};
use num_traits::Float;
use std::fmt::Debug;

/// Updates a candidate in place from an ascent gradient.
///
/// Implementations keep per-run state (momentum buffers, moment
/// estimates) and must be created fresh for every optimization run.
pub trait StepRule<T: Scalar>: Debug {
    /// Moves `candidate` up the `gradient`.
    fn ascend(&mut self, candidate: &mut Tensor<T>, gradient: &Tensor<T>) -> Result<()>;

    /// Returns the step rule name.
    fn name(&self) -> &str;

    /// Clears all accumulated state.
    fn reset(&mut self);
}

/// Builds the step rule described by `kwargs` with learning rate `step_size`.
pub fn build_step_rule<T: Scalar>(
    kwargs: &OptimizerKwargs,
    step_size: T,
) -> Result<Box<dyn StepRule<T>>> {
    if !<T as Float>::is_finite(step_size) || step_size <= T::zero() {
        return Err(OptimizerError::invalid_configuration(
            "step size must be finite and positive",
            "step_size",
            step_size.to_string(),
        )
        .into());
    }
    kwargs.validate()?;

    Ok(match kwargs {
        OptimizerKwargs::Sgd(sgd) => Box::new(Sgd::new(step_size, sgd)),
        OptimizerKwargs::Adam(adam) => Box::new(Adam::new(step_size, adam)),
    })
}

/// `gradient - weight_decay * candidate`, or a plain copy without decay.
pub(crate) fn decayed_gradient<T: Scalar>(
    candidate: &Tensor<T>,
    gradient: &Tensor<T>,
    weight_decay: T,
) -> Result<Tensor<T>> {
    candidate.check_same_shape(gradient)?;
    let mut g = gradient.clone();
    if weight_decay != T::zero() {
        g.axpy(-weight_decay, candidate)?;
    }
    Ok(g)
}
