//! Built-in input transforms.

use crate::strategy::Transform;
use mei_autodiff::{Graph, NodeId, TensorGraph};
use mei_core::{MeiError, OptimizerError, Result, Scalar};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Passes the candidate through unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Identity;

impl<T: Scalar> Transform<T> for Identity {
    fn apply(&self, _graph: &Graph<T>, x: NodeId, _iteration: usize) -> Result<NodeId> {
        Ok(x)
    }
}

/// Circularly shifts the image by a random offset along its last two axes.
///
/// The offsets are drawn from `[-max_shift, max_shift]` with a generator
/// seeded by `seed + iteration`, so a run is reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    /// Largest shift in pixels along each axis
    pub max_shift: usize,
    /// Base seed of the per-iteration offsets
    pub seed: u64,
}

impl Jitter {
    /// Creates a jitter of at most `max_shift` pixels.
    pub fn new(max_shift: usize) -> Self {
        Self { max_shift, seed: 0 }
    }

    /// Creates a jitter, rejecting shifts that do not fit in an `isize`.
    pub fn try_new(max_shift: usize) -> Result<Self> {
        if isize::try_from(max_shift).is_err() {
            return Err(OptimizerError::invalid_configuration(
                "jitter shift does not fit in a signed offset",
                "max_shift",
                max_shift.to_string(),
            )
            .into());
        }
        Ok(Self::new(max_shift))
    }

    /// Sets the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The `(vertical, horizontal)` shift used at `iteration`.
    pub fn offsets(&self, iteration: usize) -> (isize, isize) {
        if self.max_shift == 0 {
            return (0, 0);
        }
        let max = isize::try_from(self.max_shift).unwrap_or(isize::MAX);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(iteration as u64));
        (rng.gen_range(-max..=max), rng.gen_range(-max..=max))
    }
}

impl<T: Scalar> Transform<T> for Jitter {
    fn apply(&self, graph: &Graph<T>, x: NodeId, iteration: usize) -> Result<NodeId> {
        let ndim = graph.shape(x)?.len();
        if ndim < 2 {
            return Err(MeiError::dimension_mismatch(
                "an input with at least two axes",
                format!("{} axes", ndim),
            ));
        }
        let (dy, dx) = self.offsets(iteration);
        let rolled = graph.roll(x, ndim - 2, dy)?;
        graph.roll(rolled, ndim - 1, dx)
    }
}
