//! Initial guesses for MEI optimization.
//!
//! An [`InitialGuessCreator`] produces the starting tensor of a requested
//! shape. All creators draw standard normal samples into a freshly
//! allocated tensor; the variants differ only in how they post-process the
//! draw (constant channels, temporal truncation).
//!
//! Shapes follow the model input layout `[batch, channel, ...]`: channels
//! live on axis 1 and, for dynamic inputs, frames live on axis 2.

use crate::error::{MeiError, Result};
use crate::tensor::Tensor;
use crate::types::Scalar;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fmt::{self, Debug, Display};

const CHANNEL_AXIS: usize = 1;
const TEMPORAL_AXIS: usize = 2;

/// Creates the tensor from which MEI optimization starts.
pub trait InitialGuessCreator<T: Scalar>: Debug + Display {
    /// Creates an initial guess of the given shape using `rng` as randomness source.
    fn create(&self, shape: &[usize], rng: &mut dyn RngCore) -> Result<Tensor<T>>;

    /// Creates a reproducible initial guess from a seed.
    fn create_seeded(&self, shape: &[usize], seed: u64) -> Result<Tensor<T>> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.create(shape, &mut rng)
    }
}

fn null_channel<T: Scalar>(initial: &mut Tensor<T>, channel: usize, value: T) -> Result<()> {
    if initial.ndim() <= CHANNEL_AXIS {
        return Err(MeiError::dimension_mismatch(
            "a tensor with a channel axis",
            format!("{:?}", initial.shape()),
        ));
    }
    let available = initial.shape()[CHANNEL_AXIS];
    if channel >= available {
        return Err(MeiError::InvalidChannel { channel, available });
    }
    initial.fill_index(CHANNEL_AXIS, channel, value)
}

/// Initial guess with entries drawn from a standard normal distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RandomNormal;

impl RandomNormal {
    /// Creates the creator.
    pub fn new() -> Self {
        Self
    }
}

impl<T: Scalar> InitialGuessCreator<T> for RandomNormal {
    fn create(&self, shape: &[usize], rng: &mut dyn RngCore) -> Result<Tensor<T>> {
        Ok(Tensor::random_normal(shape, rng))
    }
}

impl Display for RandomNormal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RandomNormal()")
    }
}

/// Standard normal initial guess with one channel set to a constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomNormalNullChannel<T: Scalar> {
    /// Channel index along axis 1
    pub null_channel: usize,
    /// Value written into the channel
    pub null_value: T,
}

impl<T: Scalar> RandomNormalNullChannel<T> {
    /// Nulls `null_channel` with zeros.
    pub fn new(null_channel: usize) -> Self {
        Self {
            null_channel,
            null_value: T::zero(),
        }
    }

    /// Sets the value written into the null channel.
    pub fn with_null_value(mut self, null_value: T) -> Self {
        self.null_value = null_value;
        self
    }
}

impl<T: Scalar> InitialGuessCreator<T> for RandomNormalNullChannel<T> {
    fn create(&self, shape: &[usize], rng: &mut dyn RngCore) -> Result<Tensor<T>> {
        let mut initial = Tensor::random_normal(shape, rng);
        null_channel(&mut initial, self.null_channel, self.null_value)?;
        Ok(initial)
    }
}

impl<T: Scalar> Display for RandomNormalNullChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RandomNormalNullChannel()")
    }
}

/// Standard normal initial guess with several constant channels and an
/// optional temporal truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomNormalNullChannels<T: Scalar> {
    null_channels: Vec<usize>,
    null_values: Vec<T>,
    depth: Option<usize>,
}

impl<T: Scalar> RandomNormalNullChannels<T> {
    /// Creates the creator from parallel lists of channels and values.
    ///
    /// The lists must have the same length.
    pub fn new(null_channels: Vec<usize>, null_values: Vec<T>) -> Result<Self> {
        if null_channels.len() != null_values.len() {
            return Err(MeiError::invalid_parameter(format!(
                "{} null channels but {} null values",
                null_channels.len(),
                null_values.len()
            )));
        }
        Ok(Self {
            null_channels,
            null_values,
            depth: None,
        })
    }

    /// Keeps only the first `depth` frames along the temporal axis.
    ///
    /// Used for dynamic models; static models leave the depth unset.
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    /// The nulled channels.
    pub fn null_channels(&self) -> &[usize] {
        &self.null_channels
    }

    /// The values written into the nulled channels.
    pub fn null_values(&self) -> &[T] {
        &self.null_values
    }

    /// The temporal truncation, if any.
    pub fn depth(&self) -> Option<usize> {
        self.depth
    }
}

impl<T: Scalar> InitialGuessCreator<T> for RandomNormalNullChannels<T> {
    fn create(&self, shape: &[usize], rng: &mut dyn RngCore) -> Result<Tensor<T>> {
        let mut initial = Tensor::random_normal(shape, rng);
        for (&channel, &value) in self.null_channels.iter().zip(&self.null_values) {
            null_channel(&mut initial, channel, value)?;
        }

        match self.depth {
            // A zero depth means "unset", as for static models.
            Some(depth) if depth > 0 => {
                if initial.ndim() <= TEMPORAL_AXIS {
                    return Err(MeiError::dimension_mismatch(
                        "a tensor with a temporal axis",
                        format!("{:?}", initial.shape()),
                    ));
                }
                let frames = depth.min(initial.shape()[TEMPORAL_AXIS]);
                initial.narrow(TEMPORAL_AXIS, 0, frames)
            }
            _ => Ok(initial),
        }
    }
}

impl<T: Scalar> Display for RandomNormalNullChannels<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RandomNormalNullChannels()")
    }
}
