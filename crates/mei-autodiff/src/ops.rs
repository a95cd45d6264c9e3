//! Operations for the computation graph.
//!
//! This module defines the operations that can be performed in the
//! computation graph, including their forward and backward computations.
//! Element-wise binary operations require inputs of identical shape;
//! there is no broadcasting.

use mei_core::{MeiError, Result, Scalar, Tensor};
use num_traits::Float;
use std::fmt::Debug;

/// Trait for operations in the computation graph.
pub trait Op<T: Scalar>: Debug {
    /// Performs the forward computation.
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>>;

    /// Computes the gradient with respect to each input.
    ///
    /// # Arguments
    /// * `grad_output` - The gradient flowing from the output
    /// * `inputs` - The input values used in the forward pass
    /// * `output` - The output value from the forward pass
    ///
    /// # Returns
    /// A vector of gradients, one for each input
    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>>;

    /// Returns the name of this operation.
    fn name(&self) -> &str;
}

fn check_arity<T: Scalar>(name: &str, inputs: &[&Tensor<T>], expected: usize) -> Result<()> {
    if inputs.len() != expected {
        return Err(MeiError::invalid_parameter(format!(
            "{} requires exactly {} inputs, got {}",
            name,
            expected,
            inputs.len()
        )));
    }
    Ok(())
}

/// Declares a unary element-wise operation from its value and its
/// derivative expressed through the input `x` and the output `y`.
macro_rules! unary_op {
    ($(#[$meta:meta])* $name:ident, |$x:ident| $fwd:expr, |$gx:ident, $gy:ident| $deriv:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl<T: Scalar> Op<T> for $name {
            fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
                check_arity(stringify!($name), inputs, 1)?;
                Ok(inputs[0].map(|$x: T| $fwd))
            }

            fn backward(
                &self,
                grad_output: &Tensor<T>,
                inputs: &[&Tensor<T>],
                output: &Tensor<T>,
            ) -> Result<Vec<Tensor<T>>> {
                let local = inputs[0].zip_map(output, |$gx: T, $gy: T| $deriv)?;
                Ok(vec![grad_output.component_mul(&local)?])
            }

            fn name(&self) -> &str {
                stringify!($name)
            }
        }
    };
}

/// Element-wise addition operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl<T: Scalar> Op<T> for Add {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Add", inputs, 2)?;
        inputs[0].add(inputs[1])
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        _inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        Ok(vec![grad_output.clone(), grad_output.clone()])
    }

    fn name(&self) -> &str {
        "Add"
    }
}

/// Element-wise subtraction operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Subtract;

impl<T: Scalar> Op<T> for Subtract {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Subtract", inputs, 2)?;
        inputs[0].sub(inputs[1])
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        _inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        Ok(vec![grad_output.clone(), grad_output.scale(-T::one())])
    }

    fn name(&self) -> &str {
        "Subtract"
    }
}

/// Element-wise multiplication operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Multiply;

impl<T: Scalar> Op<T> for Multiply {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Multiply", inputs, 2)?;
        inputs[0].component_mul(inputs[1])
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        // d/dx (x * y) = y
        // d/dy (x * y) = x
        Ok(vec![
            grad_output.component_mul(inputs[1])?,
            grad_output.component_mul(inputs[0])?,
        ])
    }

    fn name(&self) -> &str {
        "Multiply"
    }
}

/// Element-wise division operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Divide;

impl<T: Scalar> Op<T> for Divide {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Divide", inputs, 2)?;
        inputs[0].zip_map(inputs[1], |a, b| a / b)
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        // d/dx (x / y) = 1 / y
        // d/dy (x / y) = -(x / y) / y
        let grad_x = grad_output.zip_map(inputs[1], |g, y| g / y)?;
        let grad_y = output
            .zip_map(inputs[1], |q, y| -q / y)?
            .component_mul(grad_output)?;
        Ok(vec![grad_x, grad_y])
    }

    fn name(&self) -> &str {
        "Divide"
    }
}

/// Multiplication by a constant factor.
#[derive(Debug, Clone, Copy)]
pub struct Scale<T: Scalar> {
    /// The constant factor
    pub factor: T,
}

impl<T: Scalar> Scale<T> {
    /// Creates a new scale operation.
    pub fn new(factor: T) -> Self {
        Self { factor }
    }
}

impl<T: Scalar> Op<T> for Scale<T> {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Scale", inputs, 1)?;
        Ok(inputs[0].scale(self.factor))
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        _inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        Ok(vec![grad_output.scale(self.factor)])
    }

    fn name(&self) -> &str {
        "Scale"
    }
}

/// Addition of a constant to every element.
#[derive(Debug, Clone, Copy)]
pub struct AddScalar<T: Scalar> {
    /// The constant offset
    pub value: T,
}

impl<T: Scalar> AddScalar<T> {
    /// Creates a new offset operation.
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Scalar> Op<T> for AddScalar<T> {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("AddScalar", inputs, 1)?;
        let value = self.value;
        Ok(inputs[0].map(|x| x + value))
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        _inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        Ok(vec![grad_output.clone()])
    }

    fn name(&self) -> &str {
        "AddScalar"
    }
}

/// Element-wise power with a constant exponent.
#[derive(Debug, Clone, Copy)]
pub struct Pow<T: Scalar> {
    /// The exponent
    pub exponent: T,
}

impl<T: Scalar> Pow<T> {
    /// Creates a new power operation.
    pub fn new(exponent: T) -> Self {
        Self { exponent }
    }
}

impl<T: Scalar> Op<T> for Pow<T> {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Pow", inputs, 1)?;
        let p = self.exponent;
        Ok(inputs[0].map(|x| <T as Float>::powf(x, p)))
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        // d/dx x^p = p * x^(p-1)
        let p = self.exponent;
        let local = inputs[0].map(|x| p * <T as Float>::powf(x, p - T::one()));
        Ok(vec![grad_output.component_mul(&local)?])
    }

    fn name(&self) -> &str {
        "Pow"
    }
}

unary_op!(
    /// Element-wise negation operation.
    Negate,
    |x| -x,
    |_x, _y| -T::one()
);

unary_op!(
    /// Element-wise square.
    Square,
    |x| x * x,
    |x, _y| x + x
);

unary_op!(
    /// Element-wise exponential operation.
    Exp,
    |x| <T as Float>::exp(x),
    |_x, y| y
);

unary_op!(
    /// Element-wise natural logarithm operation.
    Log,
    |x| <T as Float>::ln(x),
    |x, _y| T::one() / x
);

unary_op!(
    /// Element-wise hyperbolic tangent.
    Tanh,
    |x| <T as Float>::tanh(x),
    |_x, y| T::one() - y * y
);

unary_op!(
    /// Element-wise logistic sigmoid.
    Sigmoid,
    |x| T::one() / (T::one() + <T as Float>::exp(-x)),
    |_x, y| y * (T::one() - y)
);

unary_op!(
    /// ReLU activation function.
    ReLU,
    |x| if x > T::zero() { x } else { T::zero() },
    |x, _y| if x > T::zero() { T::one() } else { T::zero() }
);

unary_op!(
    /// Softplus activation `ln(1 + e^x)`.
    Softplus,
    |x| {
        // ln(1 + e^x) = max(x, 0) + ln(1 + e^-|x|)
        let positive = if x > T::zero() { x } else { T::zero() };
        positive + <T as Float>::ln_1p(<T as Float>::exp(-<T as Float>::abs(x)))
    },
    |x, _y| T::one() / (T::one() + <T as Float>::exp(-x))
);

unary_op!(
    /// Element-wise absolute value. The derivative at zero is taken as zero.
    Abs,
    |x| <T as Float>::abs(x),
    |x, _y| {
        if x > T::zero() {
            T::one()
        } else if x < T::zero() {
            -T::one()
        } else {
            T::zero()
        }
    }
);

/// Sum reduction to a 0-dimensional tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl<T: Scalar> Op<T> for Sum {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Sum", inputs, 1)?;
        Ok(Tensor::scalar(inputs[0].sum()))
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        Ok(vec![Tensor::from_element(
            inputs[0].shape(),
            grad_output.item()?,
        )])
    }

    fn name(&self) -> &str {
        "Sum"
    }
}

/// Mean reduction to a 0-dimensional tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl<T: Scalar> Op<T> for Mean {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Mean", inputs, 1)?;
        if inputs[0].is_empty() {
            return Err(MeiError::invalid_parameter("mean of an empty tensor"));
        }
        Ok(Tensor::scalar(inputs[0].mean()))
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        let n = <T as Scalar>::from_usize(inputs[0].len());
        Ok(vec![Tensor::from_element(
            inputs[0].shape(),
            grad_output.item()? / n,
        )])
    }

    fn name(&self) -> &str {
        "Mean"
    }
}

/// Selects one element by flat (row-major) index.
#[derive(Debug, Clone, Copy)]
pub struct Select {
    /// Flat index of the selected element
    pub index: usize,
}

impl Select {
    /// Creates a new selection operation.
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl<T: Scalar> Op<T> for Select {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Select", inputs, 1)?;
        let value = inputs[0].as_slice().get(self.index).copied().ok_or_else(|| {
            MeiError::dimension_mismatch(
                format!("index below {}", inputs[0].len()),
                self.index,
            )
        })?;
        Ok(Tensor::scalar(value))
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        let mut grad = Tensor::zeros(inputs[0].shape());
        grad.as_mut_slice()[self.index] = grad_output.item()?;
        Ok(vec![grad])
    }

    fn name(&self) -> &str {
        "Select"
    }
}

/// Stacks single-element inputs into a 1-dimensional tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stack;

impl<T: Scalar> Op<T> for Stack {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        let values = inputs
            .iter()
            .map(|t| t.item())
            .collect::<Result<Vec<_>>>()?;
        Tensor::from_vec(vec![values.len()], values)
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        Ok(inputs
            .iter()
            .zip(grad_output.as_slice())
            .map(|(input, &g)| Tensor::from_element(input.shape(), g))
            .collect())
    }

    fn name(&self) -> &str {
        "Stack"
    }
}

/// Reshape operation; the element order is unchanged.
#[derive(Debug, Clone)]
pub struct Reshape {
    /// Target shape
    pub shape: Vec<usize>,
}

impl Reshape {
    /// Creates a new reshape operation.
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
        }
    }
}

impl<T: Scalar> Op<T> for Reshape {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Reshape", inputs, 1)?;
        inputs[0].reshape(&self.shape)
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        Ok(vec![grad_output.reshape(inputs[0].shape())?])
    }

    fn name(&self) -> &str {
        "Reshape"
    }
}

/// Slices `start..start + len` along one axis.
#[derive(Debug, Clone, Copy)]
pub struct Narrow {
    /// Axis to slice
    pub axis: usize,
    /// First kept index
    pub start: usize,
    /// Number of kept indices
    pub len: usize,
}

impl Narrow {
    /// Creates a new narrowing operation.
    pub fn new(axis: usize, start: usize, len: usize) -> Self {
        Self { axis, start, len }
    }
}

impl<T: Scalar> Op<T> for Narrow {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Narrow", inputs, 1)?;
        inputs[0].narrow(self.axis, self.start, self.len)
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        let mut grad = Tensor::zeros(inputs[0].shape());
        grad.add_narrowed(self.axis, self.start, grad_output)?;
        Ok(vec![grad])
    }

    fn name(&self) -> &str {
        "Narrow"
    }
}

/// Circular shift along one axis.
#[derive(Debug, Clone, Copy)]
pub struct Roll {
    /// Axis to shift
    pub axis: usize,
    /// Shift in positions (negative shifts go backwards)
    pub shift: isize,
}

impl Roll {
    /// Creates a new roll operation.
    pub fn new(axis: usize, shift: isize) -> Self {
        Self { axis, shift }
    }
}

impl<T: Scalar> Op<T> for Roll {
    fn forward(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
        check_arity("Roll", inputs, 1)?;
        inputs[0].roll(self.axis, self.shift)
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        _inputs: &[&Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        Ok(vec![grad_output.roll(self.axis, -self.shift)?])
    }

    fn name(&self) -> &str {
        "Roll"
    }
}
