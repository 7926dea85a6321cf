use std::fmt;
use std::str::FromStr;

use burn::tensor::activation::{relu, sigmoid, tanh};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Gate/update activation used inside the recurrent cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nonlinearity {
    Sigmoid,
    Tanh,
    Relu,
    /// Piecewise-linear tanh: `clamp(x, -1, 1)`.
    QuantTanh,
    /// Piecewise-linear sigmoid: `clamp((x + 1) / 2, 0, 1)`.
    QuantSigm,
}

impl Nonlinearity {
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Nonlinearity::Sigmoid => sigmoid(x),
            Nonlinearity::Tanh => tanh(x),
            Nonlinearity::Relu => relu(x),
            Nonlinearity::QuantTanh => x.clamp(-1.0, 1.0),
            Nonlinearity::QuantSigm => x.add_scalar(1.0).mul_scalar(0.5).clamp(0.0, 1.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Nonlinearity::Sigmoid => "sigmoid",
            Nonlinearity::Tanh => "tanh",
            Nonlinearity::Relu => "relu",
            Nonlinearity::QuantTanh => "quant_tanh",
            Nonlinearity::QuantSigm => "quant_sigm",
        }
    }
}

impl fmt::Display for Nonlinearity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Nonlinearity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sigmoid" => Ok(Nonlinearity::Sigmoid),
            "tanh" => Ok(Nonlinearity::Tanh),
            "relu" => Ok(Nonlinearity::Relu),
            "quant_tanh" | "quanttanh" => Ok(Nonlinearity::QuantTanh),
            "quant_sigm" | "quantsigm" => Ok(Nonlinearity::QuantSigm),
            other => Err(ModelError::UnknownNonlinearity(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn apply(nl: Nonlinearity, values: Vec<f32>) -> Vec<f32> {
        let device = Default::default();
        let n = values.len();
        let x = Tensor::<B, 1>::from_data(TensorData::new(values, [n]), &device);
        nl.apply(x).into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn parses_snake_case_names() {
        assert_eq!("sigmoid".parse::<Nonlinearity>().unwrap(), Nonlinearity::Sigmoid);
        assert_eq!("quantTanh".parse::<Nonlinearity>().unwrap(), Nonlinearity::QuantTanh);
        assert_eq!("quant_sigm".parse::<Nonlinearity>().unwrap(), Nonlinearity::QuantSigm);
        assert!("softplus".parse::<Nonlinearity>().is_err());
    }

    #[test]
    fn quantized_variants_clamp() {
        assert_eq!(
            apply(Nonlinearity::QuantTanh, vec![-3.0, 0.25, 2.0]),
            vec![-1.0, 0.25, 1.0]
        );
        assert_eq!(
            apply(Nonlinearity::QuantSigm, vec![-3.0, 0.0, 3.0]),
            vec![0.0, 0.5, 1.0]
        );
    }

    #[test]
    fn zero_maps_through_standard_activations() {
        assert_eq!(apply(Nonlinearity::Tanh, vec![0.0]), vec![0.0]);
        assert_eq!(apply(Nonlinearity::Relu, vec![0.0]), vec![0.0]);
        assert_eq!(apply(Nonlinearity::Sigmoid, vec![0.0]), vec![0.5]);
    }
}
