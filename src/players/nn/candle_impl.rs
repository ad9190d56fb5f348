use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};
use log::{debug, info};

use super::encoder::{encode_features, FEATURE_DIM};
use super::types::LearnedEvaluator;
use crate::board::BoardState;
use crate::errors::{EngineError, EngineResult};

const HIDDEN: usize = 32;

/// Two-layer MLP over the encoded features, run on the CPU
pub struct CandleEvaluator {
    device: Device,
    varmap: VarMap,
    hidden: Linear,
    output: Linear,
}

impl CandleEvaluator {
    /// Freshly initialised network
    pub fn new() -> EngineResult<Self> {
        Self::build(Device::Cpu).map_err(model_error)
    }

    /// Network with weights read from a safetensors file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let mut evaluator = Self::new()?;
        evaluator.varmap.load(path).map_err(model_error)?;
        info!("Loaded learned evaluator weights from {}", path.display());
        Ok(evaluator)
    }

    fn build(device: Device) -> candle_core::Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let hidden = linear(FEATURE_DIM, HIDDEN, vb.pp("hidden"))?;
        let output = linear(HIDDEN, 1, vb.pp("output"))?;
        Ok(Self {
            device,
            varmap,
            hidden,
            output,
        })
    }

    fn forward(&self, board: &BoardState) -> candle_core::Result<f32> {
        let xs = Tensor::from_vec(encode_features(board), (1, FEATURE_DIM), &self.device)?;
        let hidden = self.hidden.forward(&xs)?.relu()?;
        let value = self.output.forward(&hidden)?.tanh()?;
        let value = value.flatten_all()?.to_vec1::<f32>()?;
        Ok(value.first().copied().unwrap_or(0.0))
    }
}

impl LearnedEvaluator for CandleEvaluator {
    fn predict(&self, board: &BoardState) -> f64 {
        match self.forward(board) {
            Ok(v) => v as f64,
            Err(e) => {
                debug!("Candle forward failed, scoring as neutral: {}", e);
                0.0
            }
        }
    }

    fn name(&self) -> &'static str {
        "candle-mlp"
    }
}

fn model_error(e: candle_core::Error) -> EngineError {
    EngineError::Model(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_in_range() {
        let evaluator = CandleEvaluator::new().unwrap();
        let value = evaluator.predict(&BoardState::standard_opening());
        assert!((-1.0..=1.0).contains(&value));
    }
}
