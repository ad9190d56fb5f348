use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::encoder::{default_weights, encode_features, FEATURE_DIM};
use super::types::LearnedEvaluator;
use crate::board::BoardState;
use crate::errors::{EngineError, EngineResult};

/// Weights file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearWeights {
    pub bias: f32,
    pub scale: f32,
    pub weights: Vec<f32>,
}

impl Default for LinearWeights {
    fn default() -> Self {
        Self {
            bias: 0.0,
            scale: 0.25,
            weights: default_weights(),
        }
    }
}

/// `tanh(scale * (bias + w · features))`
#[derive(Debug, Clone, Default)]
pub struct LinearEvaluator {
    weights: LinearWeights,
}

impl LinearEvaluator {
    pub fn new(weights: LinearWeights) -> EngineResult<Self> {
        if weights.weights.len() != FEATURE_DIM {
            return Err(EngineError::Model(format!(
                "expected {} weights, found {}",
                FEATURE_DIM,
                weights.weights.len()
            )));
        }
        Ok(Self { weights })
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let weights: LinearWeights =
            serde_json::from_str(json).map_err(|e| EngineError::Model(e.to_string()))?;
        Self::new(weights)
    }

    pub fn from_path(path: &Path) -> EngineResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| EngineError::Model(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn weights(&self) -> &LinearWeights {
        &self.weights
    }
}

impl LearnedEvaluator for LinearEvaluator {
    fn predict(&self, board: &BoardState) -> f64 {
        let features = encode_features(board);
        let dot: f32 = features
            .iter()
            .zip(&self.weights.weights)
            .map(|(x, w)| x * w)
            .sum();
        ((self.weights.bias + dot) * self.weights.scale).tanh() as f64
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}
