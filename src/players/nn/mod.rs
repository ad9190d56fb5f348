// Learned evaluators for the hybrid tier
pub mod encoder;
pub mod linear;
pub mod noop_impl;
pub mod types;

#[cfg(feature = "candle")]
pub mod candle_impl;

use std::sync::Arc;

use log::info;

use crate::config::HybridSettings;
use crate::errors::EngineResult;

pub use self::linear::{LinearEvaluator, LinearWeights};
pub use self::noop_impl::NoopEvaluator;
pub use self::types::LearnedEvaluator;

/// Build the evaluator the hard tier shares across its agents.
/// A `.safetensors` path loads the Candle MLP when that feature is enabled;
/// anything else is read as linear JSON weights.
pub fn load_evaluator(settings: &HybridSettings) -> EngineResult<Arc<dyn LearnedEvaluator>> {
    let Some(path) = settings.weights_path.as_deref() else {
        return Ok(Arc::new(LinearEvaluator::default()));
    };

    #[cfg(feature = "candle")]
    if path.extension().is_some_and(|ext| ext == "safetensors") {
        return Ok(Arc::new(candle_impl::CandleEvaluator::load(path)?));
    }

    let evaluator = LinearEvaluator::from_path(path)?;
    info!("Loaded linear evaluator weights from {}", path.display());
    Ok(Arc::new(evaluator))
}
