use std::collections::VecDeque;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::config::PerTier;
use crate::enums::Difficulty;
use crate::errors::{EngineError, EngineResult};

/// Tuning for the timing-anomaly detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudPolicy {
    pub window: usize,
    /// Latency below which a decision is implausible; 0 disables the check
    pub implausible_ms: PerTier<f64>,
    /// Minimum coefficient of variation a genuine search shows; 0 disables
    pub min_cv: PerTier<f64>,
    pub min_samples: usize,
    pub rise: f64,
    pub decay: f64,
    pub alert_threshold: f64,
}

impl Default for FraudPolicy {
    fn default() -> Self {
        Self {
            window: 32,
            implausible_ms: PerTier {
                easy: 0.0,
                medium: 5.0,
                hard: 5.0,
            },
            min_cv: PerTier {
                easy: 0.0,
                medium: 0.05,
                hard: 0.05,
            },
            min_samples: 8,
            rise: 0.25,
            decay: 0.02,
            alert_threshold: 0.6,
        }
    }
}

impl FraudPolicy {
    pub fn validate(&self) -> EngineResult<()> {
        if self.window == 0 || self.min_samples == 0 {
            return Err(EngineError::Configuration(
                "fraud window and min_samples must be positive".into(),
            ));
        }
        for (name, v) in [
            ("rise", self.rise),
            ("decay", self.decay),
            ("alert_threshold", self.alert_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(EngineError::Configuration(format!(
                    "fraud {name} must be in [0, 1], got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Rolling timing window and derived score, owned by the leased agent
#[derive(Debug, Clone, Default)]
pub struct FraudState {
    window: VecDeque<f64>,
    score: f64,
    alerted: bool,
}

impl FraudState {
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        *self = FraudState::default();
    }

    fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    fn coefficient_of_variation(&self) -> Option<f64> {
        let mean = self.mean();
        if self.window.len() < 2 || mean <= 0.0 {
            return None;
        }
        let variance = self
            .window
            .iter()
            .map(|x| (x - mean).powi(2))
            .sum::<f64>()
            / self.window.len() as f64;
        Some(variance.sqrt() / mean)
    }
}

/// Advisory signal attached to a move response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudAlert {
    pub agent_id: AgentId,
    pub score: f64,
    pub window_mean_ms: f64,
    pub coefficient_of_variation: Option<f64>,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FraudDetector {
    policy: FraudPolicy,
}

impl FraudDetector {
    pub fn new(policy: FraudPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FraudPolicy {
        &self.policy
    }

    pub fn score(&self, state: &FraudState) -> f64 {
        state.score
    }

    /// Fold one decision latency into the window and update the score
    pub fn record_decision(
        &self,
        agent_id: AgentId,
        state: &mut FraudState,
        difficulty: Difficulty,
        elapsed_ms: f64,
    ) -> Option<FraudAlert> {
        if state.window.len() == self.policy.window {
            state.window.pop_front();
        }
        state.window.push_back(elapsed_ms);

        let mut suspicion: f64 = 0.0;
        let mut reasons = Vec::new();

        let floor = self.policy.implausible_ms.get(difficulty);
        if floor > 0.0 {
            if elapsed_ms < floor {
                suspicion += 0.5;
                reasons.push(format!("decision in {elapsed_ms:.2}ms, below {floor}ms"));
            }
            let mean = state.mean();
            if mean < floor {
                suspicion += 0.3;
                reasons.push(format!("window mean {mean:.2}ms, below {floor}ms"));
            }
        }

        let min_cv = self.policy.min_cv.get(difficulty);
        let cv = state.coefficient_of_variation();
        if min_cv > 0.0 && state.window.len() >= self.policy.min_samples {
            if let Some(cv) = cv.filter(|cv| *cv < min_cv) {
                suspicion += 0.4;
                reasons.push(format!("timing variation {cv:.3}, below {min_cv}"));
            }
        }

        let suspicion = suspicion.min(1.0);
        if suspicion > 0.0 {
            state.score += self.policy.rise * suspicion * (1.0 - state.score);
        } else {
            state.score *= 1.0 - self.policy.decay;
        }

        if state.score < self.policy.alert_threshold {
            state.alerted = false;
            return None;
        }
        if !state.alerted {
            warn!(
                "Fraud score for {} crossed {:.2}: {:.3} ({})",
                agent_id,
                self.policy.alert_threshold,
                state.score,
                reasons.join("; ")
            );
            state.alerted = true;
        }
        Some(FraudAlert {
            agent_id,
            score: state.score,
            window_mean_ms: state.mean(),
            coefficient_of_variation: cv,
            reasons,
        })
    }
}
