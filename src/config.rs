use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::{Difficulty, Personality};
use crate::errors::{EngineError, EngineResult};
use crate::fraud::FraudPolicy;
use crate::personality::default_traits;

/// Absolute per-move ceiling imposed by the settlement layer
pub const MAX_CEILING_MS: u64 = 100;

/// One value per difficulty tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerTier<T> {
    pub easy: T,
    pub medium: T,
    pub hard: T,
}

impl<T: Copy> PerTier<T> {
    pub fn get(&self, difficulty: Difficulty) -> T {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSettings {
    pub soft_ms: u64,
    pub hard_ms: u64,
    pub search_depth: u32,
    pub skill_level: u8,
}

impl Default for PerTier<TierSettings> {
    fn default() -> Self {
        PerTier {
            easy: TierSettings {
                soft_ms: 5,
                hard_ms: 10,
                search_depth: 0,
                skill_level: 2,
            },
            medium: TierSettings {
                soft_ms: 50,
                hard_ms: 80,
                search_depth: 3,
                skill_level: 5,
            },
            hard: TierSettings {
                soft_ms: 90,
                hard_ms: 100,
                search_depth: 4,
                skill_level: 9,
            },
        }
    }
}

/// Immutable configuration of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AIConfig {
    pub difficulty: Difficulty,
    pub personality: Personality,
    pub skill_level: u8,
    pub search_depth: u32,
    pub soft_deadline_ms: u64,
    pub hard_deadline_ms: u64,
    pub capture_bias_rate: f64,
    pub aggression: f64,
    pub risk_tolerance: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl AIConfig {
    /// Tier and personality defaults from the built-in engine configuration
    pub fn new(difficulty: Difficulty, personality: Personality) -> Self {
        Self::for_tier(difficulty, personality, &EngineConfig::default())
    }

    pub fn for_tier(difficulty: Difficulty, personality: Personality, engine: &EngineConfig) -> Self {
        let tier = engine.tiers.get(difficulty);
        let (aggression, risk_tolerance) = default_traits(personality);
        let (soft, hard) = engine.clip_deadlines(tier.soft_ms, tier.hard_ms);
        AIConfig {
            difficulty,
            personality,
            skill_level: tier.skill_level,
            search_depth: tier.search_depth,
            soft_deadline_ms: soft,
            hard_deadline_ms: hard,
            capture_bias_rate: engine.capture_bias_rate,
            aggression,
            risk_tolerance,
            seed: None,
        }
    }

    pub fn soft_deadline(&self) -> Duration {
        Duration::from_millis(self.soft_deadline_ms)
    }

    pub fn hard_deadline(&self) -> Duration {
        Duration::from_millis(self.hard_deadline_ms)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(EngineError::Configuration(format!("{name} must be in [0, 1], got {v}")))
            }
        };
        unit("captureBiasRate", self.capture_bias_rate)?;
        unit("aggression", self.aggression)?;
        unit("riskTolerance", self.risk_tolerance)?;
        if !(1..=10).contains(&self.skill_level) {
            return Err(EngineError::Configuration(format!(
                "skillLevel must be in [1, 10], got {}",
                self.skill_level
            )));
        }
        if self.hard_deadline_ms > MAX_CEILING_MS {
            return Err(EngineError::Configuration(format!(
                "hardDeadlineMs {} exceeds the {}ms ceiling",
                self.hard_deadline_ms, MAX_CEILING_MS
            )));
        }
        if self.soft_deadline_ms > self.hard_deadline_ms {
            return Err(EngineError::Configuration(format!(
                "softDeadlineMs {} is after hardDeadlineMs {}",
                self.soft_deadline_ms, self.hard_deadline_ms
            )));
        }
        if self.difficulty != Difficulty::Easy && self.search_depth == 0 {
            return Err(EngineError::Configuration(
                "searchDepth must be at least 1 for tree search tiers".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the learned evaluator used by the hard tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSettings {
    pub learned_weight: f64,
    pub weights_path: Option<PathBuf>,
}

impl Default for HybridSettings {
    fn default() -> Self {
        Self {
            learned_weight: 0.6,
            weights_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pool_size: usize,
    pub max_pool_size: usize,
    pub outer_ceiling_ms: u64,
    pub safety_margin_ms: u64,
    /// Room left between a search's own stop and the point its answer is due
    pub return_margin_ms: u64,
    pub tiers: PerTier<TierSettings>,
    pub capture_bias_rate: f64,
    pub hybrid: HybridSettings,
    pub fraud: FraudPolicy,
    pub performance_window: usize,
    pub archive_capacity: usize,
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            max_pool_size: 10,
            outer_ceiling_ms: MAX_CEILING_MS,
            safety_margin_ms: 6,
            return_margin_ms: 4,
            tiers: PerTier::default(),
            capture_bias_rate: 0.70,
            hybrid: HybridSettings::default(),
            fraud: FraudPolicy::default(),
            performance_window: 64,
            archive_capacity: 256,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `MARSHAL_*` environment variables
    pub fn from_env() -> EngineResult<Self> {
        let mut config = EngineConfig::default();
        if let Some(size) = env_var::<usize>("MARSHAL_POOL_SIZE")? {
            config.pool_size = size;
            config.max_pool_size = config.max_pool_size.max(size);
        }
        if let Some(max) = env_var::<usize>("MARSHAL_MAX_POOL_SIZE")? {
            config.max_pool_size = max;
        }
        if let Some(ceiling) = env_var::<u64>("MARSHAL_CEILING_MS")? {
            config.outer_ceiling_ms = ceiling;
        }
        if let Some(seed) = env_var::<u64>("MARSHAL_SEED")? {
            config.seed = Some(seed);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.pool_size == 0 {
            return Err(EngineError::Configuration("pool_size must be positive".into()));
        }
        if self.max_pool_size < self.pool_size {
            return Err(EngineError::Configuration(format!(
                "max_pool_size {} is below pool_size {}",
                self.max_pool_size, self.pool_size
            )));
        }
        let margins = self.safety_margin_ms + self.return_margin_ms;
        if self.outer_ceiling_ms > MAX_CEILING_MS || self.outer_ceiling_ms <= margins {
            return Err(EngineError::Configuration(format!(
                "outer_ceiling_ms must be in ({}, {}], got {}",
                margins, MAX_CEILING_MS, self.outer_ceiling_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.capture_bias_rate) {
            return Err(EngineError::Configuration(format!(
                "capture_bias_rate must be in [0, 1], got {}",
                self.capture_bias_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.hybrid.learned_weight) {
            return Err(EngineError::Configuration(format!(
                "learned_weight must be in [0, 1], got {}",
                self.hybrid.learned_weight
            )));
        }
        if self.performance_window == 0 {
            return Err(EngineError::Configuration("performance_window must be positive".into()));
        }
        self.fraud.validate()?;
        for difficulty in crate::enums::DIFFICULTIES {
            let tier = self.tiers.get(difficulty);
            if tier.soft_ms > tier.hard_ms {
                return Err(EngineError::Configuration(format!(
                    "{difficulty}: soft_ms {} is after hard_ms {}",
                    tier.soft_ms, tier.hard_ms
                )));
            }
            if difficulty != Difficulty::Easy && tier.search_depth == 0 {
                return Err(EngineError::Configuration(format!(
                    "{difficulty}: search_depth must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Time the manager waits for an agent before answering with the fallback
    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.outer_ceiling_ms.saturating_sub(self.safety_margin_ms))
    }

    pub fn return_margin(&self) -> Duration {
        Duration::from_millis(self.return_margin_ms)
    }

    /// Latest point a search may run to and still hand its move back before the ceiling
    pub fn search_limit(&self) -> Duration {
        self.ceiling().saturating_sub(self.return_margin())
    }

    /// Clip a (soft, hard) pair so both fit under the search limit
    pub fn clip_deadlines(&self, soft_ms: u64, hard_ms: u64) -> (u64, u64) {
        let limit = self
            .outer_ceiling_ms
            .saturating_sub(self.safety_margin_ms + self.return_margin_ms);
        let hard = hard_ms.min(limit);
        (soft_ms.min(hard), hard)
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> EngineResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EngineError::Configuration(format!("{name}: cannot parse {raw:?}"))),
        Err(_) => Ok(None),
    }
}
