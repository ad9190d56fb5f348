use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::actions::Move;
use crate::board::BoardState;
use crate::config::AIConfig;
use crate::deadline::SearchBudget;
use crate::fraud::FraudState;
use crate::players::{Decision, Evaluators, SearchOutcome, SearchState, SearchStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

/// Bounded latency history and decision counters
#[derive(Debug, Clone)]
pub struct PerformanceRecord {
    latencies: VecDeque<f64>,
    capacity: usize,
    pub captures: u64,
    pub non_captures: u64,
    pub decisions: u64,
    pub aborted: u64,
    pub fallbacks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub decisions: u64,
    pub captures: u64,
    pub non_captures: u64,
    pub aborted: u64,
    pub fallbacks: u64,
    pub mean_latency_ms: f64,
    pub p99_latency_ms: f64,
}

impl PerformanceRecord {
    pub fn new(capacity: usize) -> Self {
        Self {
            latencies: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            captures: 0,
            non_captures: 0,
            decisions: 0,
            aborted: 0,
            fallbacks: 0,
        }
    }

    pub fn record(&mut self, elapsed_ms: f64, mv: &Move, outcome: SearchOutcome) {
        if self.latencies.len() == self.capacity {
            self.latencies.pop_front();
        }
        self.latencies.push_back(elapsed_ms);
        self.decisions += 1;
        if mv.is_capture {
            self.captures += 1;
        } else {
            self.non_captures += 1;
        }
        if outcome == SearchOutcome::DeadlineAborted {
            self.aborted += 1;
        }
    }

    pub fn mean_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
    }

    pub fn p99_latency_ms(&self) -> f64 {
        let sorted = self
            .latencies
            .iter()
            .copied()
            .sorted_by(|a, b| a.total_cmp(b))
            .collect_vec();
        if sorted.is_empty() {
            return 0.0;
        }
        let rank = ((sorted.len() as f64) * 0.99).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }

    pub fn summary(&self) -> PerformanceSummary {
        PerformanceSummary {
            decisions: self.decisions,
            captures: self.captures,
            non_captures: self.non_captures,
            aborted: self.aborted,
            fallbacks: self.fallbacks,
            mean_latency_ms: self.mean_latency_ms(),
            p99_latency_ms: self.p99_latency_ms(),
        }
    }
}

/// One pooled decision maker
pub struct Agent {
    pub id: AgentId,
    pub config: AIConfig,
    strategy: SearchStrategy,
    state: SearchState,
    pub performance: PerformanceRecord,
    pub fraud: FraudState,
}

impl Agent {
    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Run the configured strategy; the state machine ends in Completed or Aborted
    pub fn select_move(&mut self, board: &BoardState, legal: &[Move], budget: &SearchBudget) -> Decision {
        self.state = SearchState::Searching;
        let decision = self.strategy.select_move(board, legal, budget);
        self.state = match decision.outcome {
            SearchOutcome::Completed => SearchState::Completed,
            SearchOutcome::DeadlineAborted => SearchState::Aborted,
        };
        debug!(
            "{} ({}) chose {:?} at depth {} after {} nodes in {:?}",
            self.id,
            self.strategy.name(),
            decision.mv.map(|m| (m.from, m.to)),
            decision.depth_reached,
            decision.nodes,
            budget.elapsed()
        );
        decision
    }

    /// Clear per-lease state before joining a new match
    pub fn reset_for_lease(&mut self) {
        self.fraud.reset();
        self.state = SearchState::Idle;
    }
}

/// Builds agents that share the read-only evaluators
pub struct AgentFactory {
    evaluators: Evaluators,
    performance_window: usize,
    master_seed: Option<u64>,
    next_id: AtomicU64,
}

impl AgentFactory {
    pub fn new(evaluators: Evaluators, performance_window: usize, master_seed: Option<u64>) -> Self {
        Self {
            evaluators,
            performance_window,
            master_seed,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn learned_name(&self) -> &'static str {
        self.evaluators.learned.name()
    }

    pub fn build(&self, config: AIConfig) -> Box<Agent> {
        let id = AgentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let seed = config
            .seed
            .or_else(|| self.master_seed.map(|m| m ^ id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15)));
        let strategy = SearchStrategy::for_config(&config, &self.evaluators, seed);
        Box::new(Agent {
            id,
            config,
            strategy,
            state: SearchState::Idle,
            performance: PerformanceRecord::new(self.performance_window),
            fraud: FraudState::default(),
        })
    }
}

impl fmt::Debug for AgentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentFactory")
            .field("learned", &self.learned_name())
            .field("performance_window", &self.performance_window)
            .field("next_id", &self.next_id)
            .finish()
    }
}
