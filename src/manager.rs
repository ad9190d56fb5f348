use std::collections::{HashMap, VecDeque};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::actions::{validate_request, Move};
use crate::agent::{Agent, AgentFactory, AgentId, PerformanceSummary};
use crate::board::BoardState;
use crate::config::{AIConfig, EngineConfig};
use crate::deadline::SearchBudget;
use crate::enums::{Difficulty, Personality, Player, DIFFICULTIES, PERSONALITIES, PLAYERS};
use crate::errors::{EngineError, EngineResult, MatchId, ValidationError};
use crate::evaluator::BoardEvaluator;
use crate::fraud::{FraudAlert, FraudDetector};
use crate::players::nn::{load_evaluator, LearnedEvaluator};
use crate::players::{Decision, Evaluators, SearchOutcome};

/// One pool per difficulty and personality
pub type PoolKey = (Difficulty, Personality);

/// Who sits in a seat of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatConfig {
    Agent(AIConfig),
    External,
}

impl SeatConfig {
    pub fn agent(difficulty: Difficulty, personality: Personality) -> Self {
        SeatConfig::Agent(AIConfig::new(difficulty, personality))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Created,
    InProgress,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    Winner(Player),
    Draw,
    Aborted,
}

/// Where the returned move came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Completed,
    DeadlineAborted,
    /// The agent missed the ceiling; a precomputed random legal move was returned
    Fallback,
}

impl From<SearchOutcome> for DecisionSource {
    fn from(outcome: SearchOutcome) -> Self {
        match outcome {
            SearchOutcome::Completed => DecisionSource::Completed,
            SearchOutcome::DeadlineAborted => DecisionSource::DeadlineAborted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResponse {
    #[serde(rename = "move")]
    pub mv: Move,
    pub elapsed_ms: f64,
    pub fraud_score: f64,
    pub fraud_alert: Option<FraudAlert>,
    pub source: DecisionSource,
    pub depth_reached: u32,
    pub agent_id: AgentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatSummary {
    pub player: Player,
    pub agent_id: Option<AgentId>,
    pub difficulty: Option<Difficulty>,
    pub personality: Option<Personality>,
    pub performance: Option<PerformanceSummary>,
    pub fraud_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub result: MatchResult,
    pub total_moves: u32,
    pub duration_ms: f64,
    pub seats: Vec<SeatSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub total_moves: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub difficulty: Difficulty,
    pub personality: Personality,
    pub total: usize,
    pub idle: usize,
    pub leased: usize,
}

/// Arena of agent slots with a lease table beside it.
/// A leased slot is empty: its agent lives in the match holding the lease.
struct AgentPool {
    default_config: AIConfig,
    slots: Vec<Option<Box<Agent>>>,
    free: VecDeque<usize>,
    lease_table: Vec<Option<(MatchId, AgentId)>>,
}

impl AgentPool {
    fn new(default_config: AIConfig, size: usize, factory: &AgentFactory) -> Self {
        AgentPool {
            slots: (0..size)
                .map(|_| Some(factory.build(default_config.clone())))
                .collect(),
            free: (0..size).collect(),
            lease_table: vec![None; size],
            default_config,
        }
    }

    fn lease(
        &mut self,
        match_id: &str,
        config: &AIConfig,
        factory: &AgentFactory,
        max_size: usize,
    ) -> Option<(usize, Box<Agent>, Option<AgentId>)> {
        let slot = match self.free.pop_front() {
            Some(slot) => slot,
            None if self.slots.len() < max_size => {
                self.slots.push(None);
                self.lease_table.push(None);
                debug!(
                    "Growing {}/{} pool to {}",
                    config.difficulty,
                    config.personality,
                    self.slots.len()
                );
                self.slots.len() - 1
            }
            None => return None,
        };

        let (mut agent, retired) = match self.slots[slot].take() {
            Some(agent) if agent.config == *config => (agent, None),
            Some(stale) => (factory.build(config.clone()), Some(stale.id)),
            None => (factory.build(config.clone()), None),
        };
        agent.reset_for_lease();
        self.lease_table[slot] = Some((match_id.to_string(), agent.id));
        Some((slot, agent, retired))
    }

    /// Put an agent back; a lost one is replaced by a fresh default agent
    fn release(&mut self, slot: usize, agent: Option<Box<Agent>>, factory: &AgentFactory) {
        let agent = agent.unwrap_or_else(|| factory.build(self.default_config.clone()));
        self.slots[slot] = Some(agent);
        self.lease_table[slot] = None;
        self.free.push_back(slot);
    }

    fn leased(&self) -> usize {
        self.lease_table.iter().filter(|l| l.is_some()).count()
    }
}

/// Where a leased agent is between requests
enum Custody {
    Idle(Box<Agent>),
    /// Still running a search that missed the ceiling
    Searching {
        handle: JoinHandle<(Box<Agent>, Decision)>,
        cancel: Arc<AtomicBool>,
    },
    /// The search task panicked and took the agent with it
    Lost,
}

struct LeasedSeat {
    key: PoolKey,
    slot: usize,
    agent_id: AgentId,
    config: AIConfig,
    custody: Custody,
    last_fraud_score: f64,
    pending_fallbacks: u64,
}

enum Seat {
    External,
    Leased(LeasedSeat),
}

struct MatchRecord {
    seats: [Seat; 2],
    status: MatchStatus,
    total_moves: u32,
    started: Instant,
}

struct Inner {
    config: EngineConfig,
    factory: AgentFactory,
    detector: FraudDetector,
    pools: Mutex<HashMap<PoolKey, AgentPool>>,
    matches: Mutex<HashMap<MatchId, Arc<AsyncMutex<MatchRecord>>>>,
    archive: Mutex<VecDeque<MatchSummary>>,
    fraud_scores: Mutex<HashMap<AgentId, f64>>,
    released: Notify,
    shut_down: AtomicBool,
}

/// Short critical sections only; a poisoned lock still holds consistent data
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Owns every agent, leases them to matches and answers move requests under deadline
#[derive(Clone)]
pub struct AgentManager {
    inner: Arc<Inner>,
}

impl AgentManager {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let learned = load_evaluator(&config.hybrid)?;
        Self::with_learned_evaluator(config, learned)
    }

    pub fn with_learned_evaluator(
        config: EngineConfig,
        learned: Arc<dyn LearnedEvaluator>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let evaluators = Evaluators {
            board: Arc::new(BoardEvaluator::default()),
            learned,
            learned_weight: config.hybrid.learned_weight,
        };
        let factory = AgentFactory::new(evaluators, config.performance_window, config.seed);

        let mut pools = HashMap::new();
        for difficulty in DIFFICULTIES {
            for personality in PERSONALITIES {
                let default_config = AIConfig::for_tier(difficulty, personality, &config);
                pools.insert(
                    (difficulty, personality),
                    AgentPool::new(default_config, config.pool_size, &factory),
                );
            }
        }
        info!(
            "Built {} agent pools of {} (max {}), learned evaluator: {}",
            pools.len(),
            config.pool_size,
            config.max_pool_size,
            factory.learned_name()
        );

        Ok(AgentManager {
            inner: Arc::new(Inner {
                detector: FraudDetector::new(config.fraud.clone()),
                config,
                factory,
                pools: Mutex::new(pools),
                matches: Mutex::new(HashMap::new()),
                archive: Mutex::new(VecDeque::new()),
                fraud_scores: Mutex::new(HashMap::new()),
                released: Notify::new(),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            Err(EngineError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Lease agents for both seats, or none at all
    pub fn create_match(&self, first: SeatConfig, second: SeatConfig) -> EngineResult<MatchId> {
        self.ensure_running()?;
        for seat in [&first, &second] {
            if let SeatConfig::Agent(config) = seat {
                config.validate()?;
            }
        }

        let match_id = Uuid::new_v4().to_string();
        let seats = {
            let mut pools = lock(&self.inner.pools);
            let first = self.lease_seat(&mut pools, &match_id, &first)?;
            match self.lease_seat(&mut pools, &match_id, &second) {
                Ok(second) => [first, second],
                Err(e) => {
                    if let Seat::Leased(seat) = first {
                        let agent = match seat.custody {
                            Custody::Idle(agent) => Some(agent),
                            _ => None,
                        };
                        self.return_to_pool(&mut pools, seat.key, seat.slot, agent);
                    }
                    return Err(e);
                }
            }
        };

        let record = MatchRecord {
            seats,
            status: MatchStatus::Created,
            total_moves: 0,
            started: Instant::now(),
        };
        lock(&self.inner.matches).insert(match_id.clone(), Arc::new(AsyncMutex::new(record)));
        info!(
            "Created match {} ({} vs {})",
            match_id,
            seat_label(&first),
            seat_label(&second)
        );
        Ok(match_id)
    }

    /// Like `create_match`, but waits up to `wait` for a lease to free up
    pub async fn create_match_waiting(
        &self,
        first: SeatConfig,
        second: SeatConfig,
        wait: Duration,
    ) -> EngineResult<MatchId> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.create_match(first.clone(), second.clone()) {
                Err(e) if e.is_resource_exhausted() => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(e);
                    }
                }
                other => return other,
            }
        }
    }

    fn lease_seat(
        &self,
        pools: &mut HashMap<PoolKey, AgentPool>,
        match_id: &str,
        seat: &SeatConfig,
    ) -> EngineResult<Seat> {
        let config = match seat {
            SeatConfig::External => return Ok(Seat::External),
            SeatConfig::Agent(config) => config,
        };
        let key = (config.difficulty, config.personality);
        let pool = pools
            .get_mut(&key)
            .ok_or_else(|| EngineError::exhausted(key.0, key.1))?;
        let (slot, agent, retired) = pool
            .lease(match_id, config, &self.inner.factory, self.inner.config.max_pool_size)
            .ok_or_else(|| EngineError::exhausted(key.0, key.1))?;
        if let Some(retired) = retired {
            debug!("Rebuilt {} as {} for a different config", retired, agent.id);
            self.forget_agent(retired);
        }
        debug!("Leased {} from slot {} to match {}", agent.id, slot, match_id);

        Ok(Seat::Leased(LeasedSeat {
            key,
            slot,
            agent_id: agent.id,
            config: config.clone(),
            custody: Custody::Idle(agent),
            last_fraud_score: 0.0,
            pending_fallbacks: 0,
        }))
    }

    fn return_to_pool(
        &self,
        pools: &mut HashMap<PoolKey, AgentPool>,
        key: PoolKey,
        slot: usize,
        agent: Option<Box<Agent>>,
    ) {
        if let Some(pool) = pools.get_mut(&key) {
            pool.release(slot, agent, &self.inner.factory);
        }
    }

    fn find_match(&self, match_id: &str) -> EngineResult<Arc<AsyncMutex<MatchRecord>>> {
        lock(&self.inner.matches)
            .get(match_id)
            .cloned()
            .ok_or_else(|| EngineError::match_not_found(match_id))
    }

    fn forget_agent(&self, agent_id: AgentId) {
        lock(&self.inner.fraud_scores).remove(&agent_id);
    }

    /// Pick a move for the side to move. `Ok(None)` when there is nothing to play.
    pub async fn request_move(
        &self,
        match_id: &str,
        board: BoardState,
        legal: Vec<Move>,
    ) -> EngineResult<Option<MoveResponse>> {
        let started = Instant::now();
        self.ensure_running()?;
        validate_request(&board, &legal)?;

        let record = self.find_match(match_id)?;
        let mut record = record.lock().await;
        if matches!(record.status, MatchStatus::Completed | MatchStatus::Aborted) {
            return Err(EngineError::not_active(match_id, "match has ended"));
        }
        if legal.is_empty() {
            debug!("Match {}: no legal moves for player {}", match_id, board.current_player);
            return Ok(None);
        }

        let player = board.current_player;
        let seat = match &mut record.seats[player.seat()] {
            Seat::Leased(seat) => seat,
            Seat::External => return Err(ValidationError::ExternalSeat { player }.into()),
        };

        let fallback = legal[rand::thread_rng().gen_range(0..legal.len())];
        let ceiling_at = started + self.inner.config.ceiling();
        let response = self
            .dispatch(seat, board, legal, fallback, started, ceiling_at)
            .await;

        record.status = MatchStatus::InProgress;
        record.total_moves += 1;
        lock(&self.inner.fraud_scores).insert(response.agent_id, response.fraud_score);
        debug!(
            "Match {} move {}: {} via {:?} in {:.2}ms",
            match_id, record.total_moves, response.mv, response.source, response.elapsed_ms
        );
        Ok(Some(response))
    }

    /// Run the seat's agent on the blocking pool, answering with `fallback`
    /// if it has not finished by `ceiling_at`
    async fn dispatch(
        &self,
        seat: &mut LeasedSeat,
        board: BoardState,
        legal: Vec<Move>,
        fallback: Move,
        started: Instant,
        ceiling_at: Instant,
    ) -> MoveResponse {
        let Some(agent) = self.reclaim(seat, ceiling_at).await else {
            warn!("{} is still finishing an abandoned search; using fallback", seat.agent_id);
            seat.pending_fallbacks += 1;
            return fallback_response(seat, fallback, started);
        };

        let ceiling = self.inner.config.ceiling();
        let limit = self.inner.config.search_limit();
        let cancel = Arc::new(AtomicBool::new(false));
        let budget = SearchBudget::starting_at(
            started,
            agent
                .config
                .soft_deadline()
                .saturating_sub(self.inner.config.return_margin())
                .min(limit),
            agent.config.hard_deadline().min(limit),
            Arc::clone(&cancel),
        );
        let mut handle = tokio::task::spawn_blocking(move || {
            let mut agent = agent;
            let decision = agent.select_move(&board, &legal, &budget);
            (agent, decision)
        });

        match tokio::time::timeout_at(ceiling_at.into(), &mut handle).await {
            Ok(Ok((mut agent, decision))) => {
                let elapsed_ms = millis(started.elapsed());
                let mv = decision.mv.unwrap_or(fallback);
                agent.performance.record(elapsed_ms, &mv, decision.outcome);
                let fraud_alert = self.inner.detector.record_decision(
                    agent.id,
                    &mut agent.fraud,
                    agent.config.difficulty,
                    elapsed_ms,
                );
                seat.last_fraud_score = agent.fraud.score();
                seat.custody = Custody::Idle(agent);
                MoveResponse {
                    mv,
                    elapsed_ms,
                    fraud_score: seat.last_fraud_score,
                    fraud_alert,
                    source: decision.outcome.into(),
                    depth_reached: decision.depth_reached,
                    agent_id: seat.agent_id,
                }
            }
            Ok(Err(join_error)) => {
                error!("Search task for {} failed: {}", seat.agent_id, join_error);
                seat.custody = Custody::Lost;
                seat.pending_fallbacks += 1;
                fallback_response(seat, fallback, started)
            }
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                warn!(
                    "{} missed the {:?} ceiling; answering with fallback",
                    seat.agent_id, ceiling
                );
                seat.custody = Custody::Searching { handle, cancel };
                seat.pending_fallbacks += 1;
                fallback_response(seat, fallback, started)
            }
        }
    }

    /// Get the seat's agent back in hand, waiting for an abandoned search no later than `until`
    async fn reclaim(&self, seat: &mut LeasedSeat, until: Instant) -> Option<Box<Agent>> {
        let mut agent = match mem::replace(&mut seat.custody, Custody::Lost) {
            Custody::Idle(agent) => agent,
            Custody::Searching { mut handle, cancel } => {
                match tokio::time::timeout_at(until.into(), &mut handle).await {
                    Ok(Ok((agent, _))) => agent,
                    Ok(Err(join_error)) => {
                        error!("Search task for {} failed: {}", seat.agent_id, join_error);
                        self.replace_lost(seat)
                    }
                    Err(_) => {
                        seat.custody = Custody::Searching { handle, cancel };
                        return None;
                    }
                }
            }
            Custody::Lost => self.replace_lost(seat),
        };
        agent.performance.fallbacks += mem::take(&mut seat.pending_fallbacks);
        Some(agent)
    }

    /// Build a stand-in for an agent whose task died, keeping the lease table honest
    fn replace_lost(&self, seat: &mut LeasedSeat) -> Box<Agent> {
        let mut agent = self.inner.factory.build(seat.config.clone());
        agent.reset_for_lease();
        let mut pools = lock(&self.inner.pools);
        if let Some(entry) = pools
            .get_mut(&seat.key)
            .and_then(|pool| pool.lease_table.get_mut(seat.slot))
        {
            if let Some((_, id)) = entry {
                *id = agent.id;
            }
        }
        info!("Replaced lost {} with {}", seat.agent_id, agent.id);
        self.forget_agent(seat.agent_id);
        seat.agent_id = agent.id;
        agent
    }

    /// Release both leases and archive the match
    pub async fn end_match(&self, match_id: &str, result: MatchResult) -> EngineResult<MatchSummary> {
        let record = self.find_match(match_id)?;
        let mut record = record.lock().await;
        if matches!(record.status, MatchStatus::Completed | MatchStatus::Aborted) {
            return Err(EngineError::not_active(match_id, "match has already ended"));
        }
        record.status = match result {
            MatchResult::Aborted => MatchStatus::Aborted,
            _ => MatchStatus::Completed,
        };
        // requests already queued on the record now see the final status
        lock(&self.inner.matches).remove(match_id);

        let seats = mem::replace(&mut record.seats, [Seat::External, Seat::External]);
        let mut summaries = Vec::with_capacity(2);
        let mut returned = Vec::with_capacity(2);
        for (seat, player) in seats.into_iter().zip(PLAYERS) {
            match seat {
                Seat::External => summaries.push(SeatSummary {
                    player,
                    agent_id: None,
                    difficulty: None,
                    personality: None,
                    performance: None,
                    fraud_score: None,
                }),
                Seat::Leased(mut seat) => {
                    let agent = collect_agent(&mut seat).await;
                    if agent.is_none() {
                        self.forget_agent(seat.agent_id);
                    }
                    summaries.push(SeatSummary {
                        player,
                        agent_id: Some(seat.agent_id),
                        difficulty: Some(seat.config.difficulty),
                        personality: Some(seat.config.personality),
                        performance: agent.as_ref().map(|a| a.performance.summary()),
                        fraud_score: Some(agent.as_ref().map_or(seat.last_fraud_score, |a| a.fraud.score())),
                    });
                    returned.push((seat.key, seat.slot, agent));
                }
            }
        }

        {
            let mut pools = lock(&self.inner.pools);
            for (key, slot, agent) in returned {
                self.return_to_pool(&mut pools, key, slot, agent);
            }
        }
        self.inner.released.notify_waiters();

        let summary = MatchSummary {
            match_id: match_id.to_string(),
            status: record.status,
            result,
            total_moves: record.total_moves,
            duration_ms: millis(record.started.elapsed()),
            seats: summaries,
        };
        {
            let mut archive = lock(&self.inner.archive);
            if archive.len() == self.inner.config.archive_capacity {
                archive.pop_front();
            }
            if self.inner.config.archive_capacity > 0 {
                archive.push_back(summary.clone());
            }
        }
        info!(
            "Ended match {} after {} moves: {:?}",
            match_id, summary.total_moves, result
        );
        Ok(summary)
    }

    pub async fn match_status(&self, match_id: &str) -> EngineResult<MatchInfo> {
        if let Ok(record) = self.find_match(match_id) {
            let record = record.lock().await;
            return Ok(MatchInfo {
                match_id: match_id.to_string(),
                status: record.status,
                total_moves: record.total_moves,
            });
        }
        lock(&self.inner.archive)
            .iter()
            .rev()
            .find(|s| s.match_id == match_id)
            .map(|s| MatchInfo {
                match_id: s.match_id.clone(),
                status: s.status,
                total_moves: s.total_moves,
            })
            .ok_or_else(|| EngineError::match_not_found(match_id))
    }

    pub fn archived_matches(&self) -> Vec<MatchSummary> {
        lock(&self.inner.archive).iter().cloned().collect()
    }

    /// Every live lease as (agent, match)
    pub fn leased_agents(&self) -> Vec<(AgentId, MatchId)> {
        lock(&self.inner.pools)
            .values()
            .flat_map(|pool| pool.lease_table.iter().flatten())
            .map(|(match_id, agent_id)| (*agent_id, match_id.clone()))
            .collect()
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        let pools = lock(&self.inner.pools);
        let mut stats: Vec<PoolStats> = pools
            .iter()
            .map(|(&(difficulty, personality), pool)| PoolStats {
                difficulty,
                personality,
                total: pool.slots.len(),
                idle: pool.free.len(),
                leased: pool.leased(),
            })
            .collect();
        stats.sort_by_key(|s| (s.difficulty, s.personality));
        stats
    }

    /// Latest published fraud score for an agent that has played at least one move
    pub fn fraud_score(&self, agent_id: AgentId) -> Option<f64> {
        lock(&self.inner.fraud_scores).get(&agent_id).copied()
    }

    /// Refuse new work, cancel running searches and drop every agent
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let matches: Vec<_> = lock(&self.inner.matches).drain().collect();
        for (_, record) in &matches {
            if let Ok(record) = record.try_lock() {
                for seat in &record.seats {
                    if let Seat::Leased(LeasedSeat {
                        custody: Custody::Searching { cancel, .. },
                        ..
                    }) = seat
                    {
                        cancel.store(true, Ordering::Relaxed);
                    }
                }
            }
        }
        lock(&self.inner.pools).clear();
        lock(&self.inner.fraud_scores).clear();
        self.inner.released.notify_waiters();
        info!("Agent manager shut down; dropped {} active matches", matches.len());
    }
}

fn fallback_response(seat: &LeasedSeat, mv: Move, started: Instant) -> MoveResponse {
    MoveResponse {
        mv,
        elapsed_ms: millis(started.elapsed()),
        fraud_score: seat.last_fraud_score,
        fraud_alert: None,
        source: DecisionSource::Fallback,
        depth_reached: 0,
        agent_id: seat.agent_id,
    }
}

/// Take the agent out of a seat at match end, stopping any search still running
async fn collect_agent(seat: &mut LeasedSeat) -> Option<Box<Agent>> {
    let mut agent = match mem::replace(&mut seat.custody, Custody::Lost) {
        Custody::Idle(agent) => Some(agent),
        Custody::Searching { mut handle, cancel } => {
            cancel.store(true, Ordering::Relaxed);
            let joined = match (&mut handle).now_or_never() {
                Some(joined) => joined,
                None => handle.await,
            };
            match joined {
                Ok((agent, _)) => Some(agent),
                Err(join_error) => {
                    error!("Search task for {} failed: {}", seat.agent_id, join_error);
                    None
                }
            }
        }
        Custody::Lost => None,
    };
    if let Some(agent) = agent.as_mut() {
        agent.performance.fallbacks += mem::take(&mut seat.pending_fallbacks);
    }
    agent
}

fn seat_label(seat: &SeatConfig) -> String {
    match seat {
        SeatConfig::Agent(config) => format!("{}/{}", config.difficulty, config.personality),
        SeatConfig::External => "external".to_string(),
    }
}

/// Async boundary the network layer drives
#[async_trait]
pub trait MoveEngine: Send + Sync {
    async fn create_match(&self, first: SeatConfig, second: SeatConfig) -> EngineResult<MatchId>;

    async fn request_move(
        &self,
        match_id: &str,
        board: BoardState,
        legal: Vec<Move>,
    ) -> EngineResult<Option<MoveResponse>>;

    async fn end_match(&self, match_id: &str, result: MatchResult) -> EngineResult<MatchSummary>;
}

#[async_trait]
impl MoveEngine for AgentManager {
    async fn create_match(&self, first: SeatConfig, second: SeatConfig) -> EngineResult<MatchId> {
        AgentManager::create_match(self, first, second)
    }

    async fn request_move(
        &self,
        match_id: &str,
        board: BoardState,
        legal: Vec<Move>,
    ) -> EngineResult<Option<MoveResponse>> {
        AgentManager::request_move(self, match_id, board, legal).await
    }

    async fn end_match(&self, match_id: &str, result: MatchResult) -> EngineResult<MatchSummary> {
        AgentManager::end_match(self, match_id, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Piece, Square};
    use crate::enums::PieceKind;
    use crate::movegen::pseudo_moves;
    use crate::players::nn::LinearEvaluator;
    use futures::future::join_all;
    use std::collections::HashSet;

    fn sq(row: u8, col: u8) -> Square {
        Square::new(row, col).unwrap()
    }

    /// Marshals plus two pieces a side, player one to move
    fn sparse_board(variant: usize) -> BoardState {
        let v = variant as u8;
        let mut board = BoardState::empty(Player::One);
        let pieces = [
            (0, 4, PieceKind::Marshal, Player::One),
            (3, v % 9, PieceKind::General, Player::One),
            (2, (v + 3) % 9, PieceKind::Rider, Player::One),
            (8, 4, PieceKind::Marshal, Player::Two),
            (5, (v + 2) % 9, PieceKind::Archer, Player::Two),
            (6, (v + 5) % 9, PieceKind::Lieutenant, Player::Two),
        ];
        for (row, col, kind, owner) in pieces {
            board.place(sq(row, col), Piece::new(kind, owner)).unwrap();
        }
        board
    }

    fn manager_with(config: EngineConfig) -> AgentManager {
        AgentManager::with_learned_evaluator(config, Arc::new(LinearEvaluator::default())).unwrap()
    }

    fn manager(pool_size: usize) -> AgentManager {
        manager_with(EngineConfig {
            pool_size,
            max_pool_size: pool_size,
            seed: Some(7),
            ..EngineConfig::default()
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_match_lifecycle() {
        let _ = env_logger::builder().is_test(true).try_init();
        let manager = manager(2);
        let id = manager
            .create_match(SeatConfig::agent(Difficulty::Medium, Personality::Balanced), SeatConfig::External)
            .unwrap();
        assert_eq!(manager.match_status(&id).await.unwrap().status, MatchStatus::Created);

        let board = sparse_board(0);
        let legal = pseudo_moves(&board);
        let response = manager.request_move(&id, board, legal.clone()).await.unwrap().unwrap();
        assert!(legal.contains(&response.mv));
        assert!(response.elapsed_ms < 100.0);
        assert_eq!(manager.fraud_score(response.agent_id), Some(response.fraud_score));

        let info = manager.match_status(&id).await.unwrap();
        assert_eq!((info.status, info.total_moves), (MatchStatus::InProgress, 1));

        let summary = manager.end_match(&id, MatchResult::Winner(Player::One)).await.unwrap();
        assert_eq!(summary.total_moves, 1);
        assert_eq!(summary.seats[0].agent_id, Some(response.agent_id));
        assert_eq!(summary.seats[0].performance.as_ref().unwrap().decisions, 1);
        assert_eq!(summary.seats[1].agent_id, None);

        assert_eq!(manager.match_status(&id).await.unwrap().status, MatchStatus::Completed);
        assert!(matches!(
            manager.request_move(&id, board, legal).await,
            Err(EngineError::MatchNotFound { .. })
        ));
        assert!(manager.leased_agents().is_empty());
        assert_eq!(manager.archived_matches().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_terminal_position_returns_none() {
        let manager = manager(1);
        let id = manager
            .create_match(SeatConfig::agent(Difficulty::Hard, Personality::Tactical), SeatConfig::External)
            .unwrap();
        let response = manager.request_move(&id, sparse_board(1), Vec::new()).await.unwrap();
        assert!(response.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejects_external_seat_and_bad_input() {
        let manager = manager(1);
        let id = manager
            .create_match(SeatConfig::agent(Difficulty::Easy, Personality::Aggressive), SeatConfig::External)
            .unwrap();

        let mut board = sparse_board(2);
        board.current_player = Player::Two;
        let legal = pseudo_moves(&board);
        assert_eq!(
            manager.request_move(&id, board, legal).await,
            Err(EngineError::Validation(ValidationError::ExternalSeat { player: Player::Two }))
        );

        let board = sparse_board(2);
        let mut bad = pseudo_moves(&board);
        bad[0].is_capture = !bad[0].is_capture;
        assert!(matches!(
            manager.request_move(&id, board, bad).await,
            Err(EngineError::Validation(ValidationError::InvalidMove { index: 0, .. }))
        ));
        assert!(matches!(
            manager.request_move("no-such-match", board, Vec::new()).await,
            Err(EngineError::MatchNotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lease_exclusivity_under_contention() {
        let manager = manager(10);
        let tasks = (0..50).map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager.create_match(
                    SeatConfig::agent(Difficulty::Hard, Personality::Aggressive),
                    SeatConfig::agent(Difficulty::Medium, Personality::Defensive),
                )
            })
        });
        let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

        let created: Vec<MatchId> = results.iter().filter_map(|r| r.clone().ok()).collect();
        assert_eq!(created.len(), 10);
        for result in &results {
            if let Err(e) = result {
                assert!(e.is_resource_exhausted(), "{e}");
            }
        }

        let leases = manager.leased_agents();
        assert_eq!(leases.len(), 20);
        let unique: HashSet<AgentId> = leases.iter().map(|(id, _)| *id).collect();
        assert_eq!(unique.len(), 20);

        let moves = created.iter().map(|id| {
            let manager = manager.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let board = sparse_board(3);
                let legal = pseudo_moves(&board);
                manager.request_move(&id, board, legal).await
            })
        });
        let responses: Vec<_> = join_all(moves).await;
        let movers: HashSet<AgentId> = responses
            .into_iter()
            .map(|r| r.unwrap().unwrap().unwrap().agent_id)
            .collect();
        assert_eq!(movers.len(), 10);

        for id in &created {
            manager.end_match(id, MatchResult::Draw).await.unwrap();
        }
        assert!(manager.leased_agents().is_empty());
        assert!(manager.pool_stats().iter().all(|s| s.idle == s.total));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pool_grows_to_max() {
        let manager = manager_with(EngineConfig {
            pool_size: 1,
            max_pool_size: 2,
            ..EngineConfig::default()
        });
        let seat = || SeatConfig::agent(Difficulty::Easy, Personality::Defensive);
        manager.create_match(seat(), SeatConfig::External).unwrap();
        manager.create_match(seat(), SeatConfig::External).unwrap();
        assert!(manager
            .create_match(seat(), SeatConfig::External)
            .unwrap_err()
            .is_resource_exhausted());

        let stats = manager.pool_stats();
        let easy = stats
            .iter()
            .find(|s| s.difficulty == Difficulty::Easy && s.personality == Personality::Defensive)
            .unwrap();
        assert_eq!((easy.total, easy.leased), (2, 2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_second_lease_returns_first() {
        let manager = manager(1);
        let seat = || SeatConfig::agent(Difficulty::Medium, Personality::Tactical);
        let err = manager.create_match(seat(), seat()).unwrap_err();
        assert!(err.is_resource_exhausted());
        assert!(manager.leased_agents().is_empty());
        manager.create_match(seat(), SeatConfig::External).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_waiting_for_a_lease() {
        let manager = manager(1);
        let seat = || SeatConfig::agent(Difficulty::Easy, Personality::Balanced);
        let first = manager.create_match(seat(), SeatConfig::External).unwrap();

        let timed_out = manager
            .create_match_waiting(seat(), SeatConfig::External, Duration::from_millis(30))
            .await;
        assert!(timed_out.unwrap_err().is_resource_exhausted());

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .create_match_waiting(seat(), SeatConfig::External, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.end_match(&first, MatchResult::Aborted).await.unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }

    /// Sleeps on every prediction so hybrid searches blow through the ceiling
    struct SlowEvaluator;

    impl LearnedEvaluator for SlowEvaluator {
        fn predict(&self, _board: &BoardState) -> f64 {
            std::thread::sleep(Duration::from_millis(40));
            0.0
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ceiling_overrun_returns_fallback() {
        let config = EngineConfig {
            pool_size: 1,
            max_pool_size: 1,
            ..EngineConfig::default()
        };
        let manager = AgentManager::with_learned_evaluator(config, Arc::new(SlowEvaluator)).unwrap();
        let id = manager
            .create_match(SeatConfig::agent(Difficulty::Hard, Personality::Balanced), SeatConfig::External)
            .unwrap();

        let board = sparse_board(4);
        let legal = pseudo_moves(&board);
        for _ in 0..2 {
            let response = manager
                .request_move(&id, board, legal.clone())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(response.source, DecisionSource::Fallback);
            assert!(response.elapsed_ms < 100.0, "{}", response.elapsed_ms);
            assert!(legal.contains(&response.mv));
        }

        let summary = manager.end_match(&id, MatchResult::Draw).await.unwrap();
        assert_eq!(summary.seats[0].performance.as_ref().unwrap().fallbacks, 2);
    }

    /// Next position of a self-play game; starts over once a marshal falls or the game drags on
    fn advance(board: &BoardState, mv: &Move) -> BoardState {
        let next = board.apply(mv);
        if PLAYERS.iter().any(|p| next.marshal(*p).is_none()) || next.move_number >= 80 {
            BoardState::standard_opening()
        } else {
            next
        }
    }

    /// Self-play from the opening through `moves` requests, returning every response
    async fn self_play(manager: &AgentManager, match_id: &str, moves: usize) -> Vec<MoveResponse> {
        let mut board = BoardState::standard_opening();
        let mut responses = Vec::with_capacity(moves);
        for _ in 0..moves {
            let legal = pseudo_moves(&board);
            let response = manager
                .request_move(match_id, board, legal)
                .await
                .unwrap()
                .unwrap();
            board = advance(&board, &response.mv);
            responses.push(response);
        }
        responses
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deadlines_hold_under_concurrent_load() {
        let manager = manager(4);
        let mut tasks = Vec::new();
        for difficulty in DIFFICULTIES {
            for _ in 0..2 {
                let manager = manager.clone();
                tasks.push(tokio::spawn(async move {
                    let config = AIConfig::new(difficulty, Personality::Balanced);
                    let soft_ms = config.soft_deadline_ms as f64;
                    let id = manager
                        .create_match(SeatConfig::Agent(config.clone()), SeatConfig::Agent(config))
                        .unwrap();
                    let responses = self_play(&manager, &id, 167).await;
                    manager.end_match(&id, MatchResult::Draw).await.unwrap();
                    responses
                        .into_iter()
                        .map(|r| (r.elapsed_ms, soft_ms))
                        .collect::<Vec<_>>()
                }));
            }
        }

        let latencies: Vec<(f64, f64)> = join_all(tasks)
            .await
            .into_iter()
            .flat_map(|r| r.unwrap())
            .collect();
        assert!(latencies.len() >= 1000);
        let worst = latencies.iter().map(|(ms, _)| *ms).fold(0.0, f64::max);
        assert!(worst < 100.0, "worst latency {worst}ms");
        let under_soft = latencies.iter().filter(|(ms, soft)| ms <= soft).count();
        assert!(
            under_soft as f64 >= 0.99 * latencies.len() as f64,
            "{under_soft} of {} under soft deadline",
            latencies.len()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_uncontended_hard_agent_never_falls_back() {
        let manager = manager(2);
        let seat = || SeatConfig::agent(Difficulty::Hard, Personality::Balanced);
        let id = manager.create_match(seat(), seat()).unwrap();
        let responses = self_play(&manager, &id, 60).await;
        for response in &responses {
            assert_ne!(response.source, DecisionSource::Fallback, "{response:?}");
            assert!(response.depth_reached >= 1);
            assert!(response.elapsed_ms < 94.0, "{}", response.elapsed_ms);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_request_queued_behind_end_match_sees_final_status() {
        let config = EngineConfig {
            pool_size: 1,
            max_pool_size: 1,
            ..EngineConfig::default()
        };
        let manager = AgentManager::with_learned_evaluator(config, Arc::new(SlowEvaluator)).unwrap();
        let id = manager
            .create_match(SeatConfig::agent(Difficulty::Hard, Personality::Balanced), SeatConfig::External)
            .unwrap();
        let board = BoardState::standard_opening();
        let legal = pseudo_moves(&board);

        let in_flight = {
            let (manager, id, legal) = (manager.clone(), id.clone(), legal.clone());
            tokio::spawn(async move { manager.request_move(&id, board, legal).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let ending = {
            let (manager, id) = (manager.clone(), id.clone());
            tokio::spawn(async move { manager.end_match(&id, MatchResult::Draw).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let late = manager.request_move(&id, board, legal).await;

        assert!(in_flight.await.unwrap().unwrap().is_some());
        assert_eq!(ending.await.unwrap().unwrap().status, MatchStatus::Completed);
        assert!(matches!(late, Err(EngineError::MatchNotActive { .. })), "{late:?}");
        assert!(matches!(
            manager.end_match(&id, MatchResult::Draw).await,
            Err(EngineError::MatchNotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fraud_scores_follow_live_agents() {
        let manager = manager(1);
        let id = manager
            .create_match(SeatConfig::agent(Difficulty::Medium, Personality::Balanced), SeatConfig::External)
            .unwrap();
        let board = sparse_board(7);
        let first = manager
            .request_move(&id, board, pseudo_moves(&board))
            .await
            .unwrap()
            .unwrap();
        assert!(manager.fraud_score(first.agent_id).is_some());
        manager.end_match(&id, MatchResult::Draw).await.unwrap();

        let mut shallow = AIConfig::new(Difficulty::Medium, Personality::Balanced);
        shallow.search_depth = 2;
        let id = manager.create_match(SeatConfig::Agent(shallow), SeatConfig::External).unwrap();
        assert_eq!(manager.fraud_score(first.agent_id), None);

        let second = manager
            .request_move(&id, board, pseudo_moves(&board))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(second.agent_id, first.agent_id);
        assert!(manager.fraud_score(second.agent_id).is_some());
        manager.shutdown();
        assert_eq!(manager.fraud_score(second.agent_id), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_refuses_work() {
        let manager = manager(1);
        let id = manager
            .create_match(SeatConfig::agent(Difficulty::Easy, Personality::Balanced), SeatConfig::External)
            .unwrap();
        manager.shutdown();
        let board = sparse_board(5);
        assert_eq!(
            manager.request_move(&id, board, pseudo_moves(&board)).await,
            Err(EngineError::ShutDown)
        );
        assert_eq!(
            manager.create_match(SeatConfig::External, SeatConfig::External),
            Err(EngineError::ShutDown)
        );
        assert!(manager.pool_stats().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_engine_trait_boundary() {
        let engine: Arc<dyn MoveEngine> = Arc::new(manager(1));
        let id = engine
            .create_match(SeatConfig::agent(Difficulty::Easy, Personality::Tactical), SeatConfig::External)
            .await
            .unwrap();
        let board = sparse_board(6);
        let response = engine.request_move(&id, board, pseudo_moves(&board)).await.unwrap();
        assert_eq!(response.unwrap().source, DecisionSource::Completed);
        let summary = engine.end_match(&id, MatchResult::Winner(Player::Two)).await.unwrap();
        assert_eq!(summary.result, MatchResult::Winner(Player::Two));
    }
}
