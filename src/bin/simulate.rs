use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use clap::Parser;
use itertools::Itertools;
use log::{info, warn};
use marshal_engine::config::EngineConfig;
use marshal_engine::enums::{Difficulty, Personality, Player, DIFFICULTIES, PERSONALITIES, PLAYERS};
use marshal_engine::manager::{AgentManager, DecisionSource, MatchResult, SeatConfig};
use marshal_engine::movegen::pseudo_moves;
use marshal_engine::{BoardState, EngineResult};
use rand::prelude::*;
use rand_distr::Exp;
use rand_xorshift::XorShiftRng;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "simulate")]
#[command(about = "Drive concurrent self-play matches through the agent manager")]
struct Args {
    /// Number of matches to run concurrently
    #[arg(long, default_value_t = 8)]
    matches: usize,

    /// Move limit per match
    #[arg(long, default_value_t = 120)]
    moves: u32,

    /// Tier for both seats; cycles through every tier when omitted
    #[arg(long)]
    difficulty: Option<Difficulty>,

    /// Personality for both seats; cycles through every personality when omitted
    #[arg(long)]
    personality: Option<Personality>,

    /// Master seed for agents and jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Mean of the exponential pause between moves, simulating host load
    #[arg(long, default_value_t = 0.0)]
    load_jitter_ms: f64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct TierReport {
    moves: usize,
    completed: usize,
    deadline_aborted: usize,
    fallbacks: usize,
    mean_latency_ms: f64,
    p99_latency_ms: f64,
    max_latency_ms: f64,
    fraud_alerts: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    matches: usize,
    player_one_wins: usize,
    player_two_wins: usize,
    draws: usize,
    wall_clock_ms: f64,
    tiers: BTreeMap<Difficulty, TierReport>,
}

/// One move as seen by the harness
struct Sample {
    difficulty: Difficulty,
    elapsed_ms: f64,
    source: DecisionSource,
    alerted: bool,
}

async fn play_match(
    manager: AgentManager,
    difficulty: Difficulty,
    personality: Personality,
    move_limit: u32,
    jitter: Option<(Exp<f64>, XorShiftRng)>,
) -> EngineResult<(MatchResult, Vec<Sample>)> {
    let seat = || SeatConfig::agent(difficulty, personality);
    let match_id = manager
        .create_match_waiting(seat(), seat(), Duration::from_secs(30))
        .await?;
    let mut jitter = jitter;
    let mut board = BoardState::standard_opening();
    let mut samples = Vec::new();

    let result = loop {
        if let Some(loser) = PLAYERS
            .into_iter()
            .find(|p| board.marshal(*p).is_none())
        {
            break MatchResult::Winner(loser.opponent());
        }
        if board.move_number >= move_limit {
            break MatchResult::Draw;
        }
        if let Some((exp, rng)) = jitter.as_mut() {
            let pause = exp.sample(rng);
            tokio::time::sleep(Duration::from_secs_f64(pause / 1000.0)).await;
        }

        let legal = pseudo_moves(&board);
        let Some(response) = manager.request_move(&match_id, board, legal).await? else {
            break MatchResult::Draw;
        };
        samples.push(Sample {
            difficulty,
            elapsed_ms: response.elapsed_ms,
            source: response.source,
            alerted: response.fraud_alert.is_some(),
        });
        board = board.apply(&response.mv);
    };

    manager.end_match(&match_id, result).await?;
    Ok((result, samples))
}

fn tier_report(samples: &[&Sample]) -> TierReport {
    let latencies = samples
        .iter()
        .map(|s| s.elapsed_ms)
        .sorted_by(|a, b| a.total_cmp(b))
        .collect_vec();
    let count = |source: DecisionSource| samples.iter().filter(|s| s.source == source).count();
    let p99_index = ((latencies.len() as f64 * 0.99).ceil() as usize).clamp(1, latencies.len().max(1)) - 1;
    TierReport {
        moves: samples.len(),
        completed: count(DecisionSource::Completed),
        deadline_aborted: count(DecisionSource::DeadlineAborted),
        fallbacks: count(DecisionSource::Fallback),
        mean_latency_ms: latencies.iter().sum::<f64>() / latencies.len().max(1) as f64,
        p99_latency_ms: latencies.get(p99_index).copied().unwrap_or(0.0),
        max_latency_ms: latencies.last().copied().unwrap_or(0.0),
        fraud_alerts: samples.iter().filter(|s| s.alerted).count(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = EngineConfig::from_env()?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    let manager = AgentManager::new(config)?;
    info!(
        "Simulating {} matches of up to {} moves (ceiling {:?}, jitter {}ms)",
        args.matches,
        args.moves,
        manager.config().ceiling(),
        args.load_jitter_ms
    );

    let started = Instant::now();
    let tasks = (0..args.matches).map(|i| {
        let difficulty = args.difficulty.unwrap_or(DIFFICULTIES[i % DIFFICULTIES.len()]);
        let personality = args.personality.unwrap_or(PERSONALITIES[i % PERSONALITIES.len()]);
        let jitter = (args.load_jitter_ms > 0.0)
            .then(|| Exp::new(1.0 / args.load_jitter_ms).ok())
            .flatten()
            .map(|exp| {
                let rng = match args.seed {
                    Some(seed) => XorShiftRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => XorShiftRng::from_entropy(),
                };
                (exp, rng)
            });
        tokio::spawn(play_match(manager.clone(), difficulty, personality, args.moves, jitter))
    });
    let outcomes = futures::future::join_all(tasks).await;

    let mut results = Vec::new();
    let mut samples = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(Ok((result, match_samples))) => {
                results.push(result);
                samples.extend(match_samples);
            }
            Ok(Err(e)) => warn!("Match failed: {}", e),
            Err(e) => warn!("Match task panicked: {}", e),
        }
    }

    let by_tier = samples.iter().into_group_map_by(|s| s.difficulty);
    let report = Report {
        matches: results.len(),
        player_one_wins: results.iter().filter(|r| **r == MatchResult::Winner(Player::One)).count(),
        player_two_wins: results.iter().filter(|r| **r == MatchResult::Winner(Player::Two)).count(),
        draws: results.iter().filter(|r| **r == MatchResult::Draw).count(),
        wall_clock_ms: started.elapsed().as_secs_f64() * 1000.0,
        tiers: by_tier
            .iter()
            .map(|(difficulty, tier)| (*difficulty, tier_report(tier)))
            .collect(),
    };
    manager.shutdown();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Marshal engine simulation");
    println!("=========================");
    println!(
        "Matches: {}  (player one {}, player two {}, draws {})",
        report.matches, report.player_one_wins, report.player_two_wins, report.draws
    );
    println!("Wall clock: {:.0}ms", report.wall_clock_ms);
    for (difficulty, tier) in &report.tiers {
        println!(
            "{:>6}: {} moves, mean {:.2}ms, p99 {:.2}ms, max {:.2}ms, aborted {}, fallbacks {}, fraud alerts {}",
            difficulty.to_string(),
            tier.moves,
            tier.mean_latency_ms,
            tier.p99_latency_ms,
            tier.max_latency_ms,
            tier.deadline_aborted,
            tier.fallbacks,
            tier.fraud_alerts
        );
    }
    Ok(())
}
