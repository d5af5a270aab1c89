//! Goban command line.
//!
//! ## Usage
//!
//! - `goban gtp` - Start a GTP session for a GUI or two local players
//! - `goban replay <record.json>` - Replay a server game record and score it
//! - `goban query --moves .root.dd.pd` - Print the analysis query for a move path
//!
//! Logs go to stderr; set `RUST_LOG` to change the level.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use goban::analysis::{Query, QueryOptions};
use goban::constants::{DEFAULT_BOARD_SIZE, DEFAULT_RULES};
use goban::estimator::{EstimatorConfig, MonteCarloEstimator, estimate_territory, looks_finished};
use goban::game::{Game, GamePhase, GameRecord, KoRule};
use goban::gtp::GtpEngine;
use goban::movepath;
use goban::rules::{self, ScoringRules};

/// Goban: Go rules engine and analysis tools
#[derive(Parser)]
#[command(name = "goban")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Ko {
    Simple,
    Superko,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the GTP (Go Text Protocol) session on stdin/stdout
    Gtp {
        /// Ruleset name, decides area or territory scoring
        #[arg(long, default_value = DEFAULT_RULES)]
        rules: String,
        #[arg(long, value_enum, default_value_t = Ko::Simple)]
        ko: Ko,
    },
    /// Replay a game record (JSON) and print the final board and score
    Replay {
        record: PathBuf,
        #[arg(long, default_value = DEFAULT_RULES)]
        rules: String,
        /// Estimate territory instead of using the record's scoring data
        #[arg(long)]
        estimate: bool,
        /// Playouts used by --estimate
        #[arg(long)]
        trials: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the analysis query for a move path
    Query {
        /// Dotted move path, e.g. `.root.dd.pd.pass`
        #[arg(long, default_value = "")]
        moves: String,
        #[arg(long, default_value_t = DEFAULT_BOARD_SIZE)]
        size: usize,
        #[arg(long, default_value = "1")]
        id: String,
        #[arg(long)]
        komi: Option<f32>,
        #[arg(long)]
        max_visits: Option<u32>,
        #[arg(long)]
        ownership: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Gtp { rules, ko }) => {
            let ko_rule = match ko {
                Ko::Simple => KoRule::Simple,
                Ko::Superko => KoRule::PositionalSuperko,
            };
            GtpEngine::with_rules(ko_rule, ScoringRules::for_ruleset(&rules))
                .run_stdio()
                .context("GTP session failed")?;
        }
        Some(Commands::Replay {
            record,
            rules,
            estimate,
            trials,
            seed,
        }) => replay(record, &rules, estimate, trials, seed)?,
        Some(Commands::Query {
            moves,
            size,
            id,
            komi,
            max_visits,
            ownership,
        }) => {
            let options = QueryOptions {
                komi,
                max_visits: max_visits.or(QueryOptions::default().max_visits),
                include_ownership: ownership.then_some(true),
                ..QueryOptions::default()
            };
            print_query(&moves, size, id, &options)?;
        }
        None => {
            GtpEngine::new().run_stdio().context("GTP session failed")?;
        }
    }
    Ok(())
}

fn replay(path: PathBuf, rules: &str, estimate: bool, trials: Option<u32>, seed: Option<u64>) -> Result<()> {
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let record: GameRecord =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let scoring_rules = ScoringRules::for_ruleset(rules);
    let game = Game::replay(&record)
        .context("replaying game record")?
        .with_rules(KoRule::Simple, scoring_rules);
    info!(moves = game.move_count(), phase = ?game.phase(), "game replayed");

    let scored = if estimate {
        let config = EstimatorConfig {
            trials: trials.unwrap_or(EstimatorConfig::default().trials),
            seed,
            ..EstimatorConfig::default()
        };
        let estimator = match seed {
            Some(seed) => MonteCarloEstimator::with_seed(seed),
            None => MonteCarloEstimator::new(),
        };
        let estimated = estimate_territory(&estimator, game.current(), &config);
        if game.phase() == GamePhase::InProgress && looks_finished(&estimated) {
            info!("few dame remain, the game looks finished");
        }
        estimated
    } else {
        match game.scoring_position() {
            Some(pos) => pos.clone(),
            None => rules::compute_territory(game.current()),
        }
    };

    let score = rules::score(&scored, scoring_rules);
    println!("{scored}");
    println!(
        "Black {:.1}  White {:.1}  Result {}",
        score.black.total,
        score.white.total,
        score.result_string()
    );
    Ok(())
}

fn print_query(moves: &str, size: usize, id: String, options: &QueryOptions) -> Result<()> {
    let start = goban::position::Position::square(size).context("--size")?;
    let cells = movepath::decode_moves(moves, size).context("decoding move path")?;
    let mut sequence = vec![start];
    for (index, cell) in cells.iter().enumerate() {
        let prev = &sequence[sequence.len() - 1];
        let next = rules::apply_move(prev, *cell, prev.next_to_move())
            .with_context(|| format!("move {index} ({cell}) is illegal"))?;
        sequence.push(next);
    }
    let query = Query::from_positions(id, &sequence, options);
    println!("{}", serde_json::to_string(&query)?);
    Ok(())
}
