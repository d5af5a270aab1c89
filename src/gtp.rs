//! Go Text Protocol (GTP) front end.
//!
//! Exposes the rules engine to GTP controllers so two players (or a GUI such
//! as Sabaki or GoGui) can play a local game. The engine never generates
//! moves; it validates them, keeps the history and scores the result.
//!
//! ## Supported Commands
//!
//! - `name`, `version`, `protocol_version`, `list_commands`, `known_command <cmd>`, `quit`
//! - `boardsize <size>` - Start a new game on a `size x size` board (1 to 25)
//! - `clear_board` - Start a new game on the current board size
//! - `komi <value>` - Set komi
//! - `play <color> <vertex>` - Play a move; rules rejections fail with the reason
//! - `undo` - Take back the last move
//! - `showboard` - Print the board
//! - `final_score` - Score with all stones alive, or with the agreed dead stones
//! - `final_status_list <alive|dead|seki>` - Stones by status
//! - `estimate_score` - Score after a territory estimate
//!
//! ## Example
//!
//! ```
//! use goban::gtp::GtpEngine;
//!
//! let mut engine = GtpEngine::new();
//! let mut out = Vec::new();
//! engine.run("boardsize 9\nplay b E5\nshowboard\n".as_bytes(), &mut out).unwrap();
//! ```

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::cell::{Cell, StoneType};
use crate::constants::{DEFAULT_BOARD_SIZE, KOMI_EVEN};
use crate::estimator::{EstimatorConfig, MonteCarloEstimator, TerritoryEstimator, estimate_territory};
use crate::game::{Game, GamePhase, KoRule};
use crate::position::{Position, check_board_size};
use crate::rules::{self, Score, ScoringRules};

/// The list of known GTP commands.
const KNOWN_COMMANDS: &[&str] = &[
    "boardsize",
    "clear_board",
    "estimate_score",
    "final_score",
    "final_status_list",
    "known_command",
    "komi",
    "list_commands",
    "name",
    "play",
    "protocol_version",
    "quit",
    "showboard",
    "undo",
    "version",
];

/// GTP engine state.
pub struct GtpEngine {
    game: Game,
    board_size: usize,
    komi: f32,
    ko_rule: KoRule,
    scoring_rules: ScoringRules,
    estimator: Box<dyn TerritoryEstimator>,
    estimator_config: EstimatorConfig,
}

impl Default for GtpEngine {
    fn default() -> Self {
        Self::new()
    }
}

type Reply = Result<String, String>;

impl GtpEngine {
    pub fn new() -> Self {
        Self::with_rules(KoRule::default(), ScoringRules::default())
    }

    pub fn with_rules(ko_rule: KoRule, scoring_rules: ScoringRules) -> Self {
        let mut engine = Self {
            game: Game::new(Position::blank(DEFAULT_BOARD_SIZE, DEFAULT_BOARD_SIZE)),
            board_size: DEFAULT_BOARD_SIZE,
            komi: KOMI_EVEN,
            ko_rule,
            scoring_rules,
            estimator: Box::new(MonteCarloEstimator::new()),
            estimator_config: EstimatorConfig::default(),
        };
        engine.new_game();
        engine
    }

    /// Use a different estimator for `estimate_score` and `final_status_list`.
    pub fn with_estimator(mut self, estimator: Box<dyn TerritoryEstimator>, config: EstimatorConfig) -> Self {
        self.estimator = estimator;
        self.estimator_config = config;
        self
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    // `board_size` only ever holds a size `boardsize` accepted.
    fn new_game(&mut self) {
        let initial = Position::blank(self.board_size, self.board_size).with_komi(Some(self.komi));
        self.game = Game::new(initial).with_rules(self.ko_rule, self.scoring_rules);
    }

    /// Run the command loop on stdin/stdout.
    pub fn run_stdio(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.run(stdin.lock(), stdout.lock())
    }

    /// Run the command loop until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        for line in input.lines() {
            let line = line?;

            // Skip empty lines and comments
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let (id, command_line) = Self::parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            let Some((command, args)) = parts.split_first() else {
                continue;
            };
            let command = command.to_lowercase();
            debug!(%command, ?args, "gtp command");

            let (prefix, message) = match self.execute(&command, args) {
                Ok(message) => ('=', message),
                Err(message) => ('?', message),
            };
            let id_str = id.map(|i| i.to_string()).unwrap_or_default();
            write!(output, "{prefix}{id_str} {message}\n\n")?;
            output.flush()?;

            if command == "quit" {
                break;
            }
        }
        Ok(())
    }

    /// Parse an optional numeric command ID from the beginning of the line.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let trimmed = line.trim();
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        match trimmed[..end].parse::<u32>() {
            Ok(id) => (Some(id), trimmed[end..].trim()),
            Err(_) => (None, trimmed),
        }
    }

    /// Execute a GTP command.
    fn execute(&mut self, command: &str, args: &[&str]) -> Reply {
        match command {
            "name" => Ok(env!("CARGO_PKG_NAME").to_string()),
            "version" => Ok(env!("CARGO_PKG_VERSION").to_string()),
            "protocol_version" => Ok("2".to_string()),
            "list_commands" => Ok(KNOWN_COMMANDS.join("\n")),
            "known_command" => {
                let cmd = arg(args, 0)?.to_lowercase();
                Ok(KNOWN_COMMANDS.contains(&cmd.as_str()).to_string())
            }
            "quit" => Ok(String::new()),
            "boardsize" => {
                let size: usize = arg(args, 0)?.parse().map_err(|_| "boardsize not an integer")?;
                if check_board_size(size).is_err() {
                    return Err("unacceptable size".to_string());
                }
                self.board_size = size;
                self.new_game();
                Ok(String::new())
            }
            "clear_board" => {
                self.new_game();
                Ok(String::new())
            }
            "komi" => {
                self.komi = arg(args, 0)?.parse().map_err(|_| "komi not a float")?;
                Ok(String::new())
            }
            "play" => {
                let color = StoneType::from_name(arg(args, 0)?).map_err(|e| e.to_string())?;
                let cell = Cell::from_gtp(arg(args, 1)?, self.board_size).map_err(|e| e.to_string())?;
                if !cell.is_pass() && !cell.is_on_board(self.board_size, self.board_size) {
                    return Err(format!("illegal move: {} is off the board", arg(args, 1)?));
                }
                self.game.play_as(cell, color).map_err(|e| e.to_string())?;
                Ok(String::new())
            }
            "undo" => {
                if self.game.phase() == GamePhase::Scoring {
                    self.game.resume().map_err(|e| e.to_string())?;
                }
                self.game.undo().map_err(|_| "cannot undo")?;
                Ok(String::new())
            }
            "showboard" => {
                let pos = self.game.scoring_position().unwrap_or(self.game.current());
                Ok(format!("\n{pos}"))
            }
            "final_score" => Ok(self.final_score().result_string()),
            "final_status_list" => {
                let pos = match self.game.scoring_position() {
                    Some(pos) => pos.clone(),
                    None => self.estimate(),
                };
                let color_order = [StoneType::Black, StoneType::White];
                let mut cells: Vec<Cell> = match arg(args, 0)?.to_lowercase().as_str() {
                    "alive" => color_order.iter().flat_map(|&c| pos.living_stones(c)).collect(),
                    "dead" => color_order.iter().flat_map(|&c| pos.dead_stones(c)).collect(),
                    "seki" => vec![],
                    _ => return Err("invalid status".to_string()),
                };
                cells.sort();
                let vertices: Vec<String> = cells.iter().map(|c| c.to_gtp(self.board_size)).collect();
                Ok(vertices.join(" "))
            }
            "estimate_score" => {
                let estimated = self.estimate();
                Ok(self.score(&estimated).result_string())
            }
            _ => Err(format!("unknown command: {command}")),
        }
    }

    fn estimate(&self) -> Position {
        estimate_territory(self.estimator.as_ref(), self.game.current(), &self.estimator_config)
    }

    /// Score the agreed marks if the game reached scoring, otherwise the
    /// current board with every stone alive.
    fn final_score(&self) -> Score {
        match self.game.scoring_position() {
            Some(pos) => self.score(pos),
            None => self.score(&rules::compute_territory(&self.game.current().without_scoring())),
        }
    }

    fn score(&self, position: &Position) -> Score {
        rules::score(&position.with_komi(Some(self.komi)), self.scoring_rules)
    }
}

fn arg<'a>(args: &[&'a str], index: usize) -> Result<&'a str, String> {
    args.get(index).copied().ok_or_else(|| "missing argument".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(engine: &mut GtpEngine, script: &str) -> String {
        let mut out = Vec::new();
        engine.run(script.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_id_with_id() {
        let (id, cmd) = GtpEngine::parse_id("123 name");
        assert_eq!(id, Some(123));
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_parse_id_without_id() {
        let (id, cmd) = GtpEngine::parse_id("name");
        assert_eq!(id, None);
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_name_command() {
        let mut engine = GtpEngine::new();
        assert_eq!(engine.execute("name", &[]), Ok("goban".to_string()));
        assert_eq!(engine.execute("protocol_version", &[]), Ok("2".to_string()));
    }

    #[test]
    fn test_known_command() {
        let mut engine = GtpEngine::new();
        assert_eq!(engine.execute("known_command", &["undo"]), Ok("true".to_string()));
        assert_eq!(engine.execute("known_command", &["genmove"]), Ok("false".to_string()));
        assert!(engine.execute("known_command", &[]).is_err());
    }

    #[test]
    fn test_boardsize() {
        let mut engine = GtpEngine::new();
        assert!(engine.execute("boardsize", &["9"]).is_ok());
        assert_eq!(engine.game().current().board_width(), 9);
        assert!(engine.execute("boardsize", &["26"]).is_err());
        assert!(engine.execute("boardsize", &["x"]).is_err());
    }

    #[test]
    fn test_play_rejections_carry_reason() {
        let mut engine = GtpEngine::new();
        engine.execute("boardsize", &["9"]).unwrap();
        assert!(engine.execute("play", &["b", "E5"]).is_ok());
        let err = engine.execute("play", &["w", "E5"]).unwrap_err();
        assert!(err.contains("not empty"), "{err}");
        assert!(engine.execute("play", &["w", "K5"]).is_err());
        assert!(engine.execute("play", &["red", "A1"]).is_err());
    }

    #[test]
    fn test_play_undo_and_clear() {
        let mut engine = GtpEngine::new();
        engine.execute("play", &["black", "D4"]).unwrap();
        engine.execute("play", &["white", "Q16"]).unwrap();
        assert_eq!(engine.game().move_count(), 2);
        engine.execute("undo", &[]).unwrap();
        assert_eq!(engine.game().move_count(), 1);
        engine.execute("clear_board", &[]).unwrap();
        assert_eq!(engine.game().move_count(), 0);
        assert!(engine.execute("undo", &[]).is_err());
    }

    #[test]
    fn test_final_score_counts_komi() {
        let mut engine = GtpEngine::new();
        engine.execute("boardsize", &["5"]).unwrap();
        engine.execute("komi", &["0.5"]).unwrap();
        // Black wall on the middle column, White plays nowhere.
        for row in 1..=5 {
            engine.execute("play", &["b", &format!("C{row}")]).unwrap();
            engine.execute("play", &["w", "pass"]).unwrap();
        }
        // Area scoring: 25 points for Black, 0.5 for White.
        assert_eq!(engine.execute("final_score", &[]), Ok("B+24.5".to_string()));
    }

    #[test]
    fn test_run_formats_responses() {
        let mut engine = GtpEngine::new();
        let out = run(&mut engine, "1 name\n# comment\n\nplay b Z99\n2 quit\nname\n");
        assert_eq!(out, "=1 goban\n\n? invalid vertex `Z99`\n\n=2 \n\n");
    }
}
