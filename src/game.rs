//! Game history and phase tracking.
//!
//! A [`Game`] owns an append-only arena of positions indexed by move number.
//! Positions never point at their successors; going back in time is just
//! indexing into the arena, and variations are built off any index without
//! touching the canonical record.
//!
//! Phases follow the server's life cycle:
//!
//! ```text
//! InProgress --two passes--> Scoring --both accept--> Finished
//!      ^                        |
//!      +-------- resume --------+
//! ```

use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cell::{Cell, CoordError, StoneType, cells_from_sgf};
use crate::position::Position;
use crate::rules::{self, RulesError, Score, ScoringRules};

/// Phase of a game.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GamePhase {
    InProgress,
    Scoring,
    Finished,
}

/// Which board repetitions are forbidden.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum KoRule {
    /// Only an immediate single-stone recapture is forbidden.
    #[default]
    Simple,
    /// No stone placement may recreate any earlier board of this game.
    PositionalSuperko,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error(transparent)]
    Coord(#[from] CoordError),
    #[error("the game is finished")]
    Finished,
    #[error("the game is being scored; resume it first")]
    Scoring,
    #[error("the game is not in the scoring phase")]
    NotScoring,
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("no position at move {0}")]
    NoSuchMove(usize),
}

/// A game: position history, phase and scoring state.
#[derive(Clone, Debug)]
pub struct Game {
    positions: Vec<Position>,
    phase: GamePhase,
    ko_rule: KoRule,
    scoring_rules: ScoringRules,
    consecutive_passes: usize,
    /// Passes before this index were played before the last `resume`.
    passes_from: usize,
    /// Final position with only the agreed dead marks applied.
    dead_marks: Option<Position>,
    /// `dead_marks` with territory computed.
    scoring: Option<Position>,
    accepted: HashSet<StoneType>,
}

impl Game {
    pub fn new(initial: Position) -> Self {
        Self {
            positions: vec![initial],
            phase: GamePhase::InProgress,
            ko_rule: KoRule::default(),
            scoring_rules: ScoringRules::default(),
            consecutive_passes: 0,
            passes_from: 1,
            dead_marks: None,
            scoring: None,
            accepted: HashSet::new(),
        }
    }

    pub fn with_rules(mut self, ko_rule: KoRule, scoring_rules: ScoringRules) -> Self {
        self.ko_rule = ko_rule;
        self.scoring_rules = scoring_rules;
        self
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn ko_rule(&self) -> KoRule {
        self.ko_rule
    }

    pub fn scoring_rules(&self) -> ScoringRules {
        self.scoring_rules
    }

    /// The latest position of the canonical record.
    pub fn current(&self) -> &Position {
        // The arena always holds at least the initial position.
        &self.positions[self.positions.len() - 1]
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Number of moves played (passes included).
    pub fn move_count(&self) -> usize {
        self.positions.len() - 1
    }

    pub fn position_at(&self, index: usize) -> Result<&Position, GameError> {
        self.positions.get(index).ok_or(GameError::NoSuchMove(index))
    }

    /// The position being scored, with dead marks and territory.
    pub fn scoring_position(&self) -> Option<&Position> {
        self.scoring.as_ref()
    }

    /// Play the side to move at `cell` (or pass).
    ///
    /// Playing during scoring resumes the game first. Two consecutive passes
    /// enter the scoring phase.
    pub fn play(&mut self, cell: Cell) -> Result<&Position, GameError> {
        let player = self.current().next_to_move();
        self.play_as(cell, player)
    }

    /// Play an explicit colour, e.g. a move coming from a server.
    pub fn play_as(&mut self, cell: Cell, player: StoneType) -> Result<&Position, GameError> {
        match self.phase {
            GamePhase::Finished => return Err(GameError::Finished),
            GamePhase::Scoring => {
                // Validate before leaving the scoring phase.
                self.next_position(cell, player)?;
                self.resume()?;
            }
            GamePhase::InProgress => {}
        }

        let next = self.next_position(cell, player)?;
        self.positions.push(next);

        if cell.is_pass() {
            self.consecutive_passes += 1;
            if self.consecutive_passes >= 2 {
                self.enter_scoring();
            }
        } else {
            self.consecutive_passes = 0;
        }
        Ok(self.current())
    }

    pub fn pass(&mut self) -> Result<&Position, GameError> {
        self.play(Cell::PASS)
    }

    fn next_position(&self, cell: Cell, player: StoneType) -> Result<Position, GameError> {
        let next = rules::apply_move(self.current(), cell, player)?;
        if self.ko_rule == KoRule::PositionalSuperko
            && !cell.is_pass()
            && rules::is_superko(&next, &self.positions)
        {
            return Err(RulesError::SuperkoViolation(cell).into());
        }
        Ok(next)
    }

    fn enter_scoring(&mut self) {
        let base = self.current().without_scoring();
        self.scoring = Some(rules::compute_territory(&base));
        self.dead_marks = Some(base);
        self.accepted.clear();
        self.phase = GamePhase::Scoring;
        debug!(moves = self.move_count(), "entering stone removal");
    }

    /// Toggle the dead mark on the group at `cell` and recompute territory.
    ///
    /// Any change withdraws earlier acceptances.
    pub fn toggle_dead(&mut self, cell: Cell) -> Result<&Position, GameError> {
        if self.phase != GamePhase::Scoring {
            return Err(GameError::NotScoring);
        }
        let base = self.dead_marks.as_ref().ok_or(GameError::NotScoring)?;
        let marked = rules::mark_dead(base, cell);
        let scoring = rules::compute_territory(&marked);
        self.dead_marks = Some(marked);
        self.accepted.clear();
        Ok(&*self.scoring.insert(scoring))
    }

    /// Replace the dead marks wholesale, e.g. from an estimator suggestion.
    pub fn set_dead_stones(&mut self, removed: impl IntoIterator<Item = Cell>) -> Result<&Position, GameError> {
        if self.phase != GamePhase::Scoring {
            return Err(GameError::NotScoring);
        }
        let marked = self.current().without_scoring().with_removed_spots(removed);
        let scoring = rules::compute_territory(&marked);
        self.dead_marks = Some(marked);
        self.accepted.clear();
        Ok(&*self.scoring.insert(scoring))
    }

    /// Accept the current marks for `color`. Returns the phase afterwards.
    pub fn accept(&mut self, color: StoneType) -> Result<GamePhase, GameError> {
        if self.phase != GamePhase::Scoring {
            return Err(GameError::NotScoring);
        }
        self.accepted.insert(color);
        if self.accepted.len() == 2 {
            self.phase = GamePhase::Finished;
            debug!(result = ?self.score().map(|s| s.result_string()), "game finished");
        }
        Ok(self.phase)
    }

    /// Leave the scoring phase and continue playing.
    pub fn resume(&mut self) -> Result<(), GameError> {
        if self.phase != GamePhase::Scoring {
            return Err(GameError::NotScoring);
        }
        self.phase = GamePhase::InProgress;
        self.dead_marks = None;
        self.scoring = None;
        self.accepted.clear();
        self.consecutive_passes = 0;
        self.passes_from = self.positions.len();
        Ok(())
    }

    /// Drop the last move. Only allowed while the game is in progress.
    pub fn undo(&mut self) -> Result<Position, GameError> {
        match self.phase {
            GamePhase::InProgress => {}
            GamePhase::Scoring => return Err(GameError::Scoring),
            GamePhase::Finished => return Err(GameError::Finished),
        }
        if self.positions.len() < 2 {
            return Err(GameError::NothingToUndo);
        }
        let undone = self.positions.pop().ok_or(GameError::NothingToUndo)?;
        self.passes_from = self.passes_from.clamp(1, self.positions.len());
        self.consecutive_passes = self.positions[self.passes_from..]
            .iter()
            .rev()
            .take_while(|p| p.last_move() == Some(Cell::PASS))
            .count();
        Ok(undone)
    }

    /// Score of the position being scored.
    pub fn score(&self) -> Option<Score> {
        self.scoring
            .as_ref()
            .map(|pos| rules::score(pos, self.scoring_rules))
    }

    /// Play `moves` from the position at `at`, alternating colours from the
    /// side to move there. Each returned position records the branch path in
    /// its `variation`.
    pub fn branch(&self, at: usize, moves: &[Cell]) -> Result<Vec<Position>, GameError> {
        let mut pos = self.position_at(at)?.clone();
        let mut out = Vec::with_capacity(moves.len());
        for (i, &cell) in moves.iter().enumerate() {
            pos = rules::apply_move(&pos, cell, pos.next_to_move())?
                .with_variation(moves[..=i].to_vec());
            out.push(pos.clone());
        }
        Ok(out)
    }

    /// Rebuild a game from a server record.
    ///
    /// Moves the rules engine rejects are logged and skipped. Scoring data in
    /// the record (removed stones, scoring positions) is applied to the final
    /// position.
    pub fn replay(record: &GameRecord) -> Result<Game, GameError> {
        let black = cells_from_sgf(record.initial_black.as_deref().unwrap_or(""))?;
        let white = cells_from_sgf(record.initial_white.as_deref().unwrap_or(""))?;
        let mut turn = if record.white_goes_first {
            StoneType::White
        } else {
            StoneType::Black
        };
        let initial = Position::with_setup(record.width, record.height, black, white)?
            .with_komi(record.komi)
            .with_handicap_metadata(record.handicap, record.free_handicap_placement)
            .with_next_to_move(turn);

        let mut game = Game::new(initial);
        let limit = record.limit.unwrap_or(usize::MAX);
        for (index, mv) in record.moves.iter().enumerate().take(limit) {
            let cell = match mv.as_slice() {
                [x, y, ..] => Cell::new(*x as i32, *y as i32),
                _ => {
                    warn!(game_id = ?record.id, move_index = index, "malformed move in record");
                    continue;
                }
            };
            let pos = match rules::apply_move(game.current(), cell, turn) {
                Ok(pos) => pos,
                Err(err) => {
                    warn!(game_id = ?record.id, move_index = index, %err, "server returned an invalid move");
                    continue;
                }
            };
            if !record.free_handicap_placement || index + 1 >= record.handicap {
                turn = turn.opponent();
            }
            game.positions.push(pos.with_next_to_move(turn));
            game.consecutive_passes = if cell.is_pass() {
                game.consecutive_passes + 1
            } else {
                0
            };
        }

        if game.consecutive_passes >= 2 {
            game.phase = GamePhase::Scoring;
        }

        let removed = cells_from_sgf(record.removed.as_deref().unwrap_or(""))?;
        let black_area = cells_from_sgf(record.black_scoring_positions.as_deref().unwrap_or(""))?;
        let white_area = cells_from_sgf(record.white_scoring_positions.as_deref().unwrap_or(""))?;
        let has_scoring_data = !removed.is_empty()
            || !black_area.is_empty()
            || !white_area.is_empty()
            || record.compute_territory;

        if game.phase == GamePhase::Scoring || has_scoring_data {
            let marked = game.current().without_scoring().with_removed_spots(removed);
            let mut scoring = if record.compute_territory {
                rules::compute_territory(&marked)
            } else {
                marked.clone()
            };
            scoring = scoring
                .with_territory(StoneType::Black, black_area)
                .with_territory(StoneType::White, white_area);
            game.dead_marks = Some(marked);
            game.scoring = Some(scoring);
        }
        Ok(game)
    }
}

/// A game as stored by the server: setup, moves and scoring data.
///
/// Coordinates in the string fields are concatenated SGF pairs.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GameRecord {
    pub id: Option<u64>,
    pub width: usize,
    pub height: usize,
    pub initial_black: Option<String>,
    pub initial_white: Option<String>,
    pub white_goes_first: bool,
    /// Each move is `[x, y, ...]`; trailing entries (timings) are ignored.
    pub moves: Vec<Vec<i64>>,
    pub handicap: usize,
    pub free_handicap_placement: bool,
    pub komi: Option<f32>,
    pub removed: Option<String>,
    pub black_scoring_positions: Option<String>,
    pub white_scoring_positions: Option<String>,
    pub compute_territory: bool,
    /// Replay at most this many moves.
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: i32, y: i32) -> Cell {
        Cell::new(x, y)
    }

    #[test]
    fn test_two_passes_enter_scoring() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.play(c(2, 2)).unwrap();
        game.pass().unwrap();
        assert_eq!(game.phase(), GamePhase::InProgress);
        game.pass().unwrap();
        assert_eq!(game.phase(), GamePhase::Scoring);
        assert!(game.scoring_position().is_some());
    }

    #[test]
    fn test_interrupted_passes_do_not_score() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.pass().unwrap();
        game.play(c(2, 2)).unwrap();
        game.pass().unwrap();
        assert_eq!(game.phase(), GamePhase::InProgress);
    }

    #[test]
    fn test_accept_finishes() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.pass().unwrap();
        game.pass().unwrap();
        assert_eq!(game.accept(StoneType::Black).unwrap(), GamePhase::Scoring);
        assert_eq!(game.accept(StoneType::White).unwrap(), GamePhase::Finished);
        assert_eq!(game.play(c(0, 0)), Err(GameError::Finished));
    }

    #[test]
    fn test_toggle_withdraws_acceptance() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.play(c(2, 2)).unwrap();
        game.pass().unwrap();
        game.pass().unwrap();
        game.accept(StoneType::White).unwrap();
        let pos = game.toggle_dead(c(2, 2)).unwrap();
        assert_eq!(pos.black_dead_stones().len(), 1);
        assert_eq!(game.accept(StoneType::Black).unwrap(), GamePhase::Scoring);
    }

    #[test]
    fn test_play_during_scoring_resumes() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.pass().unwrap();
        game.pass().unwrap();
        assert_eq!(game.phase(), GamePhase::Scoring);
        game.play(c(4, 4)).unwrap();
        assert_eq!(game.phase(), GamePhase::InProgress);
        assert!(game.scoring_position().is_none());
        // A single pass after resuming does not re-enter scoring.
        game.pass().unwrap();
        assert_eq!(game.phase(), GamePhase::InProgress);
    }

    #[test]
    fn test_illegal_move_during_scoring_keeps_phase() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.play(c(4, 4)).unwrap();
        game.pass().unwrap();
        game.pass().unwrap();
        assert!(game.play(c(4, 4)).is_err());
        assert_eq!(game.phase(), GamePhase::Scoring);
    }

    #[test]
    fn test_toggle_requires_scoring() {
        let mut game = Game::new(Position::square(9).unwrap());
        assert_eq!(game.toggle_dead(c(0, 0)).unwrap_err(), GameError::NotScoring);
        assert_eq!(game.resume().unwrap_err(), GameError::NotScoring);
    }

    #[test]
    fn test_undo() {
        let mut game = Game::new(Position::square(9).unwrap());
        assert_eq!(game.undo().unwrap_err(), GameError::NothingToUndo);
        game.play(c(3, 3)).unwrap();
        game.play(c(5, 5)).unwrap();
        let undone = game.undo().unwrap();
        assert_eq!(undone.last_move(), Some(c(5, 5)));
        assert_eq!(game.move_count(), 1);
        assert_eq!(game.current().next_to_move(), StoneType::White);
    }

    #[test]
    fn test_undo_restores_pass_count() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.pass().unwrap();
        game.play(c(4, 4)).unwrap();
        game.undo().unwrap();
        game.pass().unwrap();
        assert_eq!(game.phase(), GamePhase::Scoring);

        let mut game = Game::new(Position::square(9).unwrap());
        game.play(c(4, 4)).unwrap();
        game.pass().unwrap();
        game.undo().unwrap();
        game.pass().unwrap();
        assert_eq!(game.phase(), GamePhase::InProgress);
    }

    #[test]
    fn test_undo_ignores_passes_before_resume() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.pass().unwrap();
        game.pass().unwrap();
        game.resume().unwrap();
        game.play(c(4, 4)).unwrap();
        game.undo().unwrap();
        game.pass().unwrap();
        assert_eq!(game.phase(), GamePhase::InProgress);
    }

    #[test]
    fn test_undo_outside_play() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.play(c(4, 4)).unwrap();
        game.pass().unwrap();
        game.pass().unwrap();
        assert_eq!(game.undo().unwrap_err(), GameError::Scoring);
        assert_eq!(game.move_count(), 3);

        game.accept(StoneType::Black).unwrap();
        game.accept(StoneType::White).unwrap();
        assert_eq!(game.undo().unwrap_err(), GameError::Finished);
    }

    #[test]
    fn test_branch_records_variation() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.play(c(2, 2)).unwrap();
        let line = game.branch(1, &[c(6, 6), c(2, 6)]).unwrap();
        assert_eq!(line.len(), 2);
        assert_eq!(line[0].variation(), &[c(6, 6)]);
        assert_eq!(line[1].variation(), &[c(6, 6), c(2, 6)]);
        assert_eq!(line[1].stone_at(c(6, 6)), Some(StoneType::White));
        assert_eq!(line[1].stone_at(c(2, 6)), Some(StoneType::Black));
        assert_eq!(game.move_count(), 1);
    }

    #[test]
    fn test_position_at() {
        let mut game = Game::new(Position::square(9).unwrap());
        game.play(c(2, 2)).unwrap();
        assert!(game.position_at(0).unwrap().stones().is_empty());
        assert_eq!(game.position_at(5).unwrap_err(), GameError::NoSuchMove(5));
    }
}
