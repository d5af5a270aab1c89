//! Rules engine: move application, dead-stone marking and scoring.
//!
//! Every function here is pure. It reads the given [`Position`] and returns a
//! new one (or a [`RulesError`]), so positions can be shared freely between
//! threads without locking.
//!
//! Legality follows the usual order:
//! 1. The point must be on the board and empty (passes are always legal).
//! 2. Opposing groups left without liberties are captured.
//! 3. If nothing was captured and the new stone's group has no liberties, the
//!    move is suicide.
//! 4. A single-stone capture that recreates the board from one move earlier
//!    retakes a ko.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::cell::{Cell, CoordError, StoneType};
use crate::position::{Position, StoneSets};

/// Reasons a move or setup is rejected. Rejections never touch the input
/// position; the caller simply keeps using it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("illegal move at {0}: point is off the board or not empty")]
    IllegalMove(Cell),
    #[error("illegal move at {0}: suicide")]
    SuicideMove(Cell),
    #[error("illegal move at {0}: retakes ko")]
    KoViolation(Cell),
    #[error("illegal move at {0}: repeats an earlier board")]
    SuperkoViolation(Cell),
    #[error("cell {0} is given to both colors")]
    ConflictingSetup(Cell),
    #[error("no handicap placement for {handicap} stones on {size}x{size}")]
    UnsupportedHandicap { size: usize, handicap: usize },
    #[error(transparent)]
    Board(#[from] CoordError),
}

/// A connected group of same-coloured stones and its liberties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub color: StoneType,
    pub stones: HashSet<Cell>,
    pub liberties: HashSet<Cell>,
}

/// Flood-fill the group containing `start`. Returns `None` on an empty point.
pub fn group_at(stones: &StoneSets, start: Cell, width: usize, height: usize) -> Option<Group> {
    let color = stones.get(start)?;
    let mut group = HashSet::from([start]);
    let mut liberties = HashSet::new();
    let mut stack = vec![start];

    while let Some(pt) = stack.pop() {
        for n in pt.neighbours(width, height) {
            match stones.get(n) {
                None => {
                    liberties.insert(n);
                }
                Some(c) if c == color && group.insert(n) => stack.push(n),
                _ => {}
            }
        }
    }

    Some(Group {
        color,
        stones: group,
        liberties,
    })
}

/// Play `player` at `cell` (or pass) and return the resulting position.
///
/// # Errors
/// - [`RulesError::IllegalMove`] if the point is off the board or occupied
/// - [`RulesError::SuicideMove`] if the move leaves its own group without
///   liberties and captures nothing
/// - [`RulesError::KoViolation`] if a single-stone capture recreates the
///   board from one move earlier
pub fn apply_move(position: &Position, cell: Cell, player: StoneType) -> Result<Position, RulesError> {
    let (width, height) = (position.board_width, position.board_height);

    let mut pos = position.clone();
    pos.previous_stones = Some(Arc::new(position.stones.clone()));
    pos.last_move = Some(cell);
    pos.last_player_to_move = Some(player);
    pos.next_to_move = player.opponent();
    pos.current_move_index = position.current_move_index + 1;
    pos.custom_marks.clear();
    pos.variation.clear();

    if cell.is_pass() {
        return Ok(pos);
    }
    if !position.is_on_board(cell) || position.stone_at(cell).is_some() {
        return Err(RulesError::IllegalMove(cell));
    }

    // Scoring marks describe the old board only.
    pos.removed_spots.clear();
    pos.white_territory.clear();
    pos.black_territory.clear();

    let opponent = player.opponent();
    pos.stones.of_mut(player).insert(cell);

    let mut captured: HashSet<Cell> = HashSet::new();
    for n in cell.neighbours(width, height) {
        if pos.stones.get(n) != Some(opponent) || captured.contains(&n) {
            continue;
        }
        if let Some(group) = group_at(&pos.stones, n, width, height) {
            if group.liberties.is_empty() {
                captured.extend(group.stones);
            }
        }
    }

    if captured.is_empty() {
        let own = group_at(&pos.stones, cell, width, height);
        if own.is_some_and(|g| g.liberties.is_empty()) {
            return Err(RulesError::SuicideMove(cell));
        }
        return Ok(pos);
    }

    let opponent_stones = pos.stones.of_mut(opponent);
    for c in &captured {
        opponent_stones.remove(c);
    }
    match player {
        StoneType::Black => pos.black_capture_count += captured.len() as u32,
        StoneType::White => pos.white_capture_count += captured.len() as u32,
    }

    if captured.len() == 1 && position.previous_stones() == Some(&pos.stones) {
        return Err(RulesError::KoViolation(cell));
    }

    Ok(pos)
}

/// Whether `candidate` repeats the stone layout of any position in `history`.
pub fn is_superko<'a>(candidate: &Position, history: impl IntoIterator<Item = &'a Position>) -> bool {
    history
        .into_iter()
        .any(|earlier| earlier.has_same_stones_as(candidate))
}

/// Toggle the dead mark on the group containing `cell`.
///
/// On a stone the unit is its connected same-coloured group; on an empty
/// point it is the connected empty region (marking it neutral). If any member
/// of the unit is unmarked the whole unit is marked, otherwise the whole unit
/// is unmarked. Off-board cells and passes leave the position unchanged.
pub fn mark_dead(position: &Position, cell: Cell) -> Position {
    let mut pos = position.clone();
    if cell.is_pass() || !position.is_on_board(cell) {
        return pos;
    }

    let unit = match group_at(&position.stones, cell, position.board_width, position.board_height) {
        Some(group) => group.stones,
        None => empty_region(position, cell),
    };

    if unit.iter().all(|c| pos.removed_spots.contains(c)) {
        for c in &unit {
            pos.removed_spots.remove(c);
        }
    } else {
        pos.removed_spots.extend(unit);
    }
    pos
}

fn empty_region(position: &Position, start: Cell) -> HashSet<Cell> {
    let mut region = HashSet::from([start]);
    let mut stack = vec![start];
    while let Some(pt) = stack.pop() {
        for n in pt.neighbours(position.board_width, position.board_height) {
            if position.stone_at(n).is_none() && region.insert(n) {
                stack.push(n);
            }
        }
    }
    region
}

/// Assign territory from the current dead-stone marks.
///
/// Regions of empty points and dead stones are flood-filled up to living
/// stones. A region bordered by living stones of only one colour becomes that
/// colour's territory. A region bordered by both colours, or by none, is
/// neutral and its empty points are marked as dame in `removed_spots`.
/// Points already marked as dame are respected and never filled through.
pub fn compute_territory(position: &Position) -> Position {
    let mut pos = position.clone();
    pos.white_territory.clear();
    pos.black_territory.clear();

    let mut seen: HashSet<Cell> = HashSet::new();
    for cell in position.cells() {
        if position.is_living_stone(cell) || position.is_marked_dame(cell) || !seen.insert(cell) {
            continue;
        }

        let mut region = vec![];
        let mut stack = vec![cell];
        let (mut found_black, mut found_white) = (false, false);

        while let Some(pt) = stack.pop() {
            region.push(pt);
            for n in pt.neighbours(position.board_width, position.board_height) {
                if position.is_living_stone(n) {
                    match position.stone_at(n) {
                        Some(StoneType::Black) => found_black = true,
                        Some(StoneType::White) => found_white = true,
                        None => {}
                    }
                } else if !position.is_marked_dame(n) && seen.insert(n) {
                    stack.push(n);
                }
            }
        }

        match (found_black, found_white) {
            (true, false) => pos.black_territory.extend(region),
            (false, true) => pos.white_territory.extend(region),
            _ => pos.removed_spots.extend(
                region
                    .into_iter()
                    .filter(|c| position.stone_at(*c).is_none()),
            ),
        }
    }
    pos
}

/// How points are counted at the end of the game.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ScoringRules {
    /// Living stones plus territory (Chinese/AGA style).
    #[default]
    Area,
    /// Territory plus prisoners (Japanese/Korean style).
    Territory,
}

impl ScoringRules {
    /// Map a ruleset name as used by servers and analysis engines.
    pub fn for_ruleset(name: &str) -> ScoringRules {
        match name.to_ascii_lowercase().as_str() {
            "japanese" | "korean" => ScoringRules::Territory,
            _ => ScoringRules::Area,
        }
    }
}

/// One side's score breakdown.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ColorScore {
    /// Living stones on the board.
    pub stones: u32,
    /// Territory points (including points under dead opponent stones).
    pub territory: u32,
    /// Captured stones plus dead opponent stones.
    pub prisoners: u32,
    pub komi: f32,
    pub total: f32,
}

/// Final score of a position.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Score {
    pub black: ColorScore,
    pub white: ColorScore,
}

impl Score {
    /// The winner, or `None` on a tie.
    pub fn winner(&self) -> Option<StoneType> {
        if self.black.total > self.white.total {
            Some(StoneType::Black)
        } else if self.white.total > self.black.total {
            Some(StoneType::White)
        } else {
            None
        }
    }

    /// Result in the usual `B+3.5` / `W+0.5` / `0` form.
    pub fn result_string(&self) -> String {
        let margin = (self.black.total - self.white.total).abs();
        match self.winner() {
            Some(color) => format!("{}+{margin}", color.letter()),
            None => "0".to_string(),
        }
    }
}

/// Score a position whose territory has been computed.
///
/// Dead stones never count for their owner. Komi (if any) goes to White.
pub fn score(position: &Position, rules: ScoringRules) -> Score {
    let side = |color: StoneType| {
        let stones = position.stones.of(color);
        let dead = stones
            .iter()
            .filter(|c| position.removed_spots.contains(c))
            .count() as u32;
        let dead_opponents = position.dead_stones(color.opponent()).len() as u32;
        let territory = position
            .territory(color)
            .iter()
            .filter(|c| !position.is_living_stone(**c))
            .count() as u32;
        let komi = match color {
            StoneType::White => position.komi.unwrap_or(0.0),
            StoneType::Black => 0.0,
        };
        let prisoners = position.capture_count(color) + dead_opponents;
        let living = stones.len() as u32 - dead;
        let total = match rules {
            ScoringRules::Area => (living + territory) as f32 + komi,
            ScoringRules::Territory => (territory + prisoners) as f32 + komi,
        };
        ColorScore {
            stones: living,
            territory,
            prisoners,
            komi,
            total,
        }
    };

    Score {
        black: side(StoneType::Black),
        white: side(StoneType::White),
    }
}
