//! Immutable Go position.
//!
//! A [`Position`] is a full snapshot of the board: stones of both colours,
//! capture counts, scoring marks, annotations and move metadata. Nothing in
//! this crate edits a position that has been handed out; the rules engine
//! always builds a new one (see [`crate::rules::apply_move`]).
//!
//! Each position also remembers the stone layout it was derived from. That
//! single back-step is all the simple ko rule needs, and it is shared through
//! an [`Arc`] so successors never copy it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CoordError, StoneType, cells_from_sgf};
use crate::constants::{
    HANDICAP_9, HANDICAP_13, HANDICAP_19, KOMI_9X9_EVEN, KOMI_9X9_HANDICAP, KOMI_EVEN,
    KOMI_HANDICAP, MAX_BOARD_SIZE, MAX_HANDICAP,
};
use crate::rules::RulesError;

/// Semantic tag attached to a [`Mark`] by the joseki explorer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayCategory {
    Ideal,
    Good,
    Mistake,
    Trick,
    Question,
    Label,
}

/// Display-only annotation on a cell. Never affects game state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mark {
    pub placement: Cell,
    pub text: Option<String>,
    pub category: Option<PlayCategory>,
}

impl Mark {
    pub fn new(placement: Cell, text: Option<String>, category: Option<PlayCategory>) -> Self {
        Self {
            placement,
            text,
            category,
        }
    }
}

/// The two disjoint stone sets of a board.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoneSets {
    pub black: HashSet<Cell>,
    pub white: HashSet<Cell>,
}

impl StoneSets {
    pub fn get(&self, cell: Cell) -> Option<StoneType> {
        if self.black.contains(&cell) {
            Some(StoneType::Black)
        } else if self.white.contains(&cell) {
            Some(StoneType::White)
        } else {
            None
        }
    }

    pub fn of(&self, color: StoneType) -> &HashSet<Cell> {
        match color {
            StoneType::Black => &self.black,
            StoneType::White => &self.white,
        }
    }

    pub(crate) fn of_mut(&mut self, color: StoneType) -> &mut HashSet<Cell> {
        match color {
            StoneType::Black => &mut self.black,
            StoneType::White => &mut self.white,
        }
    }

    pub fn len(&self) -> usize {
        self.black.len() + self.white.len()
    }

    pub fn is_empty(&self) -> bool {
        self.black.is_empty() && self.white.is_empty()
    }
}

/// A Go position (board state plus metadata).
#[derive(Clone, Debug)]
pub struct Position {
    pub(crate) board_width: usize,
    pub(crate) board_height: usize,
    pub(crate) stones: StoneSets,
    pub(crate) white_capture_count: u32,
    pub(crate) black_capture_count: u32,
    pub(crate) komi: Option<f32>,
    pub(crate) handicap: usize,
    pub(crate) free_handicap_placement: bool,
    pub(crate) white_territory: HashSet<Cell>,
    pub(crate) black_territory: HashSet<Cell>,
    pub(crate) last_move: Option<Cell>,
    pub(crate) last_player_to_move: Option<StoneType>,
    pub(crate) removed_spots: HashSet<Cell>,
    pub(crate) next_to_move: StoneType,
    pub(crate) custom_marks: HashSet<Mark>,
    pub(crate) variation: Vec<Cell>,
    pub(crate) current_move_index: usize,
    /// Stones of the position this one was derived from.
    pub(crate) previous_stones: Option<Arc<StoneSets>>,
}

impl Position {
    /// An empty board with Black to move.
    ///
    /// Each side must be between 1 and [`MAX_BOARD_SIZE`] points.
    pub fn new(board_width: usize, board_height: usize) -> Result<Self, CoordError> {
        check_board_size(board_width)?;
        check_board_size(board_height)?;
        Ok(Self::blank(board_width, board_height))
    }

    /// An empty square board.
    pub fn square(size: usize) -> Result<Self, CoordError> {
        Self::new(size, size)
    }

    /// Empty board of a size already known to be supported.
    pub(crate) fn blank(board_width: usize, board_height: usize) -> Self {
        Position {
            board_width,
            board_height,
            stones: StoneSets::default(),
            white_capture_count: 0,
            black_capture_count: 0,
            komi: None,
            handicap: 0,
            free_handicap_placement: false,
            white_territory: HashSet::new(),
            black_territory: HashSet::new(),
            last_move: None,
            last_player_to_move: None,
            removed_spots: HashSet::new(),
            next_to_move: StoneType::Black,
            custom_marks: HashSet::new(),
            variation: Vec::new(),
            current_move_index: 0,
            previous_stones: None,
        }
    }

    /// A board with stones placed directly, without applying any rules.
    ///
    /// Used for initial states (handicap, puzzles). Fails if the size is not
    /// supported, a stone is off the board or a cell is given to both colours.
    pub fn with_setup(
        board_width: usize,
        board_height: usize,
        black: impl IntoIterator<Item = Cell>,
        white: impl IntoIterator<Item = Cell>,
    ) -> Result<Self, RulesError> {
        let mut pos = Self::new(board_width, board_height)?;
        for (color, cells) in [
            (StoneType::Black, black.into_iter().collect::<Vec<_>>()),
            (StoneType::White, white.into_iter().collect::<Vec<_>>()),
        ] {
            for cell in cells {
                if !pos.is_on_board(cell) {
                    return Err(RulesError::IllegalMove(cell));
                }
                if pos.stones.get(cell).is_some_and(|c| c != color) {
                    return Err(RulesError::ConflictingSetup(cell));
                }
                pos.stones.of_mut(color).insert(cell);
            }
        }
        Ok(pos)
    }

    /// A square board with the standard fixed handicap placement and komi.
    ///
    /// With a handicap above one, White moves first.
    pub fn with_handicap(size: usize, handicap: usize) -> Result<Self, RulesError> {
        if !has_handicap_table(size, handicap) {
            return Err(RulesError::UnsupportedHandicap { size, handicap });
        }
        let mut pos = Self::square(size)?;
        pos.handicap = handicap;
        pos.komi = Some(determine_komi(size, handicap));
        if handicap > 1 {
            let table = match size {
                19 => &HANDICAP_19,
                13 => &HANDICAP_13,
                9 => &HANDICAP_9,
                _ => return Err(RulesError::UnsupportedHandicap { size, handicap }),
            };
            let placement = table
                .get(handicap)
                .ok_or(RulesError::UnsupportedHandicap { size, handicap })?;
            let stones = cells_from_sgf(placement)
                .map_err(|_| RulesError::UnsupportedHandicap { size, handicap })?;
            pos.stones.black.extend(stones);
            pos.next_to_move = StoneType::White;
        }
        Ok(pos)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn board_width(&self) -> usize {
        self.board_width
    }

    pub fn board_height(&self) -> usize {
        self.board_height
    }

    pub fn stones(&self) -> &StoneSets {
        &self.stones
    }

    pub fn white_stones(&self) -> &HashSet<Cell> {
        &self.stones.white
    }

    pub fn black_stones(&self) -> &HashSet<Cell> {
        &self.stones.black
    }

    pub fn white_capture_count(&self) -> u32 {
        self.white_capture_count
    }

    pub fn black_capture_count(&self) -> u32 {
        self.black_capture_count
    }

    /// Stones captured by `color`.
    pub fn capture_count(&self, color: StoneType) -> u32 {
        match color {
            StoneType::Black => self.black_capture_count,
            StoneType::White => self.white_capture_count,
        }
    }

    pub fn komi(&self) -> Option<f32> {
        self.komi
    }

    pub fn handicap(&self) -> usize {
        self.handicap
    }

    pub fn free_handicap_placement(&self) -> bool {
        self.free_handicap_placement
    }

    pub fn white_territory(&self) -> &HashSet<Cell> {
        &self.white_territory
    }

    pub fn black_territory(&self) -> &HashSet<Cell> {
        &self.black_territory
    }

    pub fn territory(&self, color: StoneType) -> &HashSet<Cell> {
        match color {
            StoneType::Black => &self.black_territory,
            StoneType::White => &self.white_territory,
        }
    }

    pub fn last_move(&self) -> Option<Cell> {
        self.last_move
    }

    pub fn last_player_to_move(&self) -> Option<StoneType> {
        self.last_player_to_move
    }

    pub fn removed_spots(&self) -> &HashSet<Cell> {
        &self.removed_spots
    }

    pub fn next_to_move(&self) -> StoneType {
        self.next_to_move
    }

    pub fn custom_marks(&self) -> &HashSet<Mark> {
        &self.custom_marks
    }

    pub fn variation(&self) -> &[Cell] {
        &self.variation
    }

    pub fn current_move_index(&self) -> usize {
        self.current_move_index
    }

    /// Stone layout one move before this position, if any.
    pub fn previous_stones(&self) -> Option<&StoneSets> {
        self.previous_stones.as_deref()
    }

    #[inline]
    pub fn is_on_board(&self, cell: Cell) -> bool {
        cell.is_on_board(self.board_width, self.board_height)
    }

    pub fn stone_at(&self, cell: Cell) -> Option<StoneType> {
        self.stones.get(cell)
    }

    /// All on-board cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + use<> {
        let (w, h) = (self.board_width as i32, self.board_height as i32);
        (0..h).flat_map(move |y| (0..w).map(move |x| Cell::new(x, y)))
    }

    // -------------------------------------------------------------------------
    // Derived sets
    // -------------------------------------------------------------------------

    pub fn white_dead_stones(&self) -> HashSet<Cell> {
        self.removed_spots
            .intersection(&self.stones.white)
            .copied()
            .collect()
    }

    pub fn black_dead_stones(&self) -> HashSet<Cell> {
        self.removed_spots
            .intersection(&self.stones.black)
            .copied()
            .collect()
    }

    pub fn dead_stones(&self, color: StoneType) -> HashSet<Cell> {
        match color {
            StoneType::Black => self.black_dead_stones(),
            StoneType::White => self.white_dead_stones(),
        }
    }

    /// Removed spots that belong to neither side's territory.
    pub fn dame(&self) -> HashSet<Cell> {
        self.removed_spots
            .iter()
            .filter(|c| !self.white_territory.contains(c) && !self.black_territory.contains(c))
            .copied()
            .collect()
    }

    /// A stone on the board that has not been marked dead.
    pub fn is_living_stone(&self, cell: Cell) -> bool {
        self.stones.get(cell).is_some() && !self.removed_spots.contains(&cell)
    }

    pub fn living_stones(&self, color: StoneType) -> HashSet<Cell> {
        self.stones
            .of(color)
            .difference(&self.removed_spots)
            .copied()
            .collect()
    }

    /// An empty point marked as neutral during scoring.
    pub fn is_marked_dame(&self, cell: Cell) -> bool {
        self.stones.get(cell).is_none() && self.removed_spots.contains(&cell)
    }

    pub fn has_same_stones_as(&self, other: &Position) -> bool {
        self.stones == other.stones
    }

    // -------------------------------------------------------------------------
    // Derivations
    // -------------------------------------------------------------------------

    pub fn with_komi(&self, komi: Option<f32>) -> Position {
        Position {
            komi,
            ..self.clone()
        }
    }

    pub fn with_next_to_move(&self, next_to_move: StoneType) -> Position {
        Position {
            next_to_move,
            ..self.clone()
        }
    }

    pub fn with_marks(&self, marks: impl IntoIterator<Item = Mark>) -> Position {
        let mut pos = self.clone();
        pos.custom_marks.extend(marks);
        pos
    }

    pub fn with_variation(&self, variation: Vec<Cell>) -> Position {
        Position {
            variation,
            ..self.clone()
        }
    }

    pub fn with_removed_spots(&self, removed: impl IntoIterator<Item = Cell>) -> Position {
        let mut pos = self.clone();
        pos.removed_spots.extend(removed);
        pos
    }

    /// Add explicit territory marks, e.g. scoring positions sent by a server.
    pub fn with_territory(
        &self,
        color: StoneType,
        cells: impl IntoIterator<Item = Cell>,
    ) -> Position {
        let mut pos = self.clone();
        match color {
            StoneType::Black => pos.black_territory.extend(cells),
            StoneType::White => pos.white_territory.extend(cells),
        }
        pos
    }

    pub(crate) fn with_handicap_metadata(&self, handicap: usize, free: bool) -> Position {
        Position {
            handicap,
            free_handicap_placement: free,
            ..self.clone()
        }
    }

    /// Drop all scoring marks (territory and removed spots).
    pub fn without_scoring(&self) -> Position {
        Position {
            removed_spots: HashSet::new(),
            white_territory: HashSet::new(),
            black_territory: HashSet::new(),
            ..self.clone()
        }
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.board_width == other.board_width
            && self.board_height == other.board_height
            && self.stones == other.stones
            && self.removed_spots == other.removed_spots
            && self.white_territory == other.white_territory
            && self.black_territory == other.black_territory
            && self.last_move == other.last_move
            && self.white_capture_count == other.white_capture_count
            && self.black_capture_count == other.black_capture_count
            && self.next_to_move == other.next_to_move
            && self.custom_marks == other.custom_marks
    }
}

/// Standard komi for a board size and handicap.
pub fn determine_komi(size: usize, handicap: usize) -> f32 {
    match (size, handicap) {
        (9, 0) => KOMI_9X9_EVEN,
        (9, _) => KOMI_9X9_HANDICAP,
        (_, 0) => KOMI_EVEN,
        _ => KOMI_HANDICAP,
    }
}

/// Fails unless `size` is a supported board side length.
pub fn check_board_size(size: usize) -> Result<(), CoordError> {
    if (1..=MAX_BOARD_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(CoordError::UnsupportedSize(size))
    }
}

/// Whether a fixed handicap table exists for this size and handicap.
pub fn has_handicap_table(size: usize, handicap: usize) -> bool {
    handicap <= 1 || (matches!(size, 9 | 13 | 19) && handicap <= MAX_HANDICAP)
}

impl fmt::Display for Position {
    /// `X`/`O` for living stones, `x`/`o` for dead ones, `+`/`-` for black and
    /// white territory, `.` for anything else.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.board_height as i32 {
            for x in 0..self.board_width as i32 {
                let cell = Cell::new(x, y);
                let dead = self.removed_spots.contains(&cell);
                let ch = match (self.stone_at(cell), dead) {
                    (Some(StoneType::Black), false) => 'X',
                    (Some(StoneType::White), false) => 'O',
                    (Some(StoneType::Black), true) => 'x',
                    (Some(StoneType::White), true) => 'o',
                    (None, _) if self.black_territory.contains(&cell) => '+',
                    (None, _) if self.white_territory.contains(&cell) => '-',
                    (None, _) => '.',
                };
                write!(f, "{ch} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
