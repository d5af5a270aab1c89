//! Board coordinates, stone colours and coordinate notations.
//!
//! A [`Cell`] is a plain `(x, y)` pair with `(0, 0)` in the top-left corner and
//! `y` growing downwards. The reserved value [`Cell::PASS`] stands for a pass.
//!
//! Two textual notations are supported:
//! - GTP vertices (`"D4"`): column letter skipping `I`, row counted from the
//!   bottom edge, so they depend on the board height.
//! - SGF pairs (`"dp"`): column and row letters from `'a'`, independent of size.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{GTP_COLUMNS, MAX_BOARD_SIZE, PASS_GTP, PASS_SGF};

/// Colour of a stone. There is no empty variant: a cell absent from both
/// stone sets of a position is empty.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoneType {
    Black,
    White,
}

impl StoneType {
    pub fn opponent(self) -> StoneType {
        match self {
            StoneType::Black => StoneType::White,
            StoneType::White => StoneType::Black,
        }
    }

    /// Single-letter player name used by GTP and the analysis protocol.
    pub fn letter(self) -> &'static str {
        match self {
            StoneType::Black => "B",
            StoneType::White => "W",
        }
    }

    /// Parse a GTP colour (`b`, `black`, `w`, `white`, any case).
    pub fn from_name(s: &str) -> Result<StoneType, CoordError> {
        match s.to_ascii_lowercase().as_str() {
            "b" | "black" => Ok(StoneType::Black),
            "w" | "white" => Ok(StoneType::White),
            _ => Err(CoordError::InvalidColor(s.to_string())),
        }
    }
}

/// A malformed coordinate or colour string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    #[error("invalid vertex `{0}`")]
    InvalidVertex(String),
    #[error("invalid sgf coordinate `{0}`")]
    InvalidSgf(String),
    #[error("invalid color `{0}`")]
    InvalidColor(String),
    #[error("board size {0} is not supported (1..={MAX_BOARD_SIZE})")]
    UnsupportedSize(usize),
}

/// A point on the board, or the pass sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    /// The pass move.
    pub const PASS: Cell = Cell { x: -1, y: -1 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn is_pass(self) -> bool {
        self == Cell::PASS
    }

    #[inline]
    pub fn left(self) -> Cell {
        Cell::new(self.x - 1, self.y)
    }

    #[inline]
    pub fn right(self) -> Cell {
        Cell::new(self.x + 1, self.y)
    }

    #[inline]
    pub fn top(self) -> Cell {
        Cell::new(self.x, self.y - 1)
    }

    #[inline]
    pub fn bottom(self) -> Cell {
        Cell::new(self.x, self.y + 1)
    }

    /// Whether the cell lies on a `width x height` board.
    #[inline]
    pub fn is_on_board(self, width: usize, height: usize) -> bool {
        self.x >= 0 && self.y >= 0 && (self.x as usize) < width && (self.y as usize) < height
    }

    /// The orthogonal neighbours that lie on a `width x height` board.
    pub fn neighbours(self, width: usize, height: usize) -> impl Iterator<Item = Cell> {
        [self.top(), self.bottom(), self.left(), self.right()]
            .into_iter()
            .filter(move |c| c.is_on_board(width, height))
    }

    /// Row-major index on a board of the given width. The cell must be on board.
    #[inline]
    pub fn index(self, width: usize) -> usize {
        self.y as usize * width + self.x as usize
    }

    /// Inverse of [`Cell::index`].
    #[inline]
    pub fn from_index(index: usize, width: usize) -> Cell {
        Cell::new((index % width) as i32, (index / width) as i32)
    }

    /// GTP vertex such as `"D4"`, or `"PASS"`.
    ///
    /// The cell must lie on a board no wider than [`MAX_BOARD_SIZE`], which
    /// every [`crate::position::Position`] is.
    pub fn to_gtp(self, height: usize) -> String {
        if self.is_pass() {
            return PASS_GTP.into();
        }
        let col = GTP_COLUMNS[self.x as usize] as char;
        format!("{col}{}", height as i32 - self.y)
    }

    /// Parse a GTP vertex. `pass` is accepted in any case.
    pub fn from_gtp(s: &str, height: usize) -> Result<Cell, CoordError> {
        let invalid = || CoordError::InvalidVertex(s.to_string());
        if s.eq_ignore_ascii_case(PASS_GTP) {
            return Ok(Cell::PASS);
        }
        let bytes = s.as_bytes();
        if bytes.len() < 2 {
            return Err(invalid());
        }
        let col_char = bytes[0].to_ascii_uppercase();
        let x = GTP_COLUMNS
            .iter()
            .position(|&c| c == col_char)
            .ok_or_else(invalid)?;
        let row: usize = s[1..].parse().map_err(|_| invalid())?;
        if row == 0 || row > height {
            return Err(invalid());
        }
        Ok(Cell::new(x as i32, (height - row) as i32))
    }

    /// SGF pair such as `"dp"`, or `".."` for a pass.
    pub fn to_sgf(self) -> String {
        if self.is_pass() {
            return PASS_SGF.into();
        }
        let column = (b'a' + self.x as u8) as char;
        let row = (b'a' + self.y as u8) as char;
        format!("{column}{row}")
    }

    /// Parse a single SGF pair. `".."` and the empty pair `""` are passes.
    pub fn from_sgf(s: &str) -> Result<Cell, CoordError> {
        if s.is_empty() || s == PASS_SGF {
            return Ok(Cell::PASS);
        }
        match s.as_bytes() {
            [c, r] if c.is_ascii_lowercase() && r.is_ascii_lowercase() => {
                Ok(Cell::new((c - b'a') as i32, (r - b'a') as i32))
            }
            _ => Err(CoordError::InvalidSgf(s.to_string())),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pass() {
            write!(f, "pass")
        } else {
            write!(f, "({}, {})", self.x, self.y)
        }
    }
}

/// Decode a string of concatenated SGF pairs (`"pddp"` -> two cells).
///
/// Used for initial states, removed-stone lists and scoring positions.
pub fn cells_from_sgf(s: &str) -> Result<Vec<Cell>, CoordError> {
    if s.len() % 2 != 0 {
        return Err(CoordError::InvalidSgf(s.to_string()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .ok_or_else(|| CoordError::InvalidSgf(s.to_string()))
                .and_then(Cell::from_sgf)
        })
        .collect()
}

/// Encode cells as concatenated SGF pairs.
pub fn cells_to_sgf<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> String {
    cells.into_iter().map(|c| c.to_sgf()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbour_accessors_are_unchecked() {
        let c = Cell::new(0, 0);
        assert_eq!(c.left(), Cell::new(-1, 0));
        assert_eq!(c.top(), Cell::new(0, -1));
        assert_eq!(c.right(), Cell::new(1, 0));
        assert_eq!(c.bottom(), Cell::new(0, 1));
    }

    #[test]
    fn test_neighbours_clip_to_board() {
        let corner: Vec<Cell> = Cell::new(0, 0).neighbours(9, 9).collect();
        assert_eq!(corner.len(), 2);
        let centre: Vec<Cell> = Cell::new(4, 4).neighbours(9, 9).collect();
        assert_eq!(centre.len(), 4);
        let edge: Vec<Cell> = Cell::new(8, 4).neighbours(9, 9).collect();
        assert_eq!(edge.len(), 3);
    }

    #[test]
    fn test_gtp_skips_i() {
        assert_eq!(Cell::from_gtp("H5", 9).unwrap(), Cell::new(7, 4));
        assert_eq!(Cell::from_gtp("J5", 9).unwrap(), Cell::new(8, 4));
        assert_eq!(Cell::new(8, 0).to_gtp(9), "J9");
    }

    #[test]
    fn test_gtp_rows_count_from_bottom() {
        assert_eq!(Cell::from_gtp("A1", 19).unwrap(), Cell::new(0, 18));
        assert_eq!(Cell::from_gtp("q16", 19).unwrap(), Cell::new(15, 3));
        assert_eq!(Cell::new(3, 3).to_gtp(19), "D16");
    }

    #[test]
    fn test_gtp_pass() {
        assert_eq!(Cell::from_gtp("pass", 19).unwrap(), Cell::PASS);
        assert_eq!(Cell::from_gtp("PASS", 9).unwrap(), Cell::PASS);
        assert_eq!(Cell::PASS.to_gtp(19), "PASS");
    }

    #[test]
    fn test_gtp_rejects_garbage() {
        assert!(Cell::from_gtp("I5", 9).is_err());
        assert!(Cell::from_gtp("A10", 9).is_err());
        assert!(Cell::from_gtp("A0", 9).is_err());
        assert!(Cell::from_gtp("Z", 9).is_err());
        assert!(Cell::from_gtp("Ax", 9).is_err());
    }

    #[test]
    fn test_sgf_pairs() {
        assert_eq!(Cell::from_sgf("dp").unwrap(), Cell::new(3, 15));
        assert_eq!(Cell::new(15, 3).to_sgf(), "pd");
        assert_eq!(Cell::from_sgf("..").unwrap(), Cell::PASS);
        assert!(Cell::from_sgf("D4").is_err());
    }

    #[test]
    fn test_cells_from_sgf() {
        let cells = cells_from_sgf("pddp").unwrap();
        assert_eq!(cells, vec![Cell::new(15, 3), Cell::new(3, 15)]);
        assert_eq!(cells_to_sgf(&cells), "pddp");
        assert!(cells_from_sgf("pdd").is_err());
        assert!(cells_from_sgf("").unwrap().is_empty());
    }

    #[test]
    fn test_color_names() {
        assert_eq!(StoneType::from_name("B").unwrap(), StoneType::Black);
        assert_eq!(StoneType::from_name("white").unwrap(), StoneType::White);
        assert!(StoneType::from_name("red").is_err());
        assert_eq!(StoneType::Black.opponent(), StoneType::White);
    }
}
