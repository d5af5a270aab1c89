//! Dotted move-path notation used for joseki positions and stored variations.
//!
//! A path looks like `.root.dd.pd.pass.Q16`: an optional `root` marker
//! followed by one token per move. Tokens are SGF pairs (`dd`), GTP vertices
//! (`Q16`) or `pass`. Moves alternate colours starting with Black and are
//! replayed through the rules engine, so decoding a path rebuilds captures as
//! well as stones.

use serde::Deserialize;
use thiserror::Error;

use crate::cell::{Cell, CoordError, StoneType};
use crate::constants::{DEFAULT_BOARD_SIZE, PASS_TOKEN, ROOT_TOKEN};
use crate::position::{Mark, PlayCategory, Position};
use crate::rules::{self, RulesError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MovePathError {
    #[error("move {index}: {source}")]
    Coord { index: usize, source: CoordError },
    #[error("move {index}: {source}")]
    Rules { index: usize, source: RulesError },
    #[error(transparent)]
    Board(#[from] CoordError),
}

/// Split a path into its move tokens, dropping the root marker and empty tokens.
pub fn tokens(path: &str) -> impl Iterator<Item = &str> {
    path.split('.')
        .filter(|t| !t.is_empty())
        .enumerate()
        .filter(|&(i, t)| !(i == 0 && t == ROOT_TOKEN))
        .map(|(_, t)| t)
}

/// Decode one token on a board of the given height.
pub fn parse_token(token: &str, height: usize) -> Result<Cell, CoordError> {
    if token.eq_ignore_ascii_case(PASS_TOKEN) {
        return Ok(Cell::PASS);
    }
    let sgf_like = token.len() == 2 && token.bytes().all(|b| b.is_ascii_lowercase());
    if sgf_like {
        Cell::from_sgf(token)
    } else {
        Cell::from_gtp(token, height)
    }
}

/// Decode a path into its list of moves.
pub fn decode_moves(path: &str, height: usize) -> Result<Vec<Cell>, MovePathError> {
    tokens(path)
        .enumerate()
        .map(|(index, t)| parse_token(t, height).map_err(|source| MovePathError::Coord { index, source }))
        .collect()
}

/// Replay `moves` from `start`, alternating colours from the side to move.
pub fn replay_moves(start: &Position, moves: &[Cell]) -> Result<Position, MovePathError> {
    moves.iter().enumerate().try_fold(start.clone(), |pos, (index, &cell)| {
        rules::apply_move(&pos, cell, pos.next_to_move())
            .map_err(|source| MovePathError::Rules { index, source })
    })
}

/// Decode a path on an empty `size x size` board.
pub fn decode(path: &str, size: usize) -> Result<Position, MovePathError> {
    let start = Position::square(size)?;
    let moves = decode_moves(path, size)?;
    replay_moves(&start, &moves)
}

/// Encode moves as `.root.dd.pd...`, passes as `pass`.
pub fn encode(moves: &[Cell]) -> String {
    let mut out = format!(".{ROOT_TOKEN}");
    for cell in moves {
        out.push('.');
        if cell.is_pass() {
            out.push_str(PASS_TOKEN);
        } else {
            out.push_str(&cell.to_sgf());
        }
    }
    out
}

/// A joseki explorer node as served by the joseki database.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct JosekiNode {
    pub node_id: Option<u64>,
    pub description: Option<String>,
    pub variation_label: Option<String>,
    pub category: Option<PlayCategory>,
    /// The move that leads here, as a single path token.
    pub placement: Option<String>,
    /// Full move path from the root.
    pub play: Option<String>,
    pub next_moves: Vec<JosekiNode>,
    pub labels: Vec<JosekiLabel>,
}

/// A free-standing board label attached to a joseki node.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct JosekiLabel {
    pub placement: String,
    pub text: Option<String>,
    pub category: Option<PlayCategory>,
}

impl JosekiNode {
    /// Rebuild the position of this node on a 19x19 board.
    ///
    /// Every continuation becomes a mark carrying its variation label (or the
    /// text of a label placed on the same point) and its category. Labels on
    /// points with no continuation are added as plain marks.
    pub fn to_position(&self) -> Result<Position, MovePathError> {
        let size = DEFAULT_BOARD_SIZE;
        let pos = decode(self.play.as_deref().unwrap_or(""), size)?;

        let labels: Vec<(Cell, &JosekiLabel)> = self
            .labels
            .iter()
            .enumerate()
            .map(|(index, l)| {
                parse_token(&l.placement, size)
                    .map(|cell| (cell, l))
                    .map_err(|source| MovePathError::Coord { index, source })
            })
            .collect::<Result<_, _>>()?;

        let mut marks = Vec::new();
        let mut continuations = Vec::new();
        for (index, next) in self.next_moves.iter().enumerate() {
            let Some(placement) = next.placement.as_deref() else {
                continue;
            };
            if placement.eq_ignore_ascii_case(PASS_TOKEN) || placement == ROOT_TOKEN {
                continue;
            }
            let cell = parse_token(placement, size)
                .map_err(|source| MovePathError::Coord { index, source })?;
            let text = labels
                .iter()
                .find(|(c, _)| *c == cell)
                .map(|(_, l)| l.text.clone())
                .unwrap_or_else(|| next.variation_label.clone());
            marks.push(Mark::new(cell, text, next.category));
            continuations.push(cell);
        }
        marks.extend(
            labels
                .iter()
                .filter(|(cell, _)| !continuations.contains(cell))
                .map(|(cell, l)| Mark::new(*cell, l.text.clone(), l.category)),
        );

        Ok(pos.with_marks(marks))
    }
}
