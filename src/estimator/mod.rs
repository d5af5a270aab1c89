//! Territory estimation.
//!
//! An estimator looks at a flattened snapshot of the board and says, for every
//! point, which colour it probably ends up belonging to. The result is
//! advisory: it seeds the dead-stone marks shown while scoring, while the final
//! score still comes from [`rules::compute_territory`] and the agreed marks.
//!
//! Two estimators are available:
//! - [`MonteCarloEstimator`], a pure Rust random-playout estimator (default)
//! - [`NativeEstimator`], a C-ABI routine reached through a function pointer
//!
//! Estimation is CPU-bound. Interactive callers go through
//! [`EstimatorWorker`], which runs estimates on a background thread and only
//! ever delivers the result of the latest request.

mod montecarlo;
mod native;
mod worker;

pub use montecarlo::MonteCarloEstimator;
pub use native::{EstimateFn, NativeEstimator};
pub use worker::{EstimateOutcome, EstimatorWorker};

use thiserror::Error;
use tracing::{debug, warn};

use crate::cell::{Cell, StoneType};
use crate::constants::{ESTIMATOR_TOLERANCE, ESTIMATOR_TRIALS};
use crate::position::Position;
use crate::rules;

/// Raw board values shared with estimator routines.
pub const EMPTY: i8 = 0;
pub const BLACK: i8 = 1;
pub const WHITE: i8 = -1;

/// Who a point is expected to belong to at the end of the game.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ownership {
    Black,
    White,
    Undecided,
}

impl Ownership {
    /// Decode a raw estimator value (`1`, `-1` or `0`).
    pub fn from_raw(value: i32) -> Option<Ownership> {
        match value {
            1 => Some(Ownership::Black),
            -1 => Some(Ownership::White),
            0 => Some(Ownership::Undecided),
            _ => None,
        }
    }

    pub fn raw(self) -> i8 {
        match self {
            Ownership::Black => BLACK,
            Ownership::White => WHITE,
            Ownership::Undecided => EMPTY,
        }
    }

    pub fn color(self) -> Option<StoneType> {
        match self {
            Ownership::Black => Some(StoneType::Black),
            Ownership::White => Some(StoneType::White),
            Ownership::Undecided => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimatorError {
    #[error("estimator unavailable: {0}")]
    Unavailable(String),
    #[error("board of {width}x{height} needs {expected} points, got {got}")]
    InvalidRequest {
        width: usize,
        height: usize,
        expected: usize,
        got: usize,
    },
    #[error("estimator returned {got} points, expected {expected}")]
    MalformedOutput { expected: usize, got: usize },
    #[error("estimator returned invalid value {value} at point {index}")]
    InvalidValue { index: usize, value: i32 },
    #[error("estimator failed: {0}")]
    Failed(String),
}

/// Estimator settings.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorConfig {
    /// Number of random playouts. Cost is linear in this.
    pub trials: u32,
    /// Fraction of trials a point must lean one way to be called.
    pub tolerance: f32,
    /// Fixed seed for reproducible playouts.
    pub seed: Option<u64>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            trials: ESTIMATOR_TRIALS,
            tolerance: ESTIMATOR_TOLERANCE,
            seed: None,
        }
    }
}

/// One call into an estimator: a flattened board and the playout settings.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimateRequest {
    pub width: usize,
    pub height: usize,
    /// Row-major, `y * width + x`, holding [`EMPTY`], [`BLACK`] or [`WHITE`].
    pub board: Vec<i8>,
    pub player_to_move: StoneType,
    pub trials: u32,
    pub tolerance: f32,
}

impl EstimateRequest {
    pub fn from_position(position: &Position, config: &EstimatorConfig) -> Self {
        Self {
            width: position.board_width(),
            height: position.board_height(),
            board: flatten_board(position),
            player_to_move: position.next_to_move(),
            trials: config.trials,
            tolerance: config.tolerance,
        }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub(crate) fn validate(&self) -> Result<(), EstimatorError> {
        if self.board.len() != self.area() {
            return Err(EstimatorError::InvalidRequest {
                width: self.width,
                height: self.height,
                expected: self.area(),
                got: self.board.len(),
            });
        }
        Ok(())
    }
}

/// A territory estimator. Implementations are stateless per call.
pub trait TerritoryEstimator: Send {
    fn estimate(&self, request: &EstimateRequest) -> Result<Vec<Ownership>, EstimatorError>;
}

impl<T: TerritoryEstimator + ?Sized> TerritoryEstimator for Box<T> {
    fn estimate(&self, request: &EstimateRequest) -> Result<Vec<Ownership>, EstimatorError> {
        (**self).estimate(request)
    }
}

/// Flatten the living stones of a position. Stones already marked dead are
/// left out so the estimator sees them as empty.
pub fn flatten_board(position: &Position) -> Vec<i8> {
    position
        .cells()
        .map(|cell| {
            if !position.is_living_stone(cell) {
                return EMPTY;
            }
            match position.stone_at(cell) {
                Some(StoneType::Black) => BLACK,
                Some(StoneType::White) => WHITE,
                None => EMPTY,
            }
        })
        .collect()
}

/// Turn an ownership map into scoring marks on a copy of `position`.
///
/// Existing territory and removed marks are replaced. A point owned by one
/// colour becomes that colour's territory unless it holds one of that colour's
/// own stones; an opposing stone on it is marked dead. Undecided empty points
/// are marked as dame. Undecided stones stay alive.
pub fn apply_ownership(position: &Position, ownership: &[Ownership]) -> Result<Position, EstimatorError> {
    let area = position.board_width() * position.board_height();
    if ownership.len() != area {
        return Err(EstimatorError::MalformedOutput {
            expected: area,
            got: ownership.len(),
        });
    }

    let mut black = Vec::new();
    let mut white = Vec::new();
    let mut removed = Vec::new();
    for (index, owner) in ownership.iter().enumerate() {
        let cell = Cell::from_index(index, position.board_width());
        let stone = position.stone_at(cell);
        match owner.color() {
            Some(color) if stone == Some(color) => {}
            Some(color) => {
                if stone.is_some() {
                    removed.push(cell);
                }
                match color {
                    StoneType::Black => black.push(cell),
                    StoneType::White => white.push(cell),
                }
            }
            None if stone.is_none() => removed.push(cell),
            None => {}
        }
    }

    Ok(position
        .without_scoring()
        .with_removed_spots(removed)
        .with_territory(StoneType::Black, black)
        .with_territory(StoneType::White, white))
}

/// Estimate territory for `position`, falling back to
/// [`rules::compute_territory`] on the existing marks if the estimator fails.
pub fn estimate_territory(
    estimator: &dyn TerritoryEstimator,
    position: &Position,
    config: &EstimatorConfig,
) -> Position {
    let request = EstimateRequest::from_position(position, config);
    let result = estimator
        .estimate(&request)
        .and_then(|ownership| apply_ownership(position, &ownership));
    match result {
        Ok(estimated) => {
            debug!(
                black = estimated.black_territory().len(),
                white = estimated.white_territory().len(),
                "territory estimated"
            );
            estimated
        }
        Err(e) => {
            warn!(error = %e, "estimator failed, computing territory from marks");
            rules::compute_territory(position)
        }
    }
}

/// Heuristic used when two players share a device: the game looks over once
/// it is longer than one board edge and fewer dame than one edge remain.
pub fn looks_finished(estimated: &Position) -> bool {
    let edge = estimated.board_width();
    estimated.current_move_index() > edge && estimated.dame().len() < edge
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Vec<Ownership>, EstimatorError>);

    impl TerritoryEstimator for Fixed {
        fn estimate(&self, _: &EstimateRequest) -> Result<Vec<Ownership>, EstimatorError> {
            self.0.clone()
        }
    }

    fn small_position() -> Position {
        // 3x2:  X O .
        //       X O .
        Position::with_setup(
            3,
            2,
            [Cell::new(0, 0), Cell::new(0, 1)],
            [Cell::new(1, 0), Cell::new(1, 1)],
        )
        .unwrap()
    }

    #[test]
    fn test_looks_finished() {
        let empty = Position::square(5).unwrap();
        assert!(!looks_finished(&rules::compute_territory(&empty)));

        // Walls on columns 1 and 2 split a 5x5 board with no dame left.
        let mut pos = empty;
        for y in 0..5 {
            pos = rules::apply_move(&pos, Cell::new(1, y), StoneType::Black).unwrap();
            pos = rules::apply_move(&pos, Cell::new(2, y), StoneType::White).unwrap();
        }
        let scored = rules::compute_territory(&pos);
        assert!(scored.dame().is_empty());
        assert!(looks_finished(&scored));

        // Same board, too few moves to be over.
        let setup = Position::with_setup(5, 5, pos.black_stones().clone(), pos.white_stones().clone());
        assert!(!looks_finished(&rules::compute_territory(&setup.unwrap())));
    }

    #[test]
    fn test_flatten_board_is_row_major() {
        let pos = Position::with_setup(3, 2, [Cell::new(2, 0)], [Cell::new(0, 1)]).unwrap();
        assert_eq!(flatten_board(&pos), vec![0, 0, 1, -1, 0, 0]);
    }

    #[test]
    fn test_flatten_board_skips_dead_stones() {
        let pos = small_position();
        let pos = rules::mark_dead(&pos, Cell::new(0, 0));
        assert_eq!(flatten_board(&pos), vec![0, -1, 0, 0, -1, 0]);
    }

    #[test]
    fn test_apply_ownership() {
        use Ownership::*;
        let pos = small_position();
        let pos = apply_ownership(&pos, &[White, White, White, Undecided, White, Undecided]).unwrap();

        assert_eq!(pos.black_dead_stones(), [Cell::new(0, 0)].into());
        assert!(pos.white_territory().contains(&Cell::new(0, 0)));
        assert!(pos.white_territory().contains(&Cell::new(2, 0)));
        assert!(!pos.white_territory().contains(&Cell::new(1, 0)));
        // Undecided stone stays alive, undecided empty point is dame.
        assert!(pos.is_living_stone(Cell::new(0, 1)));
        assert!(pos.is_marked_dame(Cell::new(2, 1)));
        assert!(pos.black_territory().is_empty());
    }

    #[test]
    fn test_apply_ownership_rejects_short_output() {
        let err = apply_ownership(&small_position(), &[Ownership::Black]).unwrap_err();
        assert_eq!(err, EstimatorError::MalformedOutput { expected: 6, got: 1 });
    }

    #[test]
    fn test_estimate_territory_falls_back() {
        let pos = small_position();
        let failing = Fixed(Err(EstimatorError::Unavailable("no library".into())));
        let estimated = estimate_territory(&failing, &pos, &EstimatorConfig::default());
        assert_eq!(estimated, rules::compute_territory(&pos));

        let short = Fixed(Ok(vec![Ownership::Black; 2]));
        let estimated = estimate_territory(&short, &pos, &EstimatorConfig::default());
        assert_eq!(estimated, rules::compute_territory(&pos));
    }

    #[test]
    fn test_ownership_raw_values() {
        assert_eq!(Ownership::from_raw(1), Some(Ownership::Black));
        assert_eq!(Ownership::from_raw(-1), Some(Ownership::White));
        assert_eq!(Ownership::from_raw(0), Some(Ownership::Undecided));
        assert_eq!(Ownership::from_raw(2), None);
        assert_eq!(Ownership::White.raw(), WHITE);
    }
}
