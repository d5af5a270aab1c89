//! Monte Carlo territory estimation (random playouts).
//!
//! Each trial plays random legal moves on a copy of the board until neither
//! side has a move left outside its own single-point eyes, fills the empty
//! regions that only one colour reaches, and adds the final colour of every
//! point to a running tally. After all trials:
//! 1. every stone group takes the strongest tally among its stones, so a group
//!    lives or dies as a unit;
//! 2. points whose tally leans past `trials * tolerance` are called for that
//!    colour, the rest stay undecided;
//! 3. undecided holes reached by only one called colour are given to it.

use fastrand::Rng;

use super::{BLACK, EMPTY, EstimateRequest, EstimatorError, Ownership, TerritoryEstimator, WHITE};
use crate::cell::StoneType;
use crate::constants::MAX_GAME_LEN_FACTOR;

/// Pure Rust playout estimator.
#[derive(Clone, Debug, Default)]
pub struct MonteCarloEstimator {
    seed: Option<u64>,
}

impl MonteCarloEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed seed so repeated estimates of the same board agree.
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    fn rng(&self) -> Rng {
        match self.seed {
            Some(seed) => Rng::with_seed(seed),
            None => Rng::new(),
        }
    }
}

impl TerritoryEstimator for MonteCarloEstimator {
    fn estimate(&self, request: &EstimateRequest) -> Result<Vec<Ownership>, EstimatorError> {
        request.validate()?;
        let board = Board::new(request.width, request.height, request.board.clone());
        let player = match request.player_to_move {
            StoneType::Black => BLACK,
            StoneType::White => WHITE,
        };
        let result = board.estimate(player, request.trials, request.tolerance, &mut self.rng());
        result
            .points
            .iter()
            .enumerate()
            .map(|(index, &v)| {
                Ownership::from_raw(v as i32).ok_or(EstimatorError::InvalidValue {
                    index,
                    value: v as i32,
                })
            })
            .collect()
    }
}

/// Flat scratch board for playouts.
#[derive(Clone, Debug)]
struct Board {
    width: usize,
    height: usize,
    points: Vec<i8>,
    /// Liberty search marks; a point is visited when it holds `stamp`.
    visited: Vec<u32>,
    stamp: u32,
}

impl Board {
    fn new(width: usize, height: usize, points: Vec<i8>) -> Self {
        let visited = vec![0; points.len()];
        Self {
            width,
            height,
            points,
            visited,
            stamp: 0,
        }
    }

    fn neighbours(&self, pt: usize) -> impl Iterator<Item = usize> + use<> {
        let (w, h) = (self.width, self.height);
        let (x, y) = (pt % w, pt / w);
        [
            (x > 0).then(|| pt - 1),
            (x + 1 < w).then(|| pt + 1),
            (y > 0).then(|| pt - w),
            (y + 1 < h).then(|| pt + w),
        ]
        .into_iter()
        .flatten()
    }

    fn estimate(&self, player: i8, trials: u32, tolerance: f32, rng: &mut Rng) -> Board {
        let mut track = vec![0i32; self.points.len()];

        for _ in 0..trials {
            let mut t = self.clone();
            t.play_out(player, rng);
            t.fill_territory();
            for (sum, &v) in track.iter_mut().zip(&t.points) {
                *sum += v as i32;
            }
        }

        self.synchronize_groups(&mut track);

        let limit = trials as f32 * tolerance;
        let mut ret = self.clone();
        for (p, &count) in ret.points.iter_mut().zip(&track) {
            *p = if count as f32 > limit {
                BLACK
            } else if (count as f32) < -limit {
                WHITE
            } else {
                EMPTY
            };
        }
        ret.fill_territory();
        ret
    }

    /// Give every stone of a group the tally of its most decided stone.
    fn synchronize_groups(&self, track: &mut [i32]) {
        let mut visited = vec![false; self.points.len()];
        for start in 0..self.points.len() {
            let color = self.points[start];
            if visited[start] || color == EMPTY {
                continue;
            }
            visited[start] = true;
            let mut group = vec![];
            let mut stack = vec![start];
            let mut extreme = track[start];
            while let Some(p) = stack.pop() {
                group.push(p);
                extreme = if extreme < 0 {
                    extreme.min(track[p])
                } else {
                    extreme.max(track[p])
                };
                for n in self.neighbours(p) {
                    if self.points[n] == color && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
            for p in group {
                track[p] = extreme;
            }
        }
    }

    /// Play random moves for both sides until neither has a useful move left.
    fn play_out(&mut self, mut player: i8, rng: &mut Rng) {
        let mut possible: Vec<usize> = (0..self.points.len())
            .filter(|&p| self.points[p] == EMPTY)
            .collect();
        let mut illegal = vec![];
        let mut ko = None;
        let mut sanity = MAX_GAME_LEN_FACTOR * self.points.len();

        while !possible.is_empty() && sanity > 0 {
            sanity -= 1;
            let idx = rng.usize(..possible.len());
            let mv = possible[idx];

            if self.is_eye(mv, player) {
                illegal.push(possible.swap_remove(idx));
                continue;
            }

            if self.place_and_remove(mv, player, &mut ko, &mut possible) {
                possible.swap_remove(idx);
                player = -player;
                possible.append(&mut illegal);
            } else {
                illegal.push(possible.swap_remove(idx));
            }
        }
    }

    /// Place a stone and capture. Freed points are appended to `possible`.
    fn place_and_remove(
        &mut self,
        mv: usize,
        player: i8,
        ko: &mut Option<usize>,
        possible: &mut Vec<usize>,
    ) -> bool {
        if *ko == Some(mv) {
            return false;
        }

        self.points[mv] = player;
        let mut removed = false;
        let mut new_ko = None;
        for n in self.neighbours(mv) {
            if self.points[n] == -player && !self.has_liberties(n) {
                if self.remove_group(n, possible) == 1 {
                    new_ko = Some(n);
                }
                removed = true;
            }
        }

        if !removed && !self.has_liberties(mv) {
            self.points[mv] = EMPTY;
            return false;
        }
        *ko = new_ko;
        true
    }

    fn has_liberties(&mut self, start: usize) -> bool {
        let color = self.points[start];
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.visited.fill(0);
            self.stamp = 1;
        }
        let stamp = self.stamp;
        self.visited[start] = stamp;
        let mut stack = vec![start];
        while let Some(p) = stack.pop() {
            for n in self.neighbours(p) {
                match self.points[n] {
                    EMPTY => return true,
                    c if c == color && self.visited[n] != stamp => {
                        self.visited[n] = stamp;
                        stack.push(n);
                    }
                    _ => {}
                }
            }
        }
        false
    }

    fn remove_group(&mut self, start: usize, possible: &mut Vec<usize>) -> usize {
        let color = self.points[start];
        let mut stack = vec![start];
        self.points[start] = EMPTY;
        let mut n_removed = 0;
        while let Some(p) = stack.pop() {
            possible.push(p);
            n_removed += 1;
            for n in self.neighbours(p) {
                if self.points[n] == color {
                    self.points[n] = EMPTY;
                    stack.push(n);
                }
            }
        }
        n_removed
    }

    /// An empty point whose on-board neighbours are all `player`'s stones.
    fn is_eye(&self, pt: usize, player: i8) -> bool {
        self.neighbours(pt).all(|n| self.points[n] == player)
    }

    /// Colour every empty region that borders stones of exactly one colour.
    fn fill_territory(&mut self) {
        let mut visited = vec![false; self.points.len()];
        for start in 0..self.points.len() {
            if visited[start] || self.points[start] != EMPTY {
                continue;
            }
            visited[start] = true;
            let mut region = vec![];
            let mut stack = vec![start];
            let (mut black, mut white) = (false, false);
            while let Some(p) = stack.pop() {
                region.push(p);
                for n in self.neighbours(p) {
                    match self.points[n] {
                        BLACK => black = true,
                        WHITE => white = true,
                        _ if !visited[n] => {
                            visited[n] = true;
                            stack.push(n);
                        }
                        _ => {}
                    }
                }
            }
            let owner = match (black, white) {
                (true, false) => BLACK,
                (false, true) => WHITE,
                _ => continue,
            };
            for p in region {
                self.points[p] = owner;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::estimator::{EstimatorConfig, apply_ownership};
    use crate::position::Position;

    /// 6x3, two living groups with two eyes each:
    ///
    /// ```text
    /// . X X O O .
    /// X X X O O O
    /// . X X O O .
    /// ```
    fn two_eyed_groups() -> Position {
        let black = [(1, 0), (2, 0), (0, 1), (1, 1), (2, 1), (1, 2), (2, 2)];
        let white = [(3, 0), (4, 0), (3, 1), (4, 1), (5, 1), (3, 2), (4, 2)];
        Position::with_setup(
            6,
            3,
            black.map(|(x, y)| Cell::new(x, y)),
            white.map(|(x, y)| Cell::new(x, y)),
        )
        .unwrap()
    }

    fn request(position: &Position, trials: u32) -> EstimateRequest {
        let config = EstimatorConfig {
            trials,
            ..EstimatorConfig::default()
        };
        EstimateRequest::from_position(position, &config)
    }

    #[test]
    fn test_settled_board() {
        let pos = two_eyed_groups();
        let ownership = MonteCarloEstimator::with_seed(7)
            .estimate(&request(&pos, 50))
            .unwrap();
        for (i, owner) in ownership.iter().enumerate() {
            let expected = if i % 6 <= 2 { Ownership::Black } else { Ownership::White };
            assert_eq!(*owner, expected, "point {i}");
        }

        let estimated = apply_ownership(&pos, &ownership).unwrap();
        assert!(estimated.removed_spots().is_empty());
        assert_eq!(estimated.black_territory().len(), 2);
        assert_eq!(estimated.white_territory().len(), 2);
    }

    #[test]
    fn test_seeded_estimates_repeat() {
        let pos = Position::with_setup(
            7,
            7,
            [Cell::new(2, 2), Cell::new(2, 4)],
            [Cell::new(4, 4), Cell::new(4, 2)],
        )
        .unwrap();
        let req = request(&pos, 30);
        let a = MonteCarloEstimator::with_seed(11).estimate(&req).unwrap();
        let b = MonteCarloEstimator::with_seed(11).estimate(&req).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 49);
    }

    #[test]
    fn test_rejects_mismatched_board() {
        let mut req = request(&Position::square(5).unwrap(), 1);
        req.board.pop();
        let err = MonteCarloEstimator::new().estimate(&req).unwrap_err();
        assert!(matches!(err, EstimatorError::InvalidRequest { expected: 25, got: 24, .. }));
    }

    #[test]
    fn test_playout_never_fills_own_eye() {
        let pos = two_eyed_groups();
        let board = Board::new(6, 3, crate::estimator::flatten_board(&pos));
        let mut t = board.clone();
        t.play_out(BLACK, &mut Rng::with_seed(1));
        assert_eq!(t.points, board.points);
    }
}
