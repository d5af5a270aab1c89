//! Goban: Go board model, rules engine and analysis plumbing.
//!
//! Positions are immutable values. Every move, dead-stone mark or territory
//! computation returns a new [`Position`](position::Position), so positions
//! can be shared across threads and kept as history without copying rules.
//!
//! ## Modules
//!
//! - [`constants`] - Board limits, komi and handicap tables, estimator defaults
//! - [`cell`] - Coordinates, stone colours, GTP and SGF notation
//! - [`position`] - The immutable board position
//! - [`rules`] - Move legality, captures, ko, dead stones, territory and score
//! - [`game`] - Position history, scoring phase and server record replay
//! - [`movepath`] - Dotted move paths and joseki nodes
//! - [`estimator`] - Monte Carlo and native territory estimation
//! - [`analysis`] - Analysis engine queries, responses and stream routing
//! - [`gtp`] - Go Text Protocol front end
//!
//! ## Example
//!
//! ```
//! use goban::cell::{Cell, StoneType};
//! use goban::position::Position;
//! use goban::rules::{apply_move, RulesError};
//!
//! let pos = Position::square(19).unwrap();
//! let pos = apply_move(&pos, Cell::new(3, 3), StoneType::Black).unwrap();
//!
//! // The point is taken now.
//! let err = apply_move(&pos, Cell::new(3, 3), StoneType::White).unwrap_err();
//! assert_eq!(err, RulesError::IllegalMove(Cell::new(3, 3)));
//! ```

pub mod analysis;
pub mod cell;
pub mod constants;
pub mod estimator;
pub mod game;
pub mod gtp;
pub mod movepath;
pub mod position;
pub mod rules;
