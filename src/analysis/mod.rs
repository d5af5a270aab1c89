//! Analysis engine protocol.
//!
//! Queries and replies are JSON objects, one per line, correlated by a
//! caller-chosen id. Many queries may be in flight at once and replies for
//! different ids arrive in any order. For one id the engine sends zero or
//! more progressive updates followed by one final response per analysed turn,
//! or a single error.
//!
//! ```no_run
//! use goban::analysis::{self, EngineCommand, QueryOptions};
//! use goban::position::Position;
//! use std::time::Duration;
//!
//! let process = analysis::spawn(&EngineCommand::default())?;
//! let subscription = process
//!     .engine()
//!     .analyze(&[Position::square(19).unwrap()], &QueryOptions::default())?;
//! let response = subscription.wait_final(Duration::from_secs(30))?;
//! println!("{:?}", response.best_move());
//! # Ok::<(), goban::analysis::ProtocolError>(())
//! ```

mod engine;
mod query;
mod response;
mod router;

pub use engine::{AnalysisEngine, EngineCommand, EngineProcess, spawn, spawn_reader};
pub use query::{MoveEntry, Query, QueryOptions, move_entry};
pub use response::{AnalysisMessage, BriefResponse, ErrorResponse, MoveInfo, ProtocolError, Response, RootInfo};
pub use router::{AnalysisEvent, AnalysisRouter, Subscription};
