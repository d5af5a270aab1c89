//! Analysis queries.

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, StoneType};
use crate::constants::{DEFAULT_BOARD_SIZE, DEFAULT_MAX_VISITS, DEFAULT_RULES};
use crate::position::Position;

/// One `[player, vertex]` pair, e.g. `["B", "Q16"]`.
pub type MoveEntry = [String; 2];

pub fn move_entry(color: StoneType, cell: Cell, board_height: usize) -> MoveEntry {
    [color.letter().to_string(), cell.to_gtp(board_height)]
}

/// A request to the analysis engine. Field names follow the engine's JSON
/// protocol exactly; unset optional fields are left out of the message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub id: String,
    pub moves: Vec<MoveEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_stones: Option<Vec<MoveEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_player: Option<String>,
    pub rules: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub komi: Option<f32>,
    pub board_x_size: usize,
    pub board_y_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyze_turns: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_visits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_policy_temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_fpu_reduction_max: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_ownership: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_moves_ownership: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_policy: Option<bool>,
    #[serde(rename = "includePVVisits", default, skip_serializing_if = "Option::is_none")]
    pub include_pv_visits: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoid_moves: Option<Vec<MoveEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_moves: Option<Vec<MoveEntry>>,
    /// Engine settings overridden for this query only. Opaque to this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_settings: Option<serde_json::Value>,
    /// Seconds between progressive updates while the search runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_during_search_every: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

/// Caller-side knobs for building a [`Query`].
#[derive(Clone, Debug, PartialEq)]
pub struct QueryOptions {
    pub rules: String,
    pub komi: Option<f32>,
    pub max_visits: Option<u32>,
    pub analyze_turns: Option<Vec<u32>>,
    pub include_ownership: Option<bool>,
    pub include_moves_ownership: Option<bool>,
    pub include_policy: Option<bool>,
    pub include_pv_visits: Option<bool>,
    pub report_during_search_every: Option<f32>,
    pub priority: Option<i32>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.to_string(),
            komi: None,
            max_visits: Some(DEFAULT_MAX_VISITS),
            analyze_turns: None,
            include_ownership: None,
            include_moves_ownership: None,
            include_policy: None,
            include_pv_visits: None,
            report_during_search_every: None,
            priority: None,
        }
    }
}

impl Query {
    /// Build a query from a sequence of positions, oldest first.
    ///
    /// Positions without a last move (the starting board, or any setup
    /// position) contribute their stones as initial stones. Every other
    /// position contributes the move that produced it.
    pub fn from_positions(id: impl Into<String>, sequence: &[Position], options: &QueryOptions) -> Query {
        let (width, height) = sequence
            .first()
            .map(|p| (p.board_width(), p.board_height()))
            .unwrap_or((DEFAULT_BOARD_SIZE, DEFAULT_BOARD_SIZE));

        let mut initial: Vec<MoveEntry> = vec![];
        let mut moves = vec![];
        for pos in sequence {
            match (pos.last_move(), pos.last_player_to_move()) {
                (Some(cell), Some(player)) => moves.push(move_entry(player, cell, height)),
                _ => {
                    let mut setup: Vec<MoveEntry> = [StoneType::White, StoneType::Black]
                        .into_iter()
                        .flat_map(|color| {
                            let mut cells: Vec<Cell> = pos.stones().of(color).iter().copied().collect();
                            cells.sort();
                            cells.into_iter().map(move |c| move_entry(color, c, height))
                        })
                        .collect();
                    setup.retain(|e| !initial.contains(e));
                    initial.extend(setup);
                }
            }
        }

        Query {
            id: id.into(),
            moves,
            initial_stones: Some(initial),
            rules: options.rules.clone(),
            komi: options.komi,
            board_x_size: width,
            board_y_size: height,
            analyze_turns: options.analyze_turns.clone(),
            max_visits: options.max_visits,
            include_ownership: options.include_ownership,
            include_moves_ownership: options.include_moves_ownership,
            include_policy: options.include_policy,
            include_pv_visits: options.include_pv_visits,
            report_during_search_every: options.report_during_search_every,
            priority: options.priority,
            ..Query::default()
        }
    }

    /// Number of final responses the engine sends for this query.
    pub fn expected_finals(&self) -> usize {
        match &self.analyze_turns {
            Some(turns) if !turns.is_empty() => turns.len(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::apply_move;

    #[test]
    fn test_optional_fields_are_omitted() {
        let query = Query {
            id: "7".into(),
            rules: "japanese".into(),
            board_x_size: 19,
            board_y_size: 19,
            include_pv_visits: Some(true),
            ..Query::default()
        };
        let json = serde_json::to_value(&query).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["boardXSize"], 19);
        assert_eq!(obj["includePVVisits"], true);
        assert!(!obj.contains_key("komi"));
        assert!(!obj.contains_key("initialStones"));
        assert!(!obj.contains_key("overrideSettings"));
        assert_eq!(obj.len(), 6);
    }

    #[test]
    fn test_from_positions() {
        let start = Position::with_handicap(19, 2).unwrap();
        let p1 = apply_move(&start, Cell::new(15, 15), StoneType::White).unwrap();
        let p2 = apply_move(&p1, Cell::PASS, StoneType::Black).unwrap();

        let options = QueryOptions {
            komi: Some(0.5),
            ..QueryOptions::default()
        };
        let query = Query::from_positions("3", &[start, p1, p2], &options);

        assert_eq!(query.id, "3");
        assert_eq!(query.rules, "japanese");
        assert_eq!(query.max_visits, Some(DEFAULT_MAX_VISITS));
        let initial = query.initial_stones.as_ref().unwrap();
        assert_eq!(initial.len(), 2);
        assert!(initial.contains(&["B".to_string(), "Q16".to_string()]));
        assert!(initial.contains(&["B".to_string(), "D4".to_string()]));
        assert_eq!(
            query.moves,
            vec![
                ["W".to_string(), "Q4".to_string()],
                ["B".to_string(), "PASS".to_string()]
            ]
        );
        assert_eq!(query.expected_finals(), 1);
    }

    #[test]
    fn test_expected_finals() {
        let query = Query {
            analyze_turns: Some(vec![0, 1, 2]),
            ..Query::default()
        };
        assert_eq!(query.expected_finals(), 3);
    }
}
