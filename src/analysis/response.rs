//! Analysis engine replies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed engine message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("engine message is not a JSON object: {0}")]
    NotAnObject(String),
    #[error("engine i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("query {id} rejected: {message}")]
    Rejected { id: String, message: String },
    #[error("timed out waiting for query {0}")]
    Timeout(String),
    #[error("engine stopped before answering query {0}")]
    Closed(String),
    #[error("engine failed to start: {0}")]
    EngineStart(String),
}

/// A (possibly partial) analysis result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub is_during_search: bool,
    #[serde(default)]
    pub turn_number: u32,
    #[serde(default)]
    pub move_infos: Vec<MoveInfo>,
    #[serde(default)]
    pub root_info: RootInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Vec<f32>>,
}

impl Response {
    /// The engine's top recommendation (`order == 0`).
    pub fn best_move(&self) -> Option<&MoveInfo> {
        self.move_infos.iter().min_by_key(|m| m.order)
    }
}

/// One candidate move.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoveInfo {
    #[serde(rename = "move")]
    pub mv: String,
    pub visits: u32,
    pub winrate: f32,
    pub score_lead: f32,
    pub score_stdev: f32,
    pub score_selfplay: f32,
    pub prior: f32,
    pub utility: f32,
    pub lcb: f32,
    pub utility_lcb: f32,
    pub order: u32,
    pub pv: Vec<String>,
    #[serde(rename = "pvVisits", skip_serializing_if = "Option::is_none")]
    pub pv_visits: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Vec<f32>>,
}

/// Evaluation of the position as a whole. Low-visit searches may omit any field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RootInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winrate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_lead: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_selfplay: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_stdev: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utility: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visits: Option<u32>,
}

/// A rejected query, or a warning about one of its fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    /// A warning leaves the query running; an error ends it.
    pub fn is_warning_only(&self) -> bool {
        self.error.is_none() && self.warning.is_some()
    }

    pub fn message(&self) -> String {
        let text = self
            .error
            .as_deref()
            .or(self.warning.as_deref())
            .unwrap_or("unknown error");
        match &self.field {
            Some(field) => format!("{text} (field `{field}`)"),
            None => text.to_string(),
        }
    }
}

/// Any line the engine writes.
#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisMessage {
    Response(Response),
    Error(ErrorResponse),
}

impl AnalysisMessage {
    /// Parse one line of engine output. Messages carrying an `error` or
    /// `warning` key are error responses, everything else is a result.
    pub fn parse(line: &str) -> Result<AnalysisMessage, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let Some(obj) = value.as_object() else {
            return Err(ProtocolError::NotAnObject(line.to_string()));
        };
        if obj.contains_key("error") || obj.contains_key("warning") {
            Ok(AnalysisMessage::Error(serde_json::from_value(value)?))
        } else {
            Ok(AnalysisMessage::Response(serde_json::from_value(value)?))
        }
    }

    pub fn id(&self) -> &str {
        match self {
            AnalysisMessage::Response(r) => &r.id,
            AnalysisMessage::Error(e) => &e.id,
        }
    }
}

/// Compact form of a response kept for persistence: root evaluation and
/// ownership only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefResponse {
    #[serde(default)]
    pub root_info: RootInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Vec<f32>>,
}

impl From<&Response> for BriefResponse {
    /// Ownership is truncated towards zero to two decimals.
    fn from(response: &Response) -> Self {
        Self {
            root_info: response.root_info.clone(),
            ownership: response
                .ownership
                .as_ref()
                .map(|o| o.iter().map(|v| (v * 100.0).trunc() / 100.0).collect()),
        }
    }
}

impl From<BriefResponse> for Response {
    fn from(brief: BriefResponse) -> Self {
        Response {
            root_info: brief.root_info,
            ownership: brief.ownership,
            ..Response::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let line = r#"{"id":"q1","isDuringSearch":false,"turnNumber":2,
            "moveInfos":[
                {"move":"D4","visits":12,"winrate":0.48,"scoreLead":-0.5,"order":1,"pv":["D4","Q16"]},
                {"move":"Q16","visits":20,"winrate":0.52,"scoreLead":0.3,"order":0,"pv":["Q16"],"pvVisits":[20]}
            ],
            "rootInfo":{"winrate":0.51,"visits":32,"currentPlayer":"B"}}"#;
        let AnalysisMessage::Response(r) = AnalysisMessage::parse(line).unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(r.id, "q1");
        assert_eq!(r.turn_number, 2);
        assert_eq!(r.move_infos.len(), 2);
        assert_eq!(r.best_move().unwrap().mv, "Q16");
        assert_eq!(r.best_move().unwrap().pv_visits, Some(vec![20]));
        assert_eq!(r.root_info.visits, Some(32));
        assert_eq!(r.root_info.score_lead, None);
        assert!(r.ownership.is_none());
    }

    #[test]
    fn test_parse_error_and_warning() {
        let msg = AnalysisMessage::parse(r#"{"id":"q2","error":"bad move","field":"moves"}"#).unwrap();
        let AnalysisMessage::Error(e) = msg else {
            panic!("expected an error");
        };
        assert!(!e.is_warning_only());
        assert_eq!(e.message(), "bad move (field `moves`)");

        let msg = AnalysisMessage::parse(r#"{"id":"q2","warning":"WARNING_MESSAGE","field":"komi"}"#).unwrap();
        assert!(matches!(msg, AnalysisMessage::Error(ref e) if e.is_warning_only()));
        assert_eq!(msg.id(), "q2");

        // Unparseable queries come back without an id.
        let msg = AnalysisMessage::parse(r#"{"error":"Could not parse json"}"#).unwrap();
        assert_eq!(msg.id(), "");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(AnalysisMessage::parse("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(AnalysisMessage::parse("[1,2]"), Err(ProtocolError::NotAnObject(_))));
    }

    #[test]
    fn test_brief_truncates_ownership() {
        let response = Response {
            id: "q1".into(),
            turn_number: 5,
            root_info: RootInfo {
                winrate: Some(0.25),
                ..RootInfo::default()
            },
            ownership: Some(vec![0.987, -0.456, 0.0]),
            ..Response::default()
        };
        let brief = BriefResponse::from(&response);
        let json = serde_json::to_string(&brief).unwrap();
        assert_eq!(json, r#"{"rootInfo":{"winrate":0.25},"ownership":[0.98,-0.45,0.0]}"#);

        let restored: Response = serde_json::from_str::<BriefResponse>(&json).unwrap().into();
        assert_eq!(restored.id, "");
        assert_eq!(restored.turn_number, 0);
        assert!(restored.move_infos.is_empty());
        assert_eq!(restored.root_info.winrate, Some(0.25));
        assert_eq!(restored.ownership, Some(vec![0.98, -0.45, 0.0]));
    }
}
