//! WebSocket wire protocol.
//!
//! Both directions are closed tagged unions keyed on `type`. Inbound text is
//! decoded with [`decode_client_message`], which keeps the raw `type` string
//! next to the parsed message so an unknown type can be reported by name.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{ConnectionId, SessionId, Timestamp};
use crate::workflow::{SubStepUpdate, WorkflowStatus};

/// Longest accepted session id.
pub const MAX_SESSION_ID_LEN: u64 = 128;

/// Longest accepted search query.
pub const MAX_QUERY_LEN: u64 = 1000;

// ---------------------------------------------------------------------------
// Error codes carried by outbound `error` messages
// ---------------------------------------------------------------------------

pub const ERROR_CODE_VALIDATION: &str = "VALIDATION_ERROR";
pub const ERROR_CODE_AUTHENTICATION: &str = "AUTHENTICATION_ERROR";
pub const ERROR_CODE_FORBIDDEN: &str = "FORBIDDEN";
pub const ERROR_CODE_UNKNOWN_TYPE: &str = "UNKNOWN_MESSAGE_TYPE";
pub const ERROR_CODE_NOT_FOUND: &str = "NOT_FOUND";
pub const ERROR_CODE_INTERNAL: &str = "INTERNAL_ERROR";

/// Map a domain error onto the code sent to the client.
pub fn error_code(err: &CoreError) -> &'static str {
    match err {
        CoreError::NotFound { .. } => ERROR_CODE_NOT_FOUND,
        CoreError::Validation(_) => ERROR_CODE_VALIDATION,
        CoreError::Unauthorized(_) => ERROR_CODE_AUTHENTICATION,
        CoreError::Forbidden(_) => ERROR_CODE_FORBIDDEN,
        CoreError::UnsupportedMessage(_) => ERROR_CODE_UNKNOWN_TYPE,
        CoreError::Internal(_) => ERROR_CODE_INTERNAL,
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Messages a client may send.
///
/// Required fields are optional here and checked at dispatch, so a missing
/// `sessionId` is answered with a validation error instead of a parse error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    JoinSession {
        session_id: Option<String>,
        token: Option<String>,
    },
    LeaveSession {
        session_id: Option<String>,
    },
    StartSearch {
        session_id: Option<String>,
        query: Option<String>,
        icp_model_id: Option<String>,
    },
    GetSearchStatus {
        session_id: Option<String>,
    },
    Ping,
    #[serde(other)]
    Unknown,
}

/// A decoded inbound frame plus the `type` it was tagged with.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub type_name: String,
    pub message: ClientMessage,
    /// Raw `sessionId` of the frame, kept for error replies even when the
    /// type is unknown.
    pub session_hint: Option<SessionId>,
}

/// Decode one inbound text frame.
///
/// Fails with [`CoreError::Validation`] when the frame is not a JSON object
/// with a string `type`, or when a known type carries malformed fields.
pub fn decode_client_message(text: &str) -> Result<Inbound, CoreError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| CoreError::Validation(format!("Message is not valid JSON: {e}")))?;

    let type_name = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            CoreError::Validation("Message must be a JSON object with a string `type`".into())
        })?
        .to_string();

    let session_hint = value
        .get("sessionId")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    let message = ClientMessage::deserialize(&value)
        .map_err(|e| CoreError::Validation(format!("Malformed `{type_name}` message: {e}")))?;

    Ok(Inbound {
        type_name,
        message,
        session_hint,
    })
}

/// Require a non-empty, bounded session id.
pub fn require_session_id(session_id: Option<String>) -> Result<SessionId, CoreError> {
    let session_id = session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::Validation("sessionId is required".into()))?;
    if session_id.len() as u64 > MAX_SESSION_ID_LEN {
        return Err(CoreError::Validation(format!(
            "sessionId must be at most {MAX_SESSION_ID_LEN} characters"
        )));
    }
    Ok(session_id)
}

/// Validated body of a `start-search` request.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = MAX_SESSION_ID_LEN))]
    pub session_id: SessionId,
    #[validate(length(min = 1, max = MAX_QUERY_LEN))]
    pub query: String,
    pub icp_model_id: Option<String>,
}

impl SearchRequest {
    /// Build and validate a request from the raw `start-search` fields.
    pub fn from_parts(
        session_id: Option<String>,
        query: Option<String>,
        icp_model_id: Option<String>,
    ) -> Result<Self, CoreError> {
        let session_id = require_session_id(session_id)?;
        let query = query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| CoreError::Validation("query is required".into()))?;

        let request = Self {
            session_id,
            query,
            icp_model_id: icp_model_id.filter(|id| !id.trim().is_empty()),
        };
        request
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        Ok(request)
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Payload of a `workflow-substep` broadcast: the step id plus the fields
/// that changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstepEvent {
    pub step_id: String,
    #[serde(flatten)]
    pub update: SubStepUpdate,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Connected {
        session_id: SessionId,
        connection_id: ConnectionId,
        timestamp: Timestamp,
    },
    SessionJoined {
        session_id: SessionId,
        timestamp: Timestamp,
    },
    WorkflowStatus {
        session_id: SessionId,
        data: WorkflowStatus,
        timestamp: Timestamp,
    },
    WorkflowSubstep {
        session_id: SessionId,
        data: SubstepEvent,
        timestamp: Timestamp,
    },
    SearchStarted {
        session_id: SessionId,
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        icp_model_id: Option<String>,
        timestamp: Timestamp,
    },
    SearchStatus {
        session_id: SessionId,
        data: WorkflowStatus,
        timestamp: Timestamp,
    },
    SearchComplete {
        session_id: SessionId,
        data: serde_json::Value,
        timestamp: Timestamp,
    },
    SearchError {
        session_id: SessionId,
        error: String,
        timestamp: Timestamp,
    },
    Pong {
        timestamp: Timestamp,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
}

impl ServerMessage {
    pub fn workflow_status(status: WorkflowStatus) -> Self {
        Self::WorkflowStatus {
            session_id: status.session_id.clone(),
            data: status,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn workflow_substep(session_id: &str, step_id: &str, update: SubStepUpdate) -> Self {
        Self::WorkflowSubstep {
            session_id: session_id.to_string(),
            data: SubstepEvent {
                step_id: step_id.to_string(),
                update,
            },
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: chrono::Utc::now(),
        }
    }

    /// Error reply for a failed inbound message.
    pub fn error(err: &CoreError, session_id: Option<SessionId>) -> Self {
        Self::Error {
            code: error_code(err).to_string(),
            message: err.to_string(),
            session_id,
        }
    }

    /// The `type` tag this message serializes with.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::SessionJoined { .. } => "session-joined",
            Self::WorkflowStatus { .. } => "workflow-status",
            Self::WorkflowSubstep { .. } => "workflow-substep",
            Self::SearchStarted { .. } => "search-started",
            Self::SearchStatus { .. } => "search-status",
            Self::SearchComplete { .. } => "search-complete",
            Self::SearchError { .. } => "search-error",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::workflow::SubStepStatus;

    #[test]
    fn decodes_join_session_with_camel_case_fields() {
        let inbound =
            decode_client_message(r#"{"type":"join-session","sessionId":"s1","token":"t"}"#)
                .unwrap();
        assert_eq!(inbound.type_name, "join-session");
        assert_eq!(
            inbound.message,
            ClientMessage::JoinSession {
                session_id: Some("s1".into()),
                token: Some("t".into()),
            }
        );
    }

    #[test]
    fn missing_session_id_still_decodes() {
        let inbound = decode_client_message(r#"{"type":"leave-session"}"#).unwrap();
        assert_eq!(
            inbound.message,
            ClientMessage::LeaveSession { session_id: None }
        );
    }

    #[test]
    fn session_hint_survives_unknown_type() {
        let inbound =
            decode_client_message(r#"{"type":"self-destruct","sessionId":"s7"}"#).unwrap();
        assert_eq!(inbound.message, ClientMessage::Unknown);
        assert_eq!(inbound.session_hint.as_deref(), Some("s7"));

        let inbound = decode_client_message(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(inbound.session_hint, None);
    }

    #[test]
    fn ping_ignores_extra_fields() {
        let inbound = decode_client_message(r#"{"type":"ping","at":123}"#).unwrap();
        assert_eq!(inbound.message, ClientMessage::Ping);
    }

    #[test]
    fn unknown_type_maps_to_unknown_variant() {
        let inbound = decode_client_message(r#"{"type":"launch-rockets"}"#).unwrap();
        assert_eq!(inbound.type_name, "launch-rockets");
        assert_eq!(inbound.message, ClientMessage::Unknown);
    }

    #[test]
    fn rejects_frames_without_type() {
        assert_matches!(
            decode_client_message(r#"{"sessionId":"s1"}"#),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            decode_client_message("not json"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            decode_client_message("[1,2]"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn require_session_id_trims_and_bounds() {
        assert_eq!(require_session_id(Some(" s1 ".into())).unwrap(), "s1");
        assert_matches!(require_session_id(None), Err(CoreError::Validation(_)));
        assert_matches!(
            require_session_id(Some("   ".into())),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            require_session_id(Some("x".repeat(MAX_SESSION_ID_LEN as usize + 1))),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn search_request_requires_query() {
        assert_matches!(
            SearchRequest::from_parts(Some("s1".into()), None, None),
            Err(CoreError::Validation(msg)) if msg.contains("query")
        );
        let too_long = "x".repeat(MAX_QUERY_LEN as usize + 1);
        assert_matches!(
            SearchRequest::from_parts(Some("s1".into()), Some(too_long), None),
            Err(CoreError::Validation(_))
        );
        let request = SearchRequest::from_parts(
            Some("s1".into()),
            Some("fintech in Berlin".into()),
            Some(" ".into()),
        )
        .unwrap();
        assert_eq!(request.query, "fintech in Berlin");
        assert_eq!(request.icp_model_id, None);
    }

    #[test]
    fn substep_event_flattens_update() {
        let msg = ServerMessage::workflow_substep(
            "s1",
            "1.1",
            SubStepUpdate::status(SubStepStatus::Completed),
        );
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "workflow-substep");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["data"]["stepId"], "1.1");
        assert_eq!(json["data"]["status"], "completed");
        assert!(json["data"].get("message").is_none());
    }

    #[test]
    fn error_message_carries_code() {
        let err = CoreError::Unauthorized("bad token".into());
        let msg = ServerMessage::error(&err, Some("s1".into()));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], ERROR_CODE_AUTHENTICATION);
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(msg.message_type(), "error");
    }

    #[test]
    fn pong_has_iso_timestamp() {
        let json = serde_json::to_value(ServerMessage::pong()).unwrap();
        assert_eq!(json["type"], "pong");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }
}
