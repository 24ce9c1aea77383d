//! Wire codec for client commands and ingested events.
//!
//! Client → server (text frames):
//!
//! ```json
//! {"type": "subscribe",   "content": {"repos": [{"id": "r1", "jwt_token": "..."}]}}
//! {"type": "unsubscribe", "content": {"repos": ["r1"]}}
//! ```
//!
//! Producer → server (`POST /events`) and server → client (text frames):
//!
//! ```json
//! {"type": "repo-update", "content": {"repo_id": "r1", "commit_id": "abc"}}
//! ```
//!
//! Events are forwarded to clients with their content untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ProtocolError;

/// One entry of a `subscribe` command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSubscription {
    /// Repository id; the topic to follow.
    pub id: String,
    /// Access token presented by the client. Carried but not verified.
    #[serde(default)]
    pub jwt_token: String,
}

/// Command sent by a connected client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Start receiving events for the listed repositories.
    Subscribe {
        /// Repositories to follow.
        repos: Vec<RepoSubscription>,
    },
    /// Stop receiving events for the listed repository ids.
    Unsubscribe {
        /// Repository ids to drop.
        repos: Vec<String>,
    },
}

/// Kinds of repository change the relay understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A new commit landed.
    RepoUpdate,
    /// A file lock was taken or released.
    FileLockChanged,
    /// Folder permissions were edited.
    FolderPermChanged,
}

impl EventKind {
    /// All known kinds.
    pub const ALL: [Self; 3] = [
        Self::RepoUpdate,
        Self::FileLockChanged,
        Self::FolderPermChanged,
    ];

    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RepoUpdate => "repo-update",
            Self::FileLockChanged => "file-lock-changed",
            Self::FolderPermChanged => "folder-perm-changed",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested event, resolved to its repository topic.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(skip)]
    repo_id: String,
    content: Map<String, Value>,
}

impl Event {
    /// Build an event. `content` must carry a string `repo_id`.
    pub fn new(kind: EventKind, content: Map<String, Value>) -> Result<Self, ProtocolError> {
        let repo_id = content
            .get("repo_id")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingField("repo_id"))?
            .to_owned();
        Ok(Self {
            kind,
            repo_id,
            content,
        })
    }

    /// Event kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Repository the event belongs to.
    pub fn topic(&self) -> &str {
        &self.repo_id
    }

    /// Event content, as received.
    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    content: Option<Map<String, Value>>,
}

/// Decode a client command.
pub fn decode_client_message(raw: &[u8]) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Decode an ingested event.
///
/// Returns `Ok(None)` for a well-formed envelope whose `type` is not a known
/// [`EventKind`]; such events are accepted and discarded.
pub fn decode_event(raw: &[u8]) -> Result<Option<Event>, ProtocolError> {
    let envelope: Envelope = serde_json::from_slice(raw)?;
    let Some(kind) = EventKind::parse(&envelope.kind) else {
        return Ok(None);
    };
    let content = envelope.content.ok_or(ProtocolError::MissingField("content"))?;
    Event::new(kind, content).map(Some)
}

/// Encode an event as the envelope pushed to clients.
pub fn encode_event(event: &Event) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn decode_subscribe() {
        let raw = br#"{"type":"subscribe","content":{"repos":[{"id":"r1","jwt_token":"t"},{"id":"r2","jwt_token":""}]}}"#;
        let msg = decode_client_message(raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                repos: vec![
                    RepoSubscription {
                        id: "r1".into(),
                        jwt_token: "t".into()
                    },
                    RepoSubscription {
                        id: "r2".into(),
                        jwt_token: String::new()
                    },
                ]
            }
        );
    }

    #[test]
    fn decode_subscribe_without_token() {
        let raw = br#"{"type":"subscribe","content":{"repos":[{"id":"r1"}]}}"#;
        let ClientMessage::Subscribe { repos } = decode_client_message(raw).unwrap() else {
            panic!("expected subscribe");
        };
        assert_eq!(repos[0].id, "r1");
        assert!(repos[0].jwt_token.is_empty());
    }

    #[test]
    fn decode_unsubscribe() {
        let raw = br#"{"type":"unsubscribe","content":{"repos":["r1","r2"]}}"#;
        let msg = decode_client_message(raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Unsubscribe {
                repos: vec!["r1".into(), "r2".into()]
            }
        );
    }

    #[test]
    fn decode_empty_repo_list() {
        let raw = br#"{"type":"unsubscribe","content":{"repos":[]}}"#;
        let msg = decode_client_message(raw).unwrap();
        assert_eq!(msg, ClientMessage::Unsubscribe { repos: vec![] });
    }

    #[test]
    fn unknown_command_is_error() {
        let raw = br#"{"type":"ping","content":{}}"#;
        assert!(decode_client_message(raw).is_err());
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(decode_client_message(b"not json").is_err());
    }

    #[test]
    fn subscribe_with_wrong_shape_is_error() {
        let raw = br#"{"type":"subscribe","content":{"repos":["r1"]}}"#;
        assert!(decode_client_message(raw).is_err());
    }

    #[test]
    fn subscribe_without_content_is_error() {
        let raw = br#"{"type":"subscribe"}"#;
        assert!(decode_client_message(raw).is_err());
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
        assert_eq!(EventKind::parse("repo-deleted"), None);
    }

    #[test]
    fn decode_known_event() {
        let raw = br#"{"type":"file-lock-changed","content":{"repo_id":"r1","path":"/a.txt","change_event":"locked","lock_user":"u@x"}}"#;
        let event = decode_event(raw).unwrap().unwrap();
        assert_eq!(event.kind(), EventKind::FileLockChanged);
        assert_eq!(event.topic(), "r1");
        assert_eq!(event.content()["lock_user"], "u@x");
    }

    #[test]
    fn decode_unknown_kind_is_discarded() {
        let raw = br#"{"type":"repo-deleted","content":{"repo_id":"r1"}}"#;
        assert!(decode_event(raw).unwrap().is_none());
    }

    #[test]
    fn decode_event_missing_repo_id() {
        let raw = br#"{"type":"repo-update","content":{"commit_id":"abc"}}"#;
        let err = decode_event(raw).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("repo_id")));
    }

    #[test]
    fn decode_event_non_string_repo_id() {
        let raw = br#"{"type":"repo-update","content":{"repo_id":7}}"#;
        assert!(decode_event(raw).is_err());
    }

    #[test]
    fn decode_event_missing_content() {
        let raw = br#"{"type":"repo-update"}"#;
        let err = decode_event(raw).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("content")));
    }

    #[test]
    fn decode_event_bad_json() {
        assert!(decode_event(b"{\"type\":").is_err());
        assert!(decode_event(b"[]").is_err());
    }

    #[test]
    fn encode_preserves_content() {
        let body = json!({
            "repo_id": "r1",
            "commit_id": "abc",
            "extra": {"nested": [1, 2, 3]}
        });
        let event = Event::new(EventKind::RepoUpdate, content(body.clone())).unwrap();
        let encoded: Value = serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(encoded, json!({"type": "repo-update", "content": body}));
    }
}
