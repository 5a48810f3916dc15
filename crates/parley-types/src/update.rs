//! Inbound update objects and the field accessors handlers need most.
//!
//! An `Update` is the decoded JSON object delivered by the platform. The core
//! never interprets it beyond these accessors; the default chat classifier
//! relies on [`Update::chat`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One inbound event from the messaging platform.
///
/// Shape: `{"update_id": 1, "<kind>": { ... }}` where `<kind>` is e.g.
/// `message`, `edited_message`, `callback_query`, `channel_post`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Update(pub Value);

impl Update {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The platform-assigned sequence number, if present.
    pub fn update_id(&self) -> Option<i64> {
        self.0.get("update_id").and_then(Value::as_i64)
    }

    /// The update kind: the top-level key that is not `update_id`.
    pub fn kind(&self) -> Option<&str> {
        self.0
            .as_object()?
            .keys()
            .map(String::as_str)
            .find(|key| *key != "update_id")
    }

    /// The object stored under the update kind.
    pub fn payload(&self) -> Option<&Value> {
        self.0.get(self.kind()?)
    }

    /// The "chat" object of the update, if present.
    ///
    /// Looks at `{kind}.chat` first, then `{kind}.message.chat` (the shape of
    /// callback queries, which carry the originating message).
    pub fn chat(&self) -> Option<&Value> {
        let payload = self.payload()?;
        payload
            .get("chat")
            .or_else(|| payload.get("message").and_then(|m| m.get("chat")))
    }

    /// The `from.username` of the update sender, if present.
    pub fn from_username(&self) -> Option<&str> {
        self.payload()?
            .get("from")?
            .get("username")
            .and_then(Value::as_str)
    }

    /// The sent date (`{kind}.date`, unix seconds), if present.
    pub fn sent_date(&self) -> Option<DateTime<Utc>> {
        let payload = self.payload()?;
        let secs = payload
            .get("date")
            .or_else(|| payload.get("message").and_then(|m| m.get("date")))
            .and_then(Value::as_i64)?;
        DateTime::from_timestamp(secs, 0)
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_update() -> Update {
        Update::new(json!({
            "update_id": 1001,
            "message": {
                "message_id": 1401,
                "date": 1505118098,
                "text": "Hello!",
                "chat": {"id": 208255328, "type": "private", "username": "xxxx"},
                "from": {"id": 208255328, "is_bot": false, "username": "xxxx"}
            }
        }))
    }

    #[test]
    fn test_kind_and_update_id() {
        let update = message_update();
        assert_eq!(update.update_id(), Some(1001));
        assert_eq!(update.kind(), Some("message"));
    }

    #[test]
    fn test_chat_from_message() {
        let update = message_update();
        let chat = update.chat().unwrap();
        assert_eq!(chat["id"], json!(208255328));
    }

    #[test]
    fn test_chat_from_callback_query_message() {
        let update = Update::new(json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 5, "username": "alice"},
                "message": {"message_id": 9, "date": 1700000000, "chat": {"id": -100}},
                "data": "yes"
            }
        }));
        assert_eq!(update.kind(), Some("callback_query"));
        assert_eq!(update.chat().unwrap()["id"], json!(-100));
        assert_eq!(update.from_username(), Some("alice"));
        assert_eq!(update.sent_date().unwrap().timestamp(), 1700000000);
    }

    #[test]
    fn test_inline_query_has_no_chat() {
        let update = Update::new(json!({
            "update_id": 3,
            "inline_query": {"id": "q", "from": {"id": 5}, "query": "cats"}
        }));
        assert!(update.chat().is_none());
        assert!(update.from_username().is_none());
        assert!(update.sent_date().is_none());
    }

    #[test]
    fn test_from_username_and_sent_date() {
        let update = message_update();
        assert_eq!(update.from_username(), Some("xxxx"));
        assert_eq!(update.sent_date().unwrap().timestamp(), 1505118098);
    }

    #[test]
    fn test_non_object_update() {
        let update = Update::new(json!([1, 2, 3]));
        assert!(update.kind().is_none());
        assert!(update.update_id().is_none());
        assert!(update.chat().is_none());
    }

    #[test]
    fn test_transparent_serde() {
        let update = message_update();
        let text = serde_json::to_string(&update).unwrap();
        assert!(text.starts_with('{'));
        let parsed: Update = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, update);
    }
}
