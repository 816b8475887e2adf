/*
    change.rs - Change events pushed by the hub

    Wire shape of a single event:
        { "type": "ins" | "upd" | "del" | "est",
          "view": "...", "cell": "...", "seq": 6,
          "_id": "doc", "prop": "name", "idx": 0, "val": ...,
          "batch": [ ...events sharing this seq... ] }

    An inbound message is one event or an array of messages (arrays nest).
    Arrays are decoded element by element so one bad element does not
    discard the rest of the payload.
*/

use crate::errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag of a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A re-dump is pending for the named view (or the whole connection)
    #[serde(rename = "est")]
    Establish,
    #[serde(rename = "ins")]
    Insert,
    #[serde(rename = "upd")]
    Update,
    #[serde(rename = "del")]
    Delete,
    #[serde(other)]
    Unknown,
}

/// One change to one property of one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChangeKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,

    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idx: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<Vec<ChangeEvent>>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind) -> Self {
        Self { kind: Some(kind), ..Default::default() }
    }

    pub fn insert(id: impl Into<String>, prop: impl Into<String>, val: Value) -> Self {
        Self::new(ChangeKind::Insert).with_id(id).with_prop(prop).with_value(val)
    }

    pub fn update(id: impl Into<String>, prop: impl Into<String>, val: Value) -> Self {
        Self::new(ChangeKind::Update).with_id(id).with_prop(prop).with_value(val)
    }

    pub fn delete(id: impl Into<String>, prop: impl Into<String>) -> Self {
        Self::new(ChangeKind::Delete).with_id(id).with_prop(prop)
    }

    /// An establish signal; without a view it applies to the whole connection
    pub fn establish(view: Option<&str>, cell: Option<&str>) -> Self {
        Self {
            kind: Some(ChangeKind::Establish),
            view: view.map(str::to_string),
            cell: cell.map(str::to_string),
            ..Default::default()
        }
    }

    /// Several events applied under one sequence number
    pub fn batch(events: Vec<ChangeEvent>) -> Self {
        Self { batch: Some(events), ..Default::default() }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_prop(mut self, prop: impl Into<String>) -> Self {
        self.prop = Some(prop.into());
        self
    }

    pub fn with_index(mut self, idx: usize) -> Self {
        self.idx = Some(idx);
        self
    }

    pub fn with_value(mut self, val: Value) -> Self {
        self.val = Some(val);
        self
    }

    pub fn with_view(mut self, view: impl Into<String>, cell: Option<&str>) -> Self {
        self.view = Some(view.into());
        self.cell = cell.map(str::to_string);
        self
    }

    pub fn is_establish(&self) -> bool {
        self.kind == Some(ChangeKind::Establish)
    }

    /// The carried value; an absent value reads as null
    pub fn value(&self) -> Value {
        self.val.clone().unwrap_or(Value::Null)
    }
}

/// An inbound change payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeMessage {
    Many(Vec<ChangeMessage>),
    Event(ChangeEvent),
}

impl ChangeMessage {
    /// Decode a payload that may still be an embedded JSON string
    pub fn parse(payload: Value) -> SyncResult<Self> {
        let message = match payload {
            Value::String(text) => serde_json::from_str(&text)?,
            other => serde_json::from_value(other)?,
        };
        Ok(message)
    }

    /// Decode a payload element by element.
    ///
    /// Arrays (nested ones included) are flattened into one entry per
    /// element; an element that fails to decode is returned as a
    /// [`MalformedChange`] in its place. Only a payload that is not JSON at
    /// all, or a lone event that does not decode, fails as a whole.
    pub fn parse_items(payload: Value) -> SyncResult<Vec<Result<ChangeMessage, MalformedChange>>> {
        let payload = match payload {
            Value::String(text) => serde_json::from_str(&text)?,
            other => other,
        };
        match payload {
            Value::Array(items) => {
                let mut decoded = Vec::with_capacity(items.len());
                collect_items(items, &mut decoded);
                Ok(decoded)
            }
            other => Ok(vec![Ok(Self::parse(other)?)]),
        }
    }

    /// Number of top-level events, counting nested arrays
    pub fn event_count(&self) -> usize {
        match self {
            ChangeMessage::Many(items) => items.iter().map(ChangeMessage::event_count).sum(),
            ChangeMessage::Event(_) => 1,
        }
    }
}

/// An array element that did not decode, with the routing it carried
#[derive(Debug)]
pub struct MalformedChange {
    pub view: Option<String>,
    pub cell: Option<String>,
    pub error: SyncError,
}

impl MalformedChange {
    fn new(item: &Value, error: SyncError) -> Self {
        let field = |name: &str| item.get(name).and_then(Value::as_str).map(str::to_string);
        Self { view: field("view"), cell: field("cell"), error }
    }
}

fn collect_items(items: Vec<Value>, out: &mut Vec<Result<ChangeMessage, MalformedChange>>) {
    for item in items {
        match item {
            Value::Array(nested) => collect_items(nested, out),
            item => match serde_json::from_value::<ChangeEvent>(item.clone()) {
                Ok(event) => out.push(Ok(ChangeMessage::Event(event))),
                Err(err) => out.push(Err(MalformedChange::new(&item, err.into()))),
            },
        }
    }
}

impl From<ChangeEvent> for ChangeMessage {
    fn from(event: ChangeEvent) -> Self {
        ChangeMessage::Event(event)
    }
}

impl From<Vec<ChangeEvent>> for ChangeMessage {
    fn from(events: Vec<ChangeEvent>) -> Self {
        ChangeMessage::Many(events.into_iter().map(ChangeMessage::Event).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_single_event() {
        let msg = ChangeMessage::parse(json!({
            "type": "upd", "view": "Tags", "seq": 6, "_id": "a", "prop": "x", "val": 2
        }))
        .unwrap();

        match msg {
            ChangeMessage::Event(ev) => {
                assert_eq!(ev.kind, Some(ChangeKind::Update));
                assert_eq!(ev.seq, Some(6));
                assert_eq!(ev.id.as_deref(), Some("a"));
                assert_eq!(ev.value(), json!(2));
            }
            other => panic!("Expected single event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_embedded_string_array() {
        let text = r#"[{"type":"ins","seq":1,"_id":"a","prop":"x","val":1},[{"type":"del","seq":2,"_id":"a","prop":"x"}]]"#;
        let msg = ChangeMessage::parse(Value::String(text.to_string())).unwrap();
        assert_eq!(msg.event_count(), 2);
    }

    #[test]
    fn test_unknown_kind() {
        let msg = ChangeMessage::parse(json!({"type": "zzz", "seq": 1})).unwrap();
        match msg {
            ChangeMessage::Event(ev) => assert_eq!(ev.kind, Some(ChangeKind::Unknown)),
            _ => panic!("Expected event"),
        }
    }

    #[test]
    fn test_batch_event() {
        let msg = ChangeMessage::parse(json!({
            "seq": 3,
            "batch": [
                {"type": "ins", "_id": "a", "prop": "x", "val": 1},
                {"type": "ins", "_id": "b", "prop": "y", "val": 2}
            ]
        }))
        .unwrap();

        match msg {
            ChangeMessage::Event(ev) => {
                assert_eq!(ev.seq, Some(3));
                assert_eq!(ev.batch.as_ref().map(Vec::len), Some(2));
            }
            _ => panic!("Expected batch event"),
        }
    }

    #[test]
    fn test_parse_items_keeps_good_elements() {
        let items = ChangeMessage::parse_items(json!([
            {"type": "upd", "view": "Tags", "seq": 6, "_id": "a", "prop": "x", "val": 2},
            {"type": "upd", "view": "Zones", "cell": "c2", "seq": "bad"},
            [{"type": "del", "view": "Tags", "seq": 7, "_id": "a", "prop": "x"}]
        ]))
        .unwrap();

        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], Ok(ChangeMessage::Event(ev)) if ev.seq == Some(6)));
        match &items[1] {
            Err(bad) => {
                assert_eq!(bad.view.as_deref(), Some("Zones"));
                assert_eq!(bad.cell.as_deref(), Some("c2"));
                assert_eq!(bad.error.kind(), "DecodeError");
            }
            other => panic!("Expected malformed element, got {:?}", other),
        }
        assert!(matches!(&items[2], Ok(ChangeMessage::Event(ev)) if ev.seq == Some(7)));
    }

    #[test]
    fn test_parse_items_single_event() {
        let text = r#"{"type":"ins","seq":1,"_id":"a","prop":"x","val":1}"#;
        let items = ChangeMessage::parse_items(Value::String(text.to_string())).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());

        assert!(ChangeMessage::parse_items(Value::String("[oops".to_string())).is_err());
        assert!(ChangeMessage::parse_items(json!({"seq": "six"})).is_err());
    }

    #[test]
    fn test_malformed_payload() {
        assert!(ChangeMessage::parse(Value::String("{oops".to_string())).is_err());
        assert!(ChangeMessage::parse(json!({"seq": "six"})).is_err());
    }

    #[test]
    fn test_establish_builder() {
        let ev = ChangeEvent::establish(Some("Tags"), None);
        assert!(ev.is_establish());
        assert_eq!(ev.view.as_deref(), Some("Tags"));

        let wire = serde_json::to_value(&ev).unwrap();
        assert_eq!(wire, json!({"type": "est", "view": "Tags"}));
    }
}
