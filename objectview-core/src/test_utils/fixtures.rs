//! Test fixtures for hub payloads
//!
//! Factory functions for the shapes the hub sends: field maps, dumps,
//! registration responses, change events and cell queries.

use crate::core_sync::hub::RegisterResponse;
use crate::core_view::encode::FieldMap;
use crate::core_view::model::{ChangeEvent, Document};
use serde_json::{json, Value};

/// Wire form of the tag field map
pub fn tag_field_map_json() -> Value {
    json!({
        "name": ["Name", [2], [3]],
        "groups": ["Member", [2], [3], [1]],
        "position": ["Position", [2], [4, "x"], [4, "y"]]
    })
}

/// Field map with a scalar, a sequence and a subfield accessor
pub fn tag_field_map() -> FieldMap {
    serde_json::from_value(tag_field_map_json()).unwrap_or_default()
}

/// A `Get_Mapping` response, as JSON text
pub fn mapping_response(field_map: Option<Value>) -> Value {
    Value::String(json!({ "field_map": field_map }).to_string())
}

/// A dump object with the given baseline and documents
pub fn dump_json(seq: u64, documents: Value) -> Value {
    let mut dump = match documents {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    dump.insert("seq".to_string(), json!(seq));
    Value::Object(dump)
}

/// Successful registration carrying a dump (as JSON text) and optional changes
pub fn register_ok(seq: u64, documents: Value, changes: Option<Value>) -> RegisterResponse {
    RegisterResponse::ok(
        Some(Value::String(dump_json(seq, documents).to_string())),
        changes.map(|c| Value::String(c.to_string())),
    )
}

/// Registration response as the hub returns it
pub fn register_ok_json(seq: u64, documents: Value) -> Value {
    serde_json::to_value(register_ok(seq, documents, None)).unwrap_or(Value::Null)
}

/// Registration rejected with a message and context
pub fn register_rejected_json(message: &str, context: &str) -> Value {
    json!({ "result": { "message": message, "context": context } })
}

/// A `Get_Cells` response naming the site cell
pub fn cells_response(site_cell: &str) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": [
            { "properties": { "level": 2, "id": "region-cell" } },
            { "properties": { "level": 3, "id": site_cell } }
        ]
    })
}

/// An update event addressed to a view
pub fn update_event(view: &str, seq: u64, id: &str, prop: &str, val: Value) -> ChangeEvent {
    ChangeEvent::update(id, prop, val).with_seq(seq).with_view(view, None)
}

/// An establish signal for a view, or for the whole connection
pub fn establish_event(view: Option<&str>) -> ChangeEvent {
    ChangeEvent::establish(view, None)
}

/// Wire form of a change event
pub fn event_json(event: &ChangeEvent) -> Value {
    serde_json::to_value(event).unwrap_or(Value::Null)
}

/// A document from a JSON object literal
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
