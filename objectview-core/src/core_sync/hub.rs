/*
    hub.rs - Typed calls against the hub

    Method surface used by the coordinator:

        RegisterView({Version: 1, View, Cell?, WithoutDump?})
            -> {result: {message, context}, contents?, changes?}
        DeregisterView({View, Cell?})
        Execute("Get_Mapping", view)             -> {field_map}
        Execute("Commit_Changes", [commands])    -> payload | {error}
        Execute("Get_Cells", region)             -> feature collection
        Execute("Get_Value", {view, cell, _id})  -> document

    Execute payloads travel as JSON text; responses may come back either as
    JSON text or as already-decoded values.
*/

use super::cell::SITE_CELL_LEVEL;
use super::transport::HubTransport;
use crate::core_view::encode::{Command, FieldMap};
use crate::core_view::model::{ChangeMessage, Dump};
use crate::errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub const REGISTER_VIEW: &str = "RegisterView";
pub const DEREGISTER_VIEW: &str = "DeregisterView";
pub const EXECUTE: &str = "Execute";

pub const COMMIT_CHANGES: &str = "Commit_Changes";
pub const GET_CELLS: &str = "Get_Cells";
pub const GET_VALUE: &str = "Get_Value";
pub const GET_MAPPING: &str = "Get_Mapping";

/// Registration protocol version
pub const REGISTER_VERSION: u32 = 1;

/// Registration result message meaning success
pub const REGISTER_OK: &str = "OK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterParams {
    pub version: u32,
    pub view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub without_dump: bool,
}

impl RegisterParams {
    pub fn new(view: impl Into<String>, cell: Option<String>, with_dump: bool) -> Self {
        Self { version: REGISTER_VERSION, view: view.into(), cell, without_dump: !with_dump }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeregisterParams {
    pub view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
}

/// Outcome block of a registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResult {
    pub message: String,
    #[serde(default)]
    pub context: Option<Value>,
}

/// Response to `RegisterView`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub result: RegisterResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Value>,
}

impl RegisterResponse {
    pub fn ok(contents: Option<Value>, changes: Option<Value>) -> Self {
        Self {
            result: RegisterResult { message: REGISTER_OK.to_string(), context: None },
            contents,
            changes,
        }
    }

    pub fn rejected(message: impl Into<String>, context: Option<Value>) -> Self {
        Self { result: RegisterResult { message: message.into(), context }, contents: None, changes: None }
    }

    pub fn is_ok(&self) -> bool {
        self.result.message == REGISTER_OK
    }

    /// The dump, if the hub sent one
    pub fn dump(&self) -> SyncResult<Option<Dump>> {
        present(&self.contents)
            .map(|contents| decode_payload(contents.clone()).and_then(Dump::from_value))
            .transpose()
    }

    /// Changes that arrived while the dump was being prepared
    pub fn changes(&self) -> SyncResult<Option<ChangeMessage>> {
        present(&self.changes).map(|changes| ChangeMessage::parse(changes.clone())).transpose()
    }

    /// The rejection as an error
    pub fn error(&self) -> SyncError {
        let context = self.result.context.as_ref().map(|c| match c {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });
        SyncError::Registration { message: self.result.message.clone(), context }
    }
}

fn present(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| !v.is_null() && v.as_str() != Some(""))
}

/// Decode a payload that may still be JSON text
pub fn decode_payload(payload: Value) -> SyncResult<Value> {
    match payload {
        Value::String(text) => Ok(serde_json::from_str(&text)?),
        other => Ok(other),
    }
}

/// Field map from a `Get_Mapping` response; `None` for read-only views
pub fn parse_field_map(response: Value) -> SyncResult<Option<FieldMap>> {
    match response.get("field_map") {
        None | Some(Value::Null) => Ok(None),
        Some(map) => Ok(Some(serde_json::from_value(map.clone())?)),
    }
}

/// Result of committing commands
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Nothing to commit; the hub was not contacted
    Empty,
    /// The hub accepted the commands
    Committed(Value),
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }
}

/// Parameters of an uncached single-document read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueQuery {
    pub view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
}

impl ValueQuery {
    pub fn new(view: impl Into<String>, cell: Option<String>, id: impl Into<String>) -> Self {
        Self { view: view.into(), cell, id: id.into() }
    }
}

/// Polygon covering every coordinate the hub can hold
pub fn whole_world_region() -> Value {
    let large = 1e16;
    json!({
        "type": "Polygon",
        "coordinates": [[[-large, -large], [large, -large], [large, large], [-large, large]]]
    })
}

/// Id of the site-level cell in a `Get_Cells` feature collection.
///
/// The last matching feature wins.
pub fn site_cell_from_features(cells: &Value) -> Option<String> {
    cells
        .get("features")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|feature| feature.get("properties"))
        .filter(|props| props.get("level").and_then(Value::as_i64) == Some(SITE_CELL_LEVEL))
        .filter_map(|props| props.get("id").and_then(Value::as_str))
        .last()
        .map(str::to_string)
}

/// Typed client over a [`HubTransport`]
#[derive(Clone)]
pub struct HubClient {
    transport: Arc<dyn HubTransport>,
}

impl HubClient {
    pub fn new(transport: Arc<dyn HubTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn HubTransport> {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn register_view(&self, params: &RegisterParams) -> SyncResult<RegisterResponse> {
        debug!("Registering view {} (cell {:?}, dump {})", params.view, params.cell, !params.without_dump);
        let response = self.transport.invoke(REGISTER_VIEW, vec![serde_json::to_value(params)?]).await?;
        Ok(serde_json::from_value(decode_payload(response)?)?)
    }

    pub async fn deregister_view(&self, params: &DeregisterParams) -> SyncResult<()> {
        self.transport.invoke(DEREGISTER_VIEW, vec![serde_json::to_value(params)?]).await?;
        Ok(())
    }

    /// Run a named hub operation with a JSON text payload
    pub async fn execute(&self, operation: &str, payload: String) -> SyncResult<Value> {
        let response = self
            .transport
            .invoke(EXECUTE, vec![Value::String(operation.to_string()), Value::String(payload)])
            .await?;
        decode_payload(response)
    }

    pub async fn get_field_map(&self, view: &str) -> SyncResult<Option<FieldMap>> {
        parse_field_map(self.execute(GET_MAPPING, view.to_string()).await?)
    }

    /// Commit commands. A response carrying `error` is a [`SyncError::Commit`].
    pub async fn commit_changes(&self, commands: &[Command]) -> SyncResult<CommitOutcome> {
        if commands.is_empty() {
            return Ok(CommitOutcome::Empty);
        }

        let response = self.execute(COMMIT_CHANGES, serde_json::to_string(commands)?).await?;
        match response.get("error") {
            None | Some(Value::Null) => Ok(CommitOutcome::Committed(response)),
            Some(error) => {
                let error = match error {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                Err(SyncError::Commit { error, payload: response })
            }
        }
    }

    pub async fn get_cells(&self, region: &Value) -> SyncResult<Value> {
        let payload = match region {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        self.execute(GET_CELLS, payload).await
    }

    pub async fn get_value(&self, query: &ValueQuery) -> SyncResult<Value> {
        self.execute(GET_VALUE, serde_json::to_string(query)?).await
    }

    /// Resolve the site cell with a whole-world cell query
    pub async fn site_cell(&self) -> SyncResult<Option<String>> {
        let cells = self.get_cells(&whole_world_region()).await?;
        Ok(site_cell_from_features(&cells))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_params_wire_form() {
        let params = RegisterParams::new("Tags", Some("c1".to_string()), false);
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"Version": 1, "View": "Tags", "Cell": "c1", "WithoutDump": true})
        );

        let params = RegisterParams::new("Tags", None, true);
        assert_eq!(serde_json::to_value(&params).unwrap(), json!({"Version": 1, "View": "Tags"}));
    }

    #[test]
    fn test_deregister_params_wire_form() {
        let params = DeregisterParams { view: "Tags".to_string(), cell: None };
        assert_eq!(serde_json::to_value(&params).unwrap(), json!({"View": "Tags"}));
    }

    #[test]
    fn test_register_response_embedded_text() {
        let response: RegisterResponse = serde_json::from_value(json!({
            "result": {"message": "OK", "context": ""},
            "contents": "{\"seq\": 5, \"a\": {\"x\": 1}}",
            "changes": "[{\"type\": \"upd\", \"seq\": 6, \"_id\": \"a\", \"prop\": \"x\", \"val\": 2}]"
        }))
        .unwrap();

        assert!(response.is_ok());
        let dump = response.dump().unwrap().unwrap();
        assert_eq!(dump.sequence, Some(5));
        assert_eq!(response.changes().unwrap().unwrap().event_count(), 1);
    }

    #[test]
    fn test_register_response_without_dump() {
        let response = RegisterResponse::ok(None, Some(Value::String(String::new())));
        assert!(response.dump().unwrap().is_none());
        assert!(response.changes().unwrap().is_none());
    }

    #[test]
    fn test_rejection_error() {
        let response = RegisterResponse::rejected("NoSuchView", Some(json!("Tags")));
        assert!(!response.is_ok());
        match response.error() {
            SyncError::Registration { message, context } => {
                assert_eq!(message, "NoSuchView");
                assert_eq!(context.as_deref(), Some("Tags"));
            }
            other => panic!("Expected registration error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_field_map() {
        assert_eq!(parse_field_map(json!({"field_map": null})).unwrap(), None);
        assert_eq!(parse_field_map(json!({})).unwrap(), None);

        let map = parse_field_map(json!({"field_map": {"name": ["Name", [3]]}})).unwrap().unwrap();
        assert_eq!(map.len(), 1);

        assert!(matches!(
            parse_field_map(json!({"field_map": {"name": ["Name", [9]]}})),
            Err(SyncError::Decode(_))
        ));
    }

    #[test]
    fn test_site_cell_from_features() {
        let cells = json!({
            "type": "FeatureCollection",
            "features": [
                {"properties": {"level": 2, "id": "region"}},
                {"properties": {"level": 3, "id": "site-cell"}},
                {"geometry": null},
                {"properties": {"level": 4, "id": "room"}}
            ]
        });
        assert_eq!(site_cell_from_features(&cells).as_deref(), Some("site-cell"));
        assert_eq!(site_cell_from_features(&json!({"features": []})), None);
        assert_eq!(site_cell_from_features(&json!({})), None);
    }

    #[test]
    fn test_value_query_wire_form() {
        let query = ValueQuery::new("Tags", None, "a");
        assert_eq!(serde_json::to_value(&query).unwrap(), json!({"view": "Tags", "_id": "a"}));
    }
}
