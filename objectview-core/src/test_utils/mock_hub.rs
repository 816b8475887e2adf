//! In-memory hub transport
//!
//! `MockHub` records every invocation, answers from per-route scripts
//! (falling back to canned defaults) and lets tests push `viewEvent`s and
//! connection closes into the coordinator.

use crate::core_sync::hub::{
    COMMIT_CHANGES, DEREGISTER_VIEW, EXECUTE, GET_CELLS, GET_MAPPING, GET_VALUE, REGISTER_VIEW,
};
use crate::core_sync::transport::{ConnectionState, HubEvent, HubTransport};
use crate::errors::{SyncError, SyncResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// One recorded invocation
#[derive(Debug, Clone, PartialEq)]
pub struct HubCall {
    pub method: String,
    pub args: Vec<Value>,
}

impl HubCall {
    /// `Execute:<operation>` for Execute calls, the method name otherwise
    pub fn route(&self) -> String {
        route_of(&self.method, &self.args)
    }

    /// The call's payload: the decoded Execute payload, or the first argument
    pub fn payload(&self) -> Value {
        if self.method == EXECUTE {
            return match self.args.get(1) {
                Some(Value::String(text)) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())),
                Some(other) => other.clone(),
                None => Value::Null,
            };
        }
        self.args.first().cloned().unwrap_or(Value::Null)
    }
}

fn route_of(method: &str, args: &[Value]) -> String {
    match (method, args.first()) {
        (EXECUTE, Some(Value::String(op))) => format!("{}:{}", EXECUTE, op),
        _ => method.to_string(),
    }
}

/// Route key for an Execute operation
pub fn execute_route(operation: &str) -> String {
    format!("{}:{}", EXECUTE, operation)
}

struct MockState {
    connection: ConnectionState,
    fail_next_starts: usize,
    starts: usize,
    calls: Vec<HubCall>,
    scripted: HashMap<String, VecDeque<SyncResult<Value>>>,
    defaults: HashMap<String, Value>,
}

/// Scripted [`HubTransport`] for tests
pub struct MockHub {
    state: Mutex<MockState>,
    events: mpsc::Sender<HubEvent>,
}

impl MockHub {
    /// Create a disconnected hub and the event stream the coordinator reads
    pub fn new() -> (Arc<Self>, mpsc::Receiver<HubEvent>) {
        let (events, rx) = mpsc::channel(256);

        let mut defaults = HashMap::new();
        defaults.insert(REGISTER_VIEW.to_string(), json!({"result": {"message": "OK"}}));
        defaults.insert(DEREGISTER_VIEW.to_string(), Value::Null);
        defaults.insert(execute_route(GET_MAPPING), json!({"field_map": null}));
        defaults.insert(execute_route(GET_CELLS), json!({"features": []}));
        defaults.insert(execute_route(COMMIT_CHANGES), json!({}));
        defaults.insert(execute_route(GET_VALUE), json!({}));

        let hub = Self {
            state: Mutex::new(MockState {
                connection: ConnectionState::Disconnected,
                fail_next_starts: 0,
                starts: 0,
                calls: Vec::new(),
                scripted: HashMap::new(),
                defaults,
            }),
            events,
        };
        (Arc::new(hub), rx)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `count` calls to `start` fail
    pub fn fail_next_starts(&self, count: usize) {
        self.lock().fail_next_starts = count;
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.lock().connection = state;
    }

    /// Queue a one-shot response for a route
    pub fn respond(&self, route: impl Into<String>, response: Value) {
        self.lock().scripted.entry(route.into()).or_default().push_back(Ok(response));
    }

    /// Queue a one-shot failure for a route
    pub fn fail(&self, route: impl Into<String>, error: SyncError) {
        self.lock().scripted.entry(route.into()).or_default().push_back(Err(error));
    }

    /// Replace the response used once a route's script runs dry
    pub fn set_default(&self, route: impl Into<String>, response: Value) {
        self.lock().defaults.insert(route.into(), response);
    }

    /// Push a `viewEvent` to the coordinator
    pub async fn push_view_event(&self, view: &str, message: Value) {
        let event = HubEvent::ViewEvent { view: view.to_string(), message };
        let _ = self.events.send(event).await;
    }

    /// Drop the connection and tell the coordinator
    pub async fn close(&self, reason: &str) {
        self.set_state(ConnectionState::Disconnected);
        let _ = self.events.send(HubEvent::Closed { reason: reason.to_string() }).await;
    }

    pub fn calls(&self) -> Vec<HubCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls on one route
    pub fn calls_to(&self, route: &str) -> Vec<HubCall> {
        self.lock().calls.iter().filter(|call| call.route() == route).cloned().collect()
    }

    pub fn count(&self, route: &str) -> usize {
        self.calls_to(route).len()
    }

    pub fn start_count(&self) -> usize {
        self.lock().starts
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait]
impl HubTransport for MockHub {
    async fn start(&self) -> SyncResult<()> {
        let mut state = self.lock();
        state.starts += 1;
        if state.fail_next_starts > 0 {
            state.fail_next_starts -= 1;
            state.connection = ConnectionState::Disconnected;
            return Err(SyncError::Transport("connection refused".to_string()));
        }
        state.connection = ConnectionState::Connected;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.lock().connection
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> SyncResult<Value> {
        let mut state = self.lock();
        if state.connection != ConnectionState::Connected {
            return Err(SyncError::Transport(format!("{} invoked while disconnected", method)));
        }

        let route = route_of(method, &args);
        state.calls.push(HubCall { method: method.to_string(), args });

        if let Some(response) = state.scripted.get_mut(&route).and_then(VecDeque::pop_front) {
            return response;
        }
        Ok(state.defaults.get(&route).cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invoke_requires_connection() {
        let (hub, _events) = MockHub::new();
        let err = hub.invoke(REGISTER_VIEW, vec![json!({})]).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
        assert!(hub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_then_default() {
        let (hub, _events) = MockHub::new();
        hub.start().await.unwrap();
        hub.respond(execute_route(GET_CELLS), json!({"features": [1]}));

        let args = vec![json!(GET_CELLS), json!("{}")];
        assert_eq!(hub.invoke(EXECUTE, args.clone()).await.unwrap(), json!({"features": [1]}));
        assert_eq!(hub.invoke(EXECUTE, args).await.unwrap(), json!({"features": []}));
        assert_eq!(hub.count(&execute_route(GET_CELLS)), 2);
    }

    #[tokio::test]
    async fn test_failing_starts() {
        let (hub, _events) = MockHub::new();
        hub.fail_next_starts(1);
        assert!(hub.start().await.is_err());
        assert!(!hub.is_connected());
        assert!(hub.start().await.is_ok());
        assert!(hub.is_connected());
        assert_eq!(hub.start_count(), 2);
    }

    #[tokio::test]
    async fn test_payload_decoding() {
        let call = HubCall {
            method: EXECUTE.to_string(),
            args: vec![json!(GET_VALUE), json!("{\"_id\":\"a\"}")],
        };
        assert_eq!(call.route(), "Execute:Get_Value");
        assert_eq!(call.payload(), json!({"_id": "a"}));
    }

    #[tokio::test]
    async fn test_close_pushes_event() {
        let (hub, mut events) = MockHub::new();
        hub.start().await.unwrap();
        hub.close("bye").await;
        assert!(!hub.is_connected());
        assert_eq!(events.recv().await, Some(HubEvent::Closed { reason: "bye".to_string() }));
    }
}
