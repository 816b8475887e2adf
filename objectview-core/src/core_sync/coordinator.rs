/*
    coordinator.rs - Multi-subscription sync coordinator

    ObjectView is the handle; the Coordinator is an actor task that owns
    the subscription table, the rebind scheduler and the reconnect timer.
    Every mutation of that state happens on the actor task:

        ObjectView ──commands──►┐
        HubTransport ─events───►├─► Coordinator ──spawn──► hub calls
        hub calls ─continuations►┘        │
                                          └─► ViewDef (replica, field map)

    Hub calls never run on the actor: they are spawned and their results
    come back as continuations, so a slow registration never holds up
    event dispatch for other subscriptions.

    Recovery:
    - a sequence gap or a named establish schedules a rebind for one key
    - a connection-wide establish drops pending rebinds and reconnects
    - a closed channel, failed connect or failed hub call backs off and
      reconnects; every tracked subscription re-registers on connect
*/

use super::backoff::JitterWindow;
use super::cell::subscription_key;
use super::hub::{CommitOutcome, HubClient, RegisterResponse, ValueQuery};
use super::rebind::RebindScheduler;
use super::subscription::{ViewDef, ViewDefBuilder};
use super::transport::{ConnectionState, HubEvent, HubTransport};
use crate::config::SyncConfig;
use crate::core_id::IdCreator;
use crate::core_view::encode::{ChangeSet, Command, FieldMap};
use crate::core_view::model::{ChangeEvent, ChangeMessage, MalformedChange, SubscriptionKey};
use crate::errors::{SyncError, SyncResult};
use crate::metrics::{MetricsCollector, SyncMetrics};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

/// Called with `(kind, reason)` for every reported failure
pub type ErrorCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Called on every successful (re)connect, before re-registration
pub type ConnectedCallback = Arc<dyn Fn() + Send + Sync>;

/// Commands sent to the coordinator
enum CoordinatorCommand {
    Connect,
    Subscribe { view: ViewDef, ack: oneshot::Sender<()> },
    Unsubscribe { view: ViewDef, ack: oneshot::Sender<()> },
    Status(oneshot::Sender<CoordinatorStatus>),
    Shutdown,
}

/// Results of spawned hub calls
enum Continuation {
    Started(SyncResult<()>),
    SiteCell(SyncResult<Option<String>>),
    Registered { view: ViewDef, outcome: SyncResult<RegisterResponse> },
    FieldMap { view: ViewDef, outcome: SyncResult<Option<FieldMap>> },
}

/// Snapshot of coordinator state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStatus {
    pub connection: ConnectionState,
    /// Keys of every tracked subscription, sorted
    pub subscriptions: Vec<SubscriptionKey>,
    pub pending_rebinds: usize,
    pub reconnect_pending: bool,
    pub site_cell: Option<String>,
}

/// Builder for [`ObjectView`]
pub struct ObjectViewBuilder {
    transport: Arc<dyn HubTransport>,
    events: mpsc::Receiver<HubEvent>,
    config: SyncConfig,
    ids: Option<Arc<IdCreator>>,
    on_error: Option<ErrorCallback>,
    on_connected: Option<ConnectedCallback>,
}

impl ObjectViewBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an id creator instead of making a private one
    pub fn id_creator(mut self, ids: Arc<IdCreator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_connected<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connected = Some(Arc::new(callback));
        self
    }

    /// Spawn the coordinator task. Must be called inside a tokio runtime.
    pub fn build(self) -> (ObjectView, JoinHandle<()>) {
        crate::metrics::init_metrics();
        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity.max(1));
        let (continuation_tx, continuation_rx) = mpsc::unbounded_channel();
        let hub = HubClient::new(self.transport);
        let metrics = Arc::new(MetricsCollector::new());
        let notify_capacity = self.config.notify_capacity;

        let coordinator = Coordinator {
            hub: hub.clone(),
            commands: command_rx,
            events: self.events,
            events_open: true,
            continuation_tx,
            continuations: continuation_rx,
            views: HashMap::new(),
            rebinds: RebindScheduler::new(self.config.rebind_window),
            reconnect_window: self.config.reconnect_window,
            reconnect_at: None,
            starting: false,
            site_cell: None,
            on_error: self.on_error,
            on_connected: self.on_connected,
            metrics: metrics.clone(),
        };
        let handle = tokio::spawn(coordinator.run());

        let view = ObjectView {
            commands: command_tx,
            hub,
            metrics,
            notify_capacity,
            ids: self.ids.unwrap_or_else(|| Arc::new(IdCreator::new())),
        };
        (view, handle)
    }
}

/// Handle to the sync coordinator
#[derive(Clone)]
pub struct ObjectView {
    commands: mpsc::Sender<CoordinatorCommand>,
    hub: HubClient,
    metrics: Arc<MetricsCollector>,
    notify_capacity: usize,
    ids: Arc<IdCreator>,
}

impl ObjectView {
    /// Start building a coordinator over `transport`, whose pushes arrive on `events`
    pub fn builder(transport: Arc<dyn HubTransport>, events: mpsc::Receiver<HubEvent>) -> ObjectViewBuilder {
        ObjectViewBuilder {
            transport,
            events,
            config: SyncConfig::default(),
            ids: None,
            on_error: None,
            on_connected: None,
        }
    }

    async fn send(&self, command: CoordinatorCommand) -> SyncResult<()> {
        self.commands.send(command).await.map_err(|_| SyncError::Closed)
    }

    /// Connect (if needed) and register every tracked subscription.
    ///
    /// Returns once the request is queued; failures are reported through
    /// the error callback and retried with backoff.
    pub async fn connect(&self) -> SyncResult<()> {
        self.send(CoordinatorCommand::Connect).await
    }

    /// Start a view definition sized by this coordinator's configuration
    pub fn view_def(&self, view: impl Into<String>) -> ViewDefBuilder {
        ViewDef::builder(view).notify_capacity(self.notify_capacity)
    }

    /// Track a subscription, registering it now if connected
    pub async fn subscribe(&self, view: &ViewDef) -> SyncResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(CoordinatorCommand::Subscribe { view: view.clone(), ack }).await?;
        done.await.map_err(|_| SyncError::Closed)
    }

    /// Stop tracking a subscription; deregistration is best-effort
    pub async fn unsubscribe(&self, view: &ViewDef) -> SyncResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(CoordinatorCommand::Unsubscribe { view: view.clone(), ack }).await?;
        done.await.map_err(|_| SyncError::Closed)
    }

    pub async fn status(&self) -> SyncResult<CoordinatorStatus> {
        let (reply, status) = oneshot::channel();
        self.send(CoordinatorCommand::Status(reply)).await?;
        status.await.map_err(|_| SyncError::Closed)
    }

    /// Stop the coordinator task
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.send(CoordinatorCommand::Shutdown).await
    }

    /// Commit commands; a hub rejection is returned, not reported
    pub async fn commit_changes(&self, commands: &[Command]) -> SyncResult<CommitOutcome> {
        self.hub.commit_changes(commands).await
    }

    pub async fn commit(&self, changes: &ChangeSet) -> SyncResult<CommitOutcome> {
        self.commit_changes(&changes.commands).await
    }

    /// Cells covering a GeoJSON region
    pub async fn get_cells(&self, region: &Value) -> SyncResult<Value> {
        self.hub.get_cells(region).await
    }

    /// Read one document without caching it or receiving updates
    pub async fn get_value(&self, query: &ValueQuery) -> SyncResult<Value> {
        self.hub.get_value(query).await
    }

    pub async fn get_field_map(&self, view: &str) -> SyncResult<Option<FieldMap>> {
        self.hub.get_field_map(view).await
    }

    /// A new object id of the given type, e.g. `UserDataModel::[Custom]Product`
    pub fn create_object(&self, type_name: &str) -> String {
        self.ids.create_object(type_name)
    }

    pub fn id_creator(&self) -> &Arc<IdCreator> {
        &self.ids
    }

    pub fn metrics(&self) -> SyncMetrics {
        self.metrics.snapshot()
    }

    pub fn version(&self) -> &'static str {
        crate::VERSION
    }
}

struct Coordinator {
    hub: HubClient,
    commands: mpsc::Receiver<CoordinatorCommand>,
    events: mpsc::Receiver<HubEvent>,
    events_open: bool,
    continuation_tx: mpsc::UnboundedSender<Continuation>,
    continuations: mpsc::UnboundedReceiver<Continuation>,
    views: HashMap<SubscriptionKey, ViewDef>,
    rebinds: RebindScheduler,
    reconnect_window: JitterWindow,
    reconnect_at: Option<Instant>,
    starting: bool,
    site_cell: Option<String>,
    on_error: Option<ErrorCallback>,
    on_connected: Option<ConnectedCallback>,
    metrics: Arc<MetricsCollector>,
}

impl Coordinator {
    async fn run(mut self) {
        debug!("Coordinator started");

        loop {
            let rebind_at = self.rebinds.deadline();
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(CoordinatorCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                event = self.events.recv(), if self.events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Hub event channel closed");
                        self.events_open = false;
                    }
                },

                Some(continuation) = self.continuations.recv() => self.handle_continuation(continuation),

                _ = sleep_until(rebind_at.unwrap_or_else(Instant::now)), if rebind_at.is_some() => {
                    self.do_rebinds();
                }

                _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.metrics.inc_reconnects();
                    self.connect();
                }
            }
        }

        debug!("Coordinator stopped");
    }

    fn handle_command(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::Connect => self.connect(),
            CoordinatorCommand::Subscribe { view, ack } => {
                self.subscribe(view);
                let _ = ack.send(());
            }
            CoordinatorCommand::Unsubscribe { view, ack } => {
                self.unsubscribe(view);
                let _ = ack.send(());
            }
            CoordinatorCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
            CoordinatorCommand::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::ViewEvent { view, message } => match ChangeMessage::parse_items(message) {
                Ok(items) => {
                    for item in items {
                        match item {
                            Ok(message) => self.dispatch(&message),
                            Err(malformed) => self.malformed_change(&view, malformed),
                        }
                    }
                }
                Err(err) => {
                    warn!("Malformed change payload for {}: {}", view, err);
                    self.reconnect_error(&err);
                }
            },
            HubEvent::Closed { reason } => {
                warn!("Hub connection closed: {}", reason);
                self.starting = false;
                self.report("ConnectionClosed", &reason);
                self.backoff_connect();
            }
        }
    }

    fn handle_continuation(&mut self, continuation: Continuation) {
        match continuation {
            Continuation::Started(Ok(())) => {
                self.starting = false;
                info!("Connected to hub");
                self.register_all();
            }
            Continuation::Started(Err(err)) => {
                self.starting = false;
                self.reconnect_error(&err);
            }
            Continuation::SiteCell(Ok(cell)) => {
                if let Some(cell) = cell {
                    if self.site_cell.as_deref() != Some(cell.as_str()) {
                        info!("Site cell is {}", cell);
                        self.site_cell = Some(cell);
                        self.rekey();
                    }
                }
                let views: Vec<ViewDef> = self.views.values().cloned().collect();
                for view in views {
                    self.register_view(view);
                }
            }
            Continuation::SiteCell(Err(err)) => self.reconnect_error(&err),
            Continuation::Registered { view, outcome } => self.on_registered(view, outcome),
            Continuation::FieldMap { view, outcome } => match outcome {
                Ok(field_map) => {
                    debug!("{}: field map {}", view.view(), if field_map.is_some() { "loaded" } else { "absent" });
                    view.set_field_map(field_map);
                }
                Err(err) => warn!("{}: field map fetch failed: {}", view.view(), err),
            },
        }
    }

    fn spawn<F>(&self, call: F)
    where
        F: Future<Output = Continuation> + Send + 'static,
    {
        let continuation_tx = self.continuation_tx.clone();
        tokio::spawn(async move {
            let _ = continuation_tx.send(call.await);
        });
    }

    fn connect(&mut self) {
        if self.hub.is_connected() {
            self.register_all();
            return;
        }
        if self.starting {
            debug!("Connect already in progress");
            return;
        }

        info!("Connecting to hub");
        self.starting = true;
        let transport = self.hub.transport().clone();
        self.spawn(async move { Continuation::Started(transport.start().await) });
    }

    fn register_all(&mut self) {
        if let Some(callback) = &self.on_connected {
            callback();
        }

        let hub = self.hub.clone();
        self.spawn(async move { Continuation::SiteCell(hub.site_cell().await) });
    }

    fn register_view(&mut self, view: ViewDef) {
        if !view.begin_registration() {
            debug!("{}: registration already in progress", view.view());
            return;
        }

        let params = view.register_params();
        let hub = self.hub.clone();
        let target = view.clone();
        self.spawn(async move {
            let outcome = hub.register_view(&params).await;
            Continuation::Registered { view: target, outcome }
        });

        self.ensure_field_map(view);
    }

    /// Clear the field map and fetch it again; read-only views end up with none
    fn ensure_field_map(&mut self, view: ViewDef) {
        view.set_field_map(None);
        let hub = self.hub.clone();
        self.spawn(async move {
            let outcome = hub.get_field_map(view.view()).await;
            Continuation::FieldMap { view, outcome }
        });
    }

    fn on_registered(&mut self, view: ViewDef, outcome: SyncResult<RegisterResponse>) {
        view.end_registration();

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                self.reconnect_error(&err);
                return;
            }
        };

        match view.apply_registration(&response) {
            Ok(applied) => {
                info!("{}: registered at sequence {:?}", view.view(), view.sequence());
                self.metrics.inc_registrations();
                self.metrics.add_changes_applied(applied as u64);
            }
            Err(err @ SyncError::Sequence { .. }) => {
                warn!("{}: registration changes out of sequence: {}", view.view(), err);
                self.metrics.inc_sequence_errors();
                self.report_error(&err);
                let key = self.key_of(&view);
                self.request_rebind(key, err.received_sequence());
            }
            Err(err) => self.report_error(&err),
        }
    }

    fn subscribe(&mut self, view: ViewDef) {
        let key = self.key_of(&view);
        info!("Subscribing to {}", key);
        self.views.insert(key, view.clone());
        if self.hub.is_connected() {
            self.register_view(view);
        }
    }

    fn unsubscribe(&mut self, view: ViewDef) {
        let key = self.key_of(&view);
        info!("Unsubscribing from {}", key);

        if self.hub.is_connected() {
            let hub = self.hub.clone();
            let params = view.deregister_params();
            tokio::spawn(async move {
                if let Err(err) = hub.deregister_view(&params).await {
                    debug!("Deregistration of {} failed: {}", params.view, err);
                }
            });
        }

        self.views.remove(&key);
    }

    fn dispatch(&mut self, message: &ChangeMessage) {
        match message {
            ChangeMessage::Many(items) => {
                for item in items {
                    self.dispatch(item);
                }
            }
            ChangeMessage::Event(event) if event.is_establish() => self.establish(event),
            ChangeMessage::Event(event) => self.route(event, message),
        }
    }

    fn establish(&mut self, event: &ChangeEvent) {
        match event.view.as_deref().filter(|view| !view.is_empty()) {
            Some(view) => {
                let key = self.key_for(view, event.cell.as_deref());
                debug!("Establish for {}", key);
                self.request_rebind(key, event.seq);
            }
            None => {
                warn!("Connection-wide establish, reconnecting");
                self.rebinds.clear();
                self.backoff_connect();
            }
        }
    }

    fn route(&mut self, event: &ChangeEvent, message: &ChangeMessage) {
        let Some(view) = event.view.as_deref() else {
            trace!("Dropping change without a view");
            return;
        };
        let Some((key, def)) = self.lookup(view, event.cell.as_deref()) else {
            trace!("No subscription for {}:{}", view, event.cell.as_deref().unwrap_or(""));
            return;
        };

        match def.apply_changes(message) {
            Ok(applied) => self.metrics.add_changes_applied(applied as u64),
            Err(err @ SyncError::Sequence { .. }) => {
                warn!("{}", err);
                self.metrics.inc_sequence_errors();
                self.report_error(&err);
                self.request_rebind(key, err.received_sequence());
            }
            Err(err) => self.report_error(&err),
        }
    }

    /// Rebind the view a bad element names; reconnect if it names none
    fn malformed_change(&mut self, channel: &str, malformed: MalformedChange) {
        warn!("Malformed change element for {}: {}", channel, malformed.error);
        self.report_error(&malformed.error);
        match malformed.view.as_deref().filter(|view| !view.is_empty()) {
            Some(view) => match self.lookup(view, malformed.cell.as_deref()) {
                Some((key, _)) => self.request_rebind(key, None),
                None => trace!("No subscription for {}, malformed element dropped", view),
            },
            None => self.backoff_connect(),
        }
    }

    fn request_rebind(&mut self, key: SubscriptionKey, sequence: Option<u64>) {
        self.metrics.inc_rebinds_scheduled();
        if self.rebinds.request(key, sequence, Instant::now()) {
            debug!("Rebind timer armed");
        }
    }

    fn do_rebinds(&mut self) {
        for (key, recorded) in self.rebinds.take_due(Instant::now()) {
            let Some((_, view)) = self.lookup(&key.view, key.cell.as_deref()) else {
                debug!("Rebind for {} dropped, no subscription", key);
                continue;
            };

            if view.sequence() == recorded {
                debug!("{}: caught up at {:?}, rebind skipped", key, recorded);
                continue;
            }

            info!("{}: rebinding", key);
            self.metrics.inc_rebinds_performed();
            self.register_view(view);
        }
    }

    fn backoff_connect(&mut self) {
        if self.reconnect_at.is_some() {
            return;
        }
        let delay = self.reconnect_window.sample();
        debug!("Reconnecting in {:?}", delay);
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn reconnect_error(&mut self, err: &SyncError) {
        self.report_error(err);
        self.backoff_connect();
    }

    fn report_error(&self, err: &SyncError) {
        match err {
            SyncError::Registration { message, context } => {
                self.report(message, context.as_deref().unwrap_or(""));
            }
            other => self.report(other.kind(), &other.to_string()),
        }
    }

    fn report(&self, kind: &str, reason: &str) {
        error!("{}: {}", kind, reason);
        if let Some(callback) = &self.on_error {
            callback(kind, reason);
        }
    }

    fn key_for(&self, view: &str, cell: Option<&str>) -> SubscriptionKey {
        subscription_key(view, cell, self.site_cell.as_deref())
    }

    fn key_of(&self, view: &ViewDef) -> SubscriptionKey {
        self.key_for(view.view(), view.cell())
    }

    /// Exact key first, then the view's site-wide entry
    fn lookup(&self, view: &str, cell: Option<&str>) -> Option<(SubscriptionKey, ViewDef)> {
        let key = self.key_for(view, cell);
        if let Some(def) = self.views.get(&key) {
            return Some((key, def.clone()));
        }
        let fallback = key.fallback()?;
        let def = self.views.get(&fallback)?.clone();
        Some((fallback, def))
    }

    fn rekey(&mut self) {
        let views: Vec<ViewDef> = self.views.drain().map(|(_, view)| view).collect();
        for view in views {
            let key = self.key_of(&view);
            self.views.insert(key, view);
        }
    }

    fn status(&self) -> CoordinatorStatus {
        let mut subscriptions: Vec<SubscriptionKey> = self.views.keys().cloned().collect();
        subscriptions.sort();
        CoordinatorStatus {
            connection: self.hub.transport().state(),
            subscriptions,
            pending_rebinds: self.rebinds.pending(),
            reconnect_pending: self.reconnect_at.is_some(),
            site_cell: self.site_cell.clone(),
        }
    }
}
