/*
    engine.rs - Replica engine

    Owns the cached documents of one subscription and applies the hub's
    ordered change stream to them.

    Sequence rules:
    - a dump sets the baseline; no dump clears it
    - with no replica held and no baseline, the first event sets it
    - otherwise an event must carry baseline + 1, else SequenceError
    - an event repeating the baseline is a duplicate delivery and is skipped
    - a batch applies all inner events under its single sequence number

    A failed sequence check leaves the replica untouched.
*/

use super::notifier::{ChangeNotifier, ReplicaChange};
use crate::core_view::model::{ChangeEvent, ChangeKind, ChangeMessage, Document, Dump, Replica};
use crate::errors::{SyncError, SyncResult};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// What the engine keeps besides the sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetMode {
    /// No documents are cached; only the sequence is tracked
    Detached,
    /// The replica is reconciled to exactly the dumped key set
    #[default]
    Owned,
    /// Dumps are merged over the existing documents
    Merged,
}

enum SequenceCheck {
    Next,
    Duplicate,
}

pub struct ReplicaEngine {
    view: String,
    mode: TargetMode,
    replica: Option<Replica>,
    sequence: Option<u64>,
    notifier: ChangeNotifier,
}

impl ReplicaEngine {
    pub fn new(view: impl Into<String>, mode: TargetMode) -> Self {
        Self::with_notifier(view, mode, ChangeNotifier::default())
    }

    pub fn with_notifier(view: impl Into<String>, mode: TargetMode, notifier: ChangeNotifier) -> Self {
        let replica = match mode {
            TargetMode::Detached => None,
            TargetMode::Owned | TargetMode::Merged => Some(Replica::new()),
        };
        Self { view: view.into(), mode, replica, sequence: None, notifier }
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn mode(&self) -> TargetMode {
        self.mode
    }

    pub fn has_target(&self) -> bool {
        self.replica.is_some()
    }

    /// Last applied sequence number
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn replica(&self) -> Option<&Replica> {
        self.replica.as_ref()
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplicaChange> {
        self.notifier.subscribe()
    }

    /// Replace the cached contents with a dump and take its sequence as baseline
    pub fn apply_dump(&mut self, dump: Option<Dump>) {
        let Some(dump) = dump else {
            debug!("{}: no dump, sequence resumes from the next change", self.view);
            self.sequence = None;
            return;
        };

        self.sequence = dump.sequence;

        match (self.mode, self.replica.as_mut()) {
            (TargetMode::Owned, Some(replica)) => {
                let stale: Vec<String> = replica
                    .ids()
                    .filter(|id| !dump.documents.contains_key(id.as_str()))
                    .cloned()
                    .collect();
                for id in stale {
                    replica.remove(&id);
                    self.notifier.emit(ReplicaChange::Removed { id });
                }
                for (id, doc) in dump.documents {
                    if replica.put(id.clone(), doc) {
                        self.notifier.emit(ReplicaChange::Upserted { id });
                    }
                }
            }
            (TargetMode::Merged, Some(replica)) => {
                for (id, doc) in dump.documents {
                    if replica.put(id.clone(), doc) {
                        self.notifier.emit(ReplicaChange::Upserted { id });
                    }
                }
            }
            _ => {}
        }

        debug!("{}: dump applied at sequence {:?}", self.view, self.sequence);
        self.notifier.emit(ReplicaChange::Reloaded { sequence: self.sequence });
    }

    /// Apply a change message without observing individual events
    pub fn apply(&mut self, message: &ChangeMessage) -> SyncResult<()> {
        self.apply_changes(message, &mut |_: &ChangeEvent| {})
    }

    /// Apply a change message; `observer` sees every event applied.
    ///
    /// Arrays are applied in order and stop at the first sequence error.
    pub fn apply_changes<F>(&mut self, message: &ChangeMessage, observer: &mut F) -> SyncResult<()>
    where
        F: FnMut(&ChangeEvent),
    {
        match message {
            ChangeMessage::Many(items) => {
                for item in items {
                    self.apply_changes(item, observer)?;
                }
                Ok(())
            }
            ChangeMessage::Event(event) => self.apply_event(event, observer),
        }
    }

    pub fn apply_event<F>(&mut self, event: &ChangeEvent, observer: &mut F) -> SyncResult<()>
    where
        F: FnMut(&ChangeEvent),
    {
        // The coordinator schedules the re-dump.
        if event.is_establish() {
            return Ok(());
        }

        let Some(seq) = event.seq else {
            return Ok(());
        };

        if let SequenceCheck::Duplicate = self.check_sequence(seq)? {
            debug!("{}: skipping duplicate delivery of sequence {}", self.view, seq);
            return Ok(());
        }
        self.sequence = Some(seq);

        match &event.batch {
            Some(batch) => {
                for inner in batch {
                    self.apply_change(inner, observer);
                }
            }
            None => self.apply_change(event, observer),
        }

        Ok(())
    }

    fn check_sequence(&self, seq: u64) -> SyncResult<SequenceCheck> {
        match self.sequence {
            None if self.replica.is_none() => Ok(SequenceCheck::Next),
            Some(current) if current.checked_add(1) == Some(seq) => Ok(SequenceCheck::Next),
            Some(current) if current == seq => Ok(SequenceCheck::Duplicate),
            current => Err(SyncError::Sequence { view: self.view.clone(), received: seq, current }),
        }
    }

    fn apply_change<F>(&mut self, change: &ChangeEvent, observer: &mut F)
    where
        F: FnMut(&ChangeEvent),
    {
        let Some(id) = change.id.as_deref().filter(|id| !id.is_empty()) else {
            return;
        };

        if let Some(replica) = self.replica.as_mut() {
            trace!("{}: {:?} {}.{:?}[{:?}]", self.view, change.kind, id, change.prop, change.idx);
            if let Some(outcome) = mutate(replica, id, change) {
                self.notifier.emit(outcome);
            }
        }

        observer(change);
    }
}

/// Apply one change to the replica, returning what happened to the document
fn mutate(replica: &mut Replica, id: &str, change: &ChangeEvent) -> Option<ReplicaChange> {
    let kind = change.kind?;
    let prop = change.prop.as_deref()?;

    match kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let value = change.value();
            match replica.get_mut(id) {
                Some(doc) => match change.idx {
                    None => {
                        doc.insert(prop.to_string(), value);
                    }
                    Some(idx) if kind == ChangeKind::Insert => edit_sequence(doc, prop, |items| {
                        items.insert(idx.min(items.len()), value);
                    }),
                    Some(idx) => edit_sequence(doc, prop, |items| {
                        if idx >= items.len() {
                            items.resize(idx + 1, Value::Null);
                        }
                        items[idx] = value;
                    }),
                },
                None => {
                    let initial = match change.idx {
                        None => value,
                        Some(_) => Value::Array(vec![value]),
                    };
                    let mut doc = Document::new();
                    doc.insert(prop.to_string(), initial);
                    replica.put(id.to_string(), doc);
                }
            }
            Some(ReplicaChange::Upserted { id: id.to_string() })
        }
        ChangeKind::Delete => {
            let doc = replica.get_mut(id)?;
            match change.idx {
                None => {
                    doc.remove(prop)?;
                }
                Some(idx) => {
                    let Some(Value::Array(items)) = doc.get_mut(prop) else {
                        return None;
                    };
                    if idx >= items.len() {
                        return None;
                    }
                    items.remove(idx);
                    if items.is_empty() {
                        doc.remove(prop);
                    }
                }
            }

            if doc.is_empty() {
                replica.remove(id);
                Some(ReplicaChange::Removed { id: id.to_string() })
            } else {
                Some(ReplicaChange::Upserted { id: id.to_string() })
            }
        }
        ChangeKind::Establish | ChangeKind::Unknown => None,
    }
}

/// Run `edit` on a sequence-valued property, creating it if absent
fn edit_sequence(doc: &mut Document, prop: &str, edit: impl FnOnce(&mut Vec<Value>)) {
    let mut items = match doc.remove(prop) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(scalar) => vec![scalar],
    };
    edit(&mut items);
    doc.insert(prop.to_string(), Value::Array(items));
}
