//! Documents, replicas and dumps

use crate::errors::{SyncError, SyncResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Unique id of a document within a view
pub type DocumentId = String;

/// Property name to scalar, or to an ordered sequence of scalars
pub type Document = Map<String, Value>;

/// Local copy of the documents of one subscription.
///
/// A document with no properties is never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Replica {
    documents: BTreeMap<DocumentId, Document>,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DocumentId, &Document)> {
        self.documents.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.documents.keys()
    }

    pub fn documents(&self) -> &BTreeMap<DocumentId, Document> {
        &self.documents
    }

    /// Store a document, dropping it instead if it has no properties.
    /// Returns true when the stored state changed.
    pub(crate) fn put(&mut self, id: DocumentId, doc: Document) -> bool {
        if doc.is_empty() {
            return self.documents.remove(&id).is_some();
        }
        if self.documents.get(&id) == Some(&doc) {
            return false;
        }
        self.documents.insert(id, doc);
        true
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Document> {
        self.documents.get_mut(id)
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Document> {
        self.documents.remove(id)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.documents
                .iter()
                .map(|(id, doc)| (id.clone(), Value::Object(doc.clone())))
                .collect(),
        )
    }
}

impl FromIterator<(DocumentId, Document)> for Replica {
    fn from_iter<I: IntoIterator<Item = (DocumentId, Document)>>(iter: I) -> Self {
        let mut replica = Replica::new();
        for (id, doc) in iter {
            replica.put(id, doc);
        }
        replica
    }
}

/// Full contents of a view as sent with a registration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dump {
    /// Sequence number the contents correspond to
    pub sequence: Option<u64>,
    pub documents: BTreeMap<DocumentId, Document>,
}

impl Dump {
    /// Build from the hub's dump object: `{"seq": n, "<id>": {...}, ...}`.
    /// The `seq` entry becomes the baseline and is not a document.
    pub fn from_value(value: Value) -> SyncResult<Self> {
        let Value::Object(mut entries) = value else {
            return Err(SyncError::Decode("dump is not an object".to_string()));
        };

        let sequence = match entries.remove("seq") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .ok_or_else(|| SyncError::Decode(format!("invalid dump sequence {}", n)))?,
            ),
            Some(other) => {
                return Err(SyncError::Decode(format!("invalid dump sequence {}", other)));
            }
        };

        let mut documents = BTreeMap::new();
        for (id, doc) in entries {
            match doc {
                Value::Object(props) if !props.is_empty() => {
                    documents.insert(id, props);
                }
                Value::Object(_) => {}
                other => warn!("Skipping non-object dump entry {}: {}", id, other),
            }
        }

        Ok(Self { sequence, documents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_dump_strips_sequence() {
        let dump = Dump::from_value(json!({"seq": 5, "a": {"x": 1}})).unwrap();
        assert_eq!(dump.sequence, Some(5));
        assert_eq!(dump.documents.len(), 1);
        assert_eq!(dump.documents["a"], doc(json!({"x": 1})));
    }

    #[test]
    fn test_dump_without_sequence() {
        let dump = Dump::from_value(json!({"a": {"x": 1}})).unwrap();
        assert_eq!(dump.sequence, None);
    }

    #[test]
    fn test_dump_rejects_non_object() {
        assert!(Dump::from_value(json!([1, 2])).is_err());
        assert!(Dump::from_value(json!({"seq": "x"})).is_err());
    }

    #[test]
    fn test_dump_skips_empty_documents() {
        let dump = Dump::from_value(json!({"seq": 1, "a": {}, "b": 3, "c": {"y": true}})).unwrap();
        assert_eq!(dump.documents.keys().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_replica_put_drops_empty_document() {
        let mut replica = Replica::new();
        assert!(replica.put("a".to_string(), doc(json!({"x": 1}))));
        assert!(!replica.put("a".to_string(), doc(json!({"x": 1}))));
        assert!(replica.put("a".to_string(), Document::new()));
        assert!(replica.is_empty());
    }

    #[test]
    fn test_replica_to_json() {
        let replica: Replica = vec![("a".to_string(), doc(json!({"x": [1, 2]})))].into_iter().collect();
        assert_eq!(replica.to_json(), json!({"a": {"x": [1, 2]}}));
    }
}
