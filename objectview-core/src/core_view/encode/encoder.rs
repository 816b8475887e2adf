/*
    encoder.rs - Field values to commands

    encode_set:  every mapped field present in the values becomes one command
                 per element (sequences) or one command (scalars). Absent
                 fields are skipped, not cleared.

    encode_diff: minimal commands turning `old` into `new`. Both states are
                 encoded, old commands for properties `new` does not mention
                 are dropped, then a sorted merge-join on (property, args):
                    only in new  -> emit
                    only in old  -> emit with null value (retraction)
                    in both      -> emit new only if the value changed
*/

use super::command::{compare_values, Command};
use super::field_map::FieldMap;
use crate::core_view::model::Document;
use crate::errors::EncodingError;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Commands produced for one document, ready to commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub commands: Vec<Command>,
}

impl ChangeSet {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Commands that set every mapped field present in `values`
pub fn encode_set(field_map: &FieldMap, id: &str, values: &Document) -> Result<Vec<Command>, EncodingError> {
    let mut commands = Vec::new();

    for (name, accessor) in field_map.iter() {
        let Some(field) = values.get(name) else {
            continue;
        };

        let elements: Vec<&Value> = match field {
            Value::Array(items) => items.iter().collect(),
            scalar => vec![scalar],
        };

        let last = accessor.descriptors.len().saturating_sub(1);
        for element in elements {
            let mut command = Command::new(accessor.property.clone(), Vec::new(), Value::Null);
            for (i, descriptor) in accessor.descriptors.iter().enumerate() {
                let resolved = descriptor.resolve(name, id, element)?;
                if i < last {
                    command.args.push(resolved);
                } else {
                    command.value = resolved;
                }
            }
            commands.push(command);
        }
    }

    Ok(commands)
}

/// Minimal commands moving a document from `old_values` to `new_values`.
///
/// With no old state this is [`encode_set`].
pub fn encode_diff(
    field_map: &FieldMap,
    id: &str,
    new_values: &Document,
    old_values: Option<&Document>,
) -> Result<Vec<Command>, EncodingError> {
    let Some(old_values) = old_values else {
        return encode_set(field_map, id, new_values);
    };

    let mut news = encode_set(field_map, id, new_values)?;
    let mut olds = encode_set(field_map, id, old_values)?;

    // Fields missing from the new values are left alone.
    let mentioned: HashSet<&str> = field_map
        .iter()
        .filter(|(name, _)| new_values.contains_key(name.as_str()))
        .map(|(_, accessor)| accessor.property.as_str())
        .collect();
    olds.retain(|command| mentioned.contains(command.property.as_str()));

    news.sort_by(Command::cmp_full);
    olds.sort_by(Command::cmp_full);

    Ok(merge_diff(news, olds))
}

fn merge_diff(news: Vec<Command>, olds: Vec<Command>) -> Vec<Command> {
    let mut result = Vec::new();
    let mut news = news.into_iter().peekable();
    let mut olds = olds.into_iter().peekable();

    loop {
        let order = match (news.peek(), olds.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(n), Some(o)) => n.cmp_key(o),
        };

        match order {
            Ordering::Less => result.extend(news.next()),
            Ordering::Greater => result.extend(olds.next().map(Command::retraction)),
            Ordering::Equal => {
                if let (Some(new), Some(old)) = (news.next(), olds.next()) {
                    if compare_values(&new.value, &old.value) != Ordering::Equal {
                        result.push(new);
                    }
                }
            }
        }
    }

    result
}

/// Copy the mapped fields of `values`.
///
/// Object values read through subfield descriptors keep only those
/// subfields; everything else is copied whole.
pub fn copy_fields(field_map: &FieldMap, values: &Document) -> Document {
    let mut result = Document::new();

    for (name, accessor) in field_map.iter() {
        let Some(source) = values.get(name) else {
            continue;
        };

        let subfields: Vec<&str> = accessor.subfields().collect();
        let copy_value = |value: &Value| -> Value {
            if subfields.is_empty() {
                return value.clone();
            }
            let mut picked = serde_json::Map::new();
            for sub in &subfields {
                let field = value.get(*sub).cloned().unwrap_or(Value::Null);
                picked.insert((*sub).to_string(), field);
            }
            Value::Object(picked)
        };

        let copied = match source {
            Value::Array(items) => Value::Array(items.iter().map(copy_value).collect()),
            scalar => copy_value(scalar),
        };
        result.insert(name.clone(), copied);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_view::encode::field_map::{Accessor, ArgDescriptor};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn tag_map() -> FieldMap {
        serde_json::from_value(json!({
            "name": ["Name", [2], [3]],
            "groups": ["Member", [2], [3], [1]],
            "position": ["Position", [2], [4, "x"], [4, "y"]]
        }))
        .unwrap()
    }

    #[test]
    fn test_value_only_accessor() {
        let map = FieldMap::new().with_field("name", Accessor::new("Name", vec![ArgDescriptor::Value]));
        let commands = encode_set(&map, "obj1", &doc(json!({"name": "Bob"}))).unwrap();
        assert_eq!(commands, vec![Command::new("Name", vec![], json!("Bob"))]);
    }

    #[test]
    fn test_set_sequence_field() {
        let commands = encode_set(&tag_map(), "t1", &doc(json!({"groups": ["a", "b"]}))).unwrap();
        assert_eq!(
            commands,
            vec![
                Command::new("Member", vec![json!("t1"), json!("a")], json!(true)),
                Command::new("Member", vec![json!("t1"), json!("b")], json!(true)),
            ]
        );
    }

    #[test]
    fn test_set_skips_absent_fields() {
        let commands = encode_set(&tag_map(), "t1", &doc(json!({"unmapped": 1}))).unwrap();
        assert!(commands.is_empty());
    }

    #[test]
    fn test_set_subfield_of_scalar_fails() {
        let err = encode_set(&tag_map(), "t1", &doc(json!({"position": 4}))).unwrap_err();
        assert!(matches!(err, EncodingError::SubfieldOfScalar { .. }));
    }

    #[test]
    fn test_diff_unchanged_is_empty() {
        let values = doc(json!({"name": "Bob", "groups": ["a", "b"], "position": {"x": 1, "y": 2}}));
        let commands = encode_diff(&tag_map(), "t1", &values, Some(&values)).unwrap();
        assert!(commands.is_empty());
    }

    #[test]
    fn test_diff_numeric_representation_is_unchanged() {
        let old = doc(json!({"name": 1, "position": {"x": 1, "y": 2}}));
        let new = doc(json!({"name": 1.0, "position": {"x": 1.0, "y": 2}}));
        let commands = encode_diff(&tag_map(), "t1", &new, Some(&old)).unwrap();
        assert!(commands.is_empty(), "{:?}", commands);

        let changed = doc(json!({"name": 1.5}));
        let commands = encode_diff(&tag_map(), "t1", &changed, Some(&old)).unwrap();
        assert_eq!(commands, vec![Command::new("Name", vec![json!("t1")], json!(1.5))]);
    }

    #[test]
    fn test_diff_without_old_is_set() {
        let values = doc(json!({"name": "Bob", "groups": ["a"]}));
        let diff = encode_diff(&tag_map(), "t1", &values, None).unwrap();
        let set = encode_set(&tag_map(), "t1", &values).unwrap();
        assert_eq!(diff, set);
    }

    #[test]
    fn test_diff_changed_scalar() {
        let old = doc(json!({"name": "Bob"}));
        let new = doc(json!({"name": "Alice"}));
        let commands = encode_diff(&tag_map(), "t1", &new, Some(&old)).unwrap();
        assert_eq!(commands, vec![Command::new("Name", vec![json!("t1")], json!("Alice"))]);
    }

    #[test]
    fn test_diff_sequence_add_and_retract() {
        let old = doc(json!({"groups": ["a", "b"]}));
        let new = doc(json!({"groups": ["b", "c"]}));
        let commands = encode_diff(&tag_map(), "t1", &new, Some(&old)).unwrap();
        assert_eq!(
            commands,
            vec![
                Command::new("Member", vec![json!("t1"), json!("a")], Value::Null),
                Command::new("Member", vec![json!("t1"), json!("c")], json!(true)),
            ]
        );
    }

    #[test]
    fn test_diff_leaves_unmentioned_fields() {
        let old = doc(json!({"name": "Bob", "groups": ["a"]}));
        let new = doc(json!({"name": "Bob"}));
        let commands = encode_diff(&tag_map(), "t1", &new, Some(&old)).unwrap();
        assert!(commands.is_empty());
    }

    #[test]
    fn test_diff_empty_sequence_retracts_all() {
        let old = doc(json!({"groups": ["a", "b"]}));
        let new = doc(json!({"groups": []}));
        let commands = encode_diff(&tag_map(), "t1", &new, Some(&old)).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(Command::is_retraction));
    }

    #[test]
    fn test_diff_null_clears_scalar() {
        let old = doc(json!({"name": "Bob"}));
        let new = doc(json!({"name": null}));
        let commands = encode_diff(&tag_map(), "t1", &new, Some(&old)).unwrap();
        assert_eq!(commands, vec![Command::new("Name", vec![json!("t1")], Value::Null)]);
    }

    #[test]
    fn test_copy_fields() {
        let values = doc(json!({
            "name": "Bob",
            "position": {"x": 1, "y": 2, "z": 3},
            "groups": ["a"],
            "unmapped": true
        }));
        let copied = copy_fields(&tag_map(), &values);
        assert_eq!(
            Value::Object(copied),
            json!({"name": "Bob", "position": {"x": 1, "y": 2}, "groups": ["a"]})
        );
    }

    #[test]
    fn test_copy_fields_sequence_of_objects() {
        let map: FieldMap = serde_json::from_value(json!({
            "points": ["Point", [2], [4, "x"]]
        }))
        .unwrap();
        let copied = copy_fields(&map, &doc(json!({"points": [{"x": 1, "q": 0}, {"x": 2}]})));
        assert_eq!(Value::Object(copied), json!({"points": [{"x": 1}, {"x": 2}]}));
    }
}
