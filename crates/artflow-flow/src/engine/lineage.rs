//! Recorded derivation path of a record.

use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::INPUT_STEP;
use crate::record::Record;

#[derive(Debug)]
struct LineageNode {
    step: String,
    record: Record,
    parent: Option<Arc<LineageNode>>,
}

/// The records produced along one path, starting at the input.
///
/// Lineages are persistent: extending a lineage shares its prefix with every
/// other lineage derived from it, and recorded entries are never mutated.
#[derive(Debug, Clone)]
pub struct Lineage {
    input_index: usize,
    len: usize,
    head: Arc<LineageNode>,
}

impl Lineage {
    /// Starts a lineage at the given input record.
    pub fn new(input_index: usize, input: Record) -> Self {
        Self {
            input_index,
            len: 1,
            head: Arc::new(LineageNode {
                step: INPUT_STEP.to_owned(),
                record: input,
                parent: None,
            }),
        }
    }

    /// Returns a new lineage with the product of `step` appended.
    pub fn extend(&self, step: impl Into<String>, record: Record) -> Self {
        Self {
            input_index: self.input_index,
            len: self.len + 1,
            head: Arc::new(LineageNode {
                step: step.into(),
                record,
                parent: Some(Arc::clone(&self.head)),
            }),
        }
    }

    /// Returns the position of the originating record among the run inputs.
    pub fn input_index(&self) -> usize {
        self.input_index
    }

    /// Returns the number of entries, including the input.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: a lineage holds at least its input.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the name of the last step, or `input` for a fresh lineage.
    pub fn last_step(&self) -> &str {
        &self.head.step
    }

    /// Returns the last recorded record.
    pub fn last(&self) -> &Record {
        &self.head.record
    }

    /// Returns the original input record.
    pub fn input(&self) -> &Record {
        let mut node = &self.head;
        while let Some(parent) = &node.parent {
            node = parent;
        }
        &node.record
    }

    /// Returns the entries from the input to the last step.
    pub fn entries(&self) -> Vec<(&str, &Record)> {
        let mut entries = Vec::with_capacity(self.len);
        let mut node = Some(&self.head);
        while let Some(current) = node {
            entries.push((current.step.as_str(), &current.record));
            node = current.parent.as_ref();
        }
        entries.reverse();
        entries
    }

    /// Returns the step names from the input to the last step.
    pub fn steps(&self) -> Vec<&str> {
        self.entries().into_iter().map(|(step, _)| step).collect()
    }

    /// Returns the record produced by the named step.
    pub fn get(&self, step: &str) -> Option<&Record> {
        let mut node = Some(&self.head);
        while let Some(current) = node {
            if current.step == step {
                return Some(&current.record);
            }
            node = current.parent.as_ref();
        }
        None
    }

    /// Returns the fields visible to the next step.
    ///
    /// The union of every recorded record; later entries override earlier ones.
    pub fn fields(&self) -> Record {
        let mut fields = Record::new();
        for (_, record) in self.entries() {
            fields.merge(record);
        }
        fields
    }

    /// Returns the input fields at top level with each product nested under
    /// its step name, e.g. `{"x": 3, "double": {"y": 6}}`.
    ///
    /// An input field named like a step is replaced by that step's product.
    /// Use [`to_value`](Self::to_value) for a lossless export.
    pub fn to_record(&self) -> Record {
        let mut entries = self.entries().into_iter();
        let mut record = entries
            .next()
            .map(|(_, input)| input.clone())
            .unwrap_or_default();
        for (step, product) in entries {
            record.insert(step, Value::from(product.clone()));
        }
        record
    }

    /// Returns every entry nested under its step name, e.g.
    /// `{"input": {"x": 3}, "double": {"y": 6}}`.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .entries()
            .into_iter()
            .map(|(step, record)| (step.to_owned(), Value::from(record.clone())))
            .collect();
        Value::Object(map)
    }
}

impl Serialize for Lineage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Lineage", 2)?;
        state.serialize_field("input_index", &self.input_index)?;
        state.serialize_field("entries", &self.to_value())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::record;

    #[test]
    fn fields_are_merged_in_order() {
        let lineage = Lineage::new(0, record! { "x" => 1, "y" => 1 })
            .extend("a", record! { "y" => 2 })
            .extend("b", record! { "z" => 3 });

        assert_eq!(lineage.len(), 3);
        assert_eq!(lineage.steps(), ["input", "a", "b"]);
        assert_eq!(lineage.fields(), record! { "x" => 1, "y" => 2, "z" => 3 });
        assert_eq!(lineage.get("a"), Some(&record! { "y" => 2 }));
        assert_eq!(lineage.input(), &record! { "x" => 1, "y" => 1 });
    }

    #[test]
    fn branches_share_prefix() {
        let root = Lineage::new(4, record! { "x" => 1 });
        let left = root.extend("l", record! { "v" => "left" });
        let right = root.extend("r", record! { "v" => "right" });

        assert!(Arc::ptr_eq(&left.head.parent.clone().unwrap(), &root.head));
        assert_eq!(left.fields().get("v"), Some(&json!("left")));
        assert_eq!(right.fields().get("v"), Some(&json!("right")));
        assert_eq!(right.input_index(), 4);
    }

    #[test]
    fn exports_flat_and_nested_forms() {
        let lineage = Lineage::new(0, record! { "x" => 3 }).extend("double", record! { "y" => 6 });

        assert_eq!(
            Value::from(lineage.to_record()),
            json!({ "x": 3, "double": { "y": 6 } })
        );
        assert_eq!(
            lineage.to_value(),
            json!({ "input": { "x": 3 }, "double": { "y": 6 } })
        );
        assert_eq!(
            serde_json::to_value(&lineage).unwrap(),
            json!({ "input_index": 0, "entries": { "input": { "x": 3 }, "double": { "y": 6 } } })
        );
    }

    #[test]
    fn step_named_like_an_input_field() {
        let lineage =
            Lineage::new(0, record! { "double" => 1 }).extend("double", record! { "y" => 2 });

        assert_eq!(
            Value::from(lineage.to_record()),
            json!({ "double": { "y": 2 } })
        );
        assert_eq!(
            lineage.to_value(),
            json!({ "input": { "double": 1 }, "double": { "y": 2 } })
        );
    }
}
