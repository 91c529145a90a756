//! Results of a flow run.

use serde::{Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use super::Lineage;
use crate::error::FlowError;
use crate::record::Record;

/// A record that failed, with its lineage up to the failure point.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    lineage: Lineage,
    #[serde(serialize_with = "serialize_error")]
    error: FlowError,
}

fn serialize_error<S: Serializer>(error: &FlowError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

impl Failure {
    pub(crate) fn new(lineage: Lineage, error: FlowError) -> Self {
        Self { lineage, error }
    }

    /// Returns the lineage of the record that reached the failing step.
    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    /// Returns the error.
    pub fn error(&self) -> &FlowError {
        &self.error
    }

    /// Returns the name of the failing step.
    pub fn step(&self) -> Option<&str> {
        self.error.step()
    }

    /// Returns the position of the originating record among the run inputs.
    pub fn input_index(&self) -> usize {
        self.lineage.input_index()
    }
}

/// The lineage-complete result of a run.
///
/// Finalized lineages are grouped by path index, the position of the path
/// in [`Flow::paths`](crate::Flow::paths); within a path they are ordered by
/// input then emission.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    run_id: Uuid,
    paths: Vec<Vec<String>>,
    outputs: Vec<Vec<Lineage>>,
    failures: Vec<Failure>,
}

impl RunResult {
    pub(crate) fn new(
        run_id: Uuid,
        paths: Vec<Vec<String>>,
        outputs: Vec<Vec<Lineage>>,
        failures: Vec<Failure>,
    ) -> Self {
        Self {
            run_id,
            paths,
            outputs,
            failures,
        }
    }

    /// Returns the identifier of the run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns every path through the flow.
    pub fn paths(&self) -> &[Vec<String>] {
        &self.paths
    }

    /// Returns the finalized lineages of the given path.
    ///
    /// Empty if the path index is out of range.
    pub fn outputs(&self, path: usize) -> &[Lineage] {
        self.outputs.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns every finalized lineage, in path order.
    pub fn lineages(&self) -> impl Iterator<Item = &Lineage> {
        self.outputs.iter().flatten()
    }

    /// Returns every finalized lineage in its flat record form.
    pub fn records(&self) -> Vec<Record> {
        self.lineages().map(Lineage::to_record).collect()
    }

    /// Returns the failed records.
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Returns true if no record failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the number of finalized lineages.
    pub fn len(&self) -> usize {
        self.outputs.iter().map(Vec::len).sum()
    }

    /// Returns true if no lineage was finalized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens the finalized lineages into a table.
    ///
    /// Columns are named `<step>.<field>` and start with the input fields;
    /// cells of steps absent from a row's path are null.
    pub fn to_table(&self) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for lineage in self.lineages() {
            for (step, record) in lineage.entries() {
                for field in record.fields() {
                    let column = format!("{step}.{field}");
                    if !columns.contains(&column) {
                        columns.push(column);
                    }
                }
            }
        }

        let rows = self
            .lineages()
            .map(|lineage| {
                let entries = lineage.entries();
                columns
                    .iter()
                    .map(|column| {
                        entries
                            .iter()
                            .find_map(|(step, record)| {
                                let field = column.strip_prefix(step)?.strip_prefix('.')?;
                                record.get(field).cloned()
                            })
                            .unwrap_or(Value::Null)
                    })
                    .collect()
            })
            .collect();

        Table { columns, rows }
    }
}

/// A tabular view of a run result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the rows; each row has one cell per column.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Returns the cells of the named column.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.columns.iter().position(|column| column == name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
