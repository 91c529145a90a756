//! Arguments passed to a step function.

use anyhow::Context as _;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::record::Record;

/// The resolved arguments of one step invocation.
///
/// Contains the declared fields found in the incoming record plus the
/// step's bound arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Arguments {
    step: String,
    values: Record,
}

impl Arguments {
    /// Creates arguments for the named step.
    pub fn new(step: impl Into<String>, values: Record) -> Self {
        Self {
            step: step.into(),
            values,
        }
    }

    /// Returns the name of the step being invoked.
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Deserializes an argument.
    ///
    /// Fails if the argument is absent or has an incompatible type.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .values
            .get(name)
            .with_context(|| format!("step '{}' has no argument '{name}'", self.step))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("argument '{name}' of step '{}' has an unexpected type", self.step))
    }

    /// Deserializes an optional argument.
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get(name).map(Some),
        }
    }

    /// Returns the raw value of an argument.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns true if the argument is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains(name)
    }

    /// Returns the number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the arguments as a record.
    pub fn as_record(&self) -> &Record {
        &self.values
    }

    /// Consumes the arguments and returns them as a record.
    pub fn into_record(self) -> Record {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn typed_access() {
        let args = Arguments::new("s", record! { "x" => 3, "label" => "a" });

        let x: i64 = args.get("x").unwrap();
        assert_eq!(x, 3);
        let label: String = args.get("label").unwrap();
        assert_eq!(label, "a");
    }

    #[test]
    fn type_mismatch_is_reported() {
        let args = Arguments::new("s", record! { "x" => "three" });
        let error = args.get::<i64>("x").unwrap_err();
        assert!(error.to_string().contains("unexpected type"));
    }

    #[test]
    fn optional_access() {
        let args = Arguments::new("s", record! { "x" => serde_json::Value::Null });
        assert_eq!(args.get_opt::<i64>("x").unwrap(), None);
        assert_eq!(args.get_opt::<i64>("y").unwrap(), None);
        assert!(args.get::<i64>("y").is_err());
    }
}
