//! Declared step parameters and their resolution against record fields.

use serde::{Deserialize, Serialize};

use super::Arguments;
use crate::error::{FlowError, FlowResult};
use crate::record::Record;

/// The fields a step reads from incoming records.
///
/// Declared once when the step is built, so resolving arguments for a
/// record is a plain lookup per declared name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Fields that must be present in the incoming record.
    pub required: Vec<String>,
    /// Fields passed to the step when present.
    pub optional: Vec<String>,
    /// Whether the step receives every visible field.
    pub variadic: bool,
}

impl Signature {
    /// Creates an empty signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds required fields.
    pub fn with_required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_unique(&mut self.required, fields);
        self
    }

    /// Adds optional fields.
    pub fn with_optional<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_unique(&mut self.optional, fields);
        self
    }

    /// Makes the step receive every visible field.
    pub fn with_variadic(mut self, variadic: bool) -> Self {
        self.variadic = variadic;
        self
    }

    /// Returns true if the field is declared, either required or optional.
    pub fn declares(&self, field: &str) -> bool {
        self.required.iter().any(|f| f == field) || self.optional.iter().any(|f| f == field)
    }

    /// Resolves the arguments for one invocation.
    ///
    /// Bound arguments are always passed and are not looked up in `fields`.
    pub(crate) fn resolve(
        &self,
        step: &str,
        fields: &Record,
        bound: &Record,
    ) -> FlowResult<Arguments> {
        let mut values = if self.variadic {
            fields.clone()
        } else {
            Record::new()
        };

        for field in &self.required {
            if bound.contains(field) {
                continue;
            }
            match fields.get(field) {
                Some(value) => {
                    values.insert(field.clone(), value.clone());
                }
                None => return Err(FlowError::missing_field(step, field, fields.clone())),
            }
        }

        for field in &self.optional {
            if let Some(value) = fields.get(field) {
                values.insert(field.clone(), value.clone());
            }
        }

        values.merge(bound);
        Ok(Arguments::new(step, values))
    }
}

fn extend_unique<I, S>(target: &mut Vec<String>, fields: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for field in fields {
        let field = field.into();
        if !target.contains(&field) {
            target.push(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::record;

    #[test]
    fn resolves_declared_fields_only() {
        let signature = Signature::new()
            .with_required(["x"])
            .with_optional(["y", "z"]);
        let fields = record! { "x" => 1, "y" => 2, "w" => 4 };

        let args = signature.resolve("s", &fields, &Record::new()).unwrap();
        assert_eq!(args.value("x"), Some(&json!(1)));
        assert_eq!(args.value("y"), Some(&json!(2)));
        assert!(args.value("z").is_none());
        assert!(args.value("w").is_none());
    }

    #[test]
    fn missing_required_field_fails() {
        let signature = Signature::new().with_required(["metric"]);
        let error = signature
            .resolve("judge", &record! { "x" => 1 }, &Record::new())
            .unwrap_err();

        match error {
            FlowError::MissingField { step, field, record } => {
                assert_eq!(step, "judge");
                assert_eq!(field, "metric");
                assert_eq!(record, record! { "x" => 1 });
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bound_arguments_satisfy_and_override() {
        let signature = Signature::new().with_required(["x", "threshold"]);
        let fields = record! { "x" => 1, "threshold" => 0.1 };
        let bound = record! { "threshold" => 0.9 };

        let args = signature.resolve("s", &fields, &bound).unwrap();
        assert_eq!(args.value("threshold"), Some(&json!(0.9)));

        let args = signature
            .resolve("s", &record! { "x" => 1 }, &bound)
            .unwrap();
        assert_eq!(args.value("threshold"), Some(&json!(0.9)));
    }

    #[test]
    fn variadic_receives_all_fields() {
        let signature = Signature::new().with_variadic(true);
        let fields = record! { "a" => 1, "b" => 2 };

        let args = signature.resolve("s", &fields, &Record::new()).unwrap();
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn duplicate_declarations_are_ignored() {
        let signature = Signature::new().with_required(["x", "x"]).with_optional(["y"]);
        assert_eq!(signature.required, ["x"]);
        assert!(signature.declares("y"));
        assert!(!signature.declares("z"));
    }
}
