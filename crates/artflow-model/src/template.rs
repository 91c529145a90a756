//! Text templates with named `{key}` placeholders.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Key(String),
}

/// A format string with named placeholders.
///
/// Placeholders are written `{key}`; `{{` and `}}` produce literal braces.
/// A template declares the keys it requires; formatting fails if a
/// placeholder has no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTemplate {
    format_string: String,
    segments: Vec<Segment>,
    required_keys: Vec<String>,
    ignore_unmatched_attributes: bool,
}

impl TextTemplate {
    /// Parses a template that must contain every required key and may
    /// contain additional ones.
    pub fn new<I, S>(format_string: impl Into<String>, required_keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let format_string = format_string.into();
        let segments = parse(&format_string)?;
        let required_keys: Vec<String> = required_keys.into_iter().map(Into::into).collect();

        let template = Self {
            format_string,
            segments,
            required_keys,
            ignore_unmatched_attributes: false,
        };

        let keys = template.keys();
        let missing: Vec<_> = template
            .required_keys
            .iter()
            .filter(|key| !keys.contains(key.as_str()))
            .map(|key| format!("'{key}'"))
            .collect();
        if !missing.is_empty() {
            return Err(Error::template(format!(
                "Format string is missing required keys: {}",
                missing.join(", ")
            )));
        }

        Ok(template)
    }

    /// Parses a template whose placeholders must be exactly the required keys.
    pub fn strict<I, S>(format_string: impl Into<String>, required_keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let template = Self::new(format_string, required_keys)?;
        let additional: Vec<_> = template
            .keys()
            .into_iter()
            .filter(|key| !template.required_keys.iter().any(|r| r == key))
            .map(|key| format!("'{key}'"))
            .collect();
        if !additional.is_empty() {
            return Err(Error::template(format!(
                "Format string has unexpected keys: {}",
                additional.join(", ")
            )));
        }
        Ok(template)
    }

    /// Accepts attributes that match no placeholder instead of failing.
    pub fn ignore_unmatched_attributes(mut self, ignore: bool) -> Self {
        self.ignore_unmatched_attributes = ignore;
        self
    }

    /// Returns the format string.
    pub fn format_string(&self) -> &str {
        &self.format_string
    }

    /// Returns the placeholder keys, sorted.
    pub fn keys(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Key(key) => Some(key.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Substitutes the attributes into the template.
    ///
    /// String values are inserted as is; other values use their JSON form.
    pub fn format(&self, attributes: &Map<String, Value>) -> Result<String> {
        if !self.ignore_unmatched_attributes {
            let keys = self.keys();
            let unmatched: Vec<_> = attributes
                .keys()
                .filter(|name| !keys.contains(name.as_str()))
                .map(|name| format!("'{name}'"))
                .collect();
            if !unmatched.is_empty() {
                return Err(Error::template(format!(
                    "Attributes do not match any formatting key: {}",
                    unmatched.join(", ")
                )));
            }
        }

        let mut output = String::with_capacity(self.format_string.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Key(key) => match attributes.get(key) {
                    Some(Value::String(value)) => output.push_str(value),
                    Some(value) => output.push_str(&value.to_string()),
                    None => {
                        return Err(Error::template(format!(
                            "No values provided for formatting key: '{key}'"
                        )));
                    }
                },
            }
        }
        Ok(output)
    }
}

fn parse(format_string: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = format_string.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => {
                            return Err(Error::template(format!(
                                "Unmatched '{{' in format string: {format_string:?}"
                            )));
                        }
                        Some(c) => key.push(c),
                    }
                }
                let key = key.trim();
                if key.is_empty() {
                    return Err(Error::template("Empty formatting key in format string"));
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Key(key.to_owned()));
            }
            '}' => {
                return Err(Error::template(format!(
                    "Single '}}' encountered in format string: {format_string:?}"
                )));
            }
            c => text.push(c),
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attributes(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn formats_placeholders_and_escapes() {
        let template = TextTemplate::new("{{{name}}} has {count} turns", ["name"]).unwrap();
        let text = template
            .format(&attributes(json!({ "name": "bot", "count": 3 })))
            .unwrap();
        assert_eq!(text, "{bot} has 3 turns");
    }

    #[test]
    fn missing_required_keys_are_listed() {
        let error = TextTemplate::new("{objective}", ["max_turns", "objective", "success_token"])
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "template error: Format string is missing required keys: 'max_turns', 'success_token'"
        );
    }

    #[test]
    fn missing_values_are_reported() {
        let template = TextTemplate::new("{a} {b}", ["a"]).unwrap();
        let error = template.format(&attributes(json!({ "a": 1 }))).unwrap_err();
        assert!(error.to_string().contains("No values provided for formatting key: 'b'"));
    }

    #[test]
    fn unmatched_attributes_fail_unless_ignored() {
        let template = TextTemplate::new("{a}", ["a"]).unwrap();
        let attrs = attributes(json!({ "a": 1, "extra": 2 }));
        assert!(template.format(&attrs).is_err());

        let template = template.ignore_unmatched_attributes(true);
        assert_eq!(template.format(&attrs).unwrap(), "1");
    }

    #[test]
    fn strict_rejects_additional_keys() {
        assert!(TextTemplate::strict("{a} {b}", ["a"]).is_err());
        assert!(TextTemplate::strict("{a}", ["a"]).is_ok());
    }

    #[test]
    fn malformed_braces_are_rejected() {
        assert!(TextTemplate::new("{a", Vec::<String>::new()).is_err());
        assert!(TextTemplate::new("a}", Vec::<String>::new()).is_err());
        assert!(TextTemplate::new("{}", Vec::<String>::new()).is_err());
    }
}
