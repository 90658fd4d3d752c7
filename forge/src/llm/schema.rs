//! Caller-supplied output schemas for structured decoding.
//!
//! A `Schema` is an object shape: named fields with a kind, optional value
//! constraints, and a required flag. It validates a decoded
//! `serde_json::Value` and renders a prompt hint describing the expected
//! object.

use serde_json::Value;

#[derive(Clone, Debug)]
pub enum FieldKind {
    /// Free string, or one of `allowed` when given.
    String { allowed: Option<Vec<String>> },
    /// Number within the optional inclusive range.
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
}

#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Clone, Debug)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn string(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::String { allowed: None },
            required: true,
        });
        self
    }

    pub fn optional_string(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::String { allowed: None },
            required: false,
        });
        self
    }

    pub fn one_of(mut self, name: impl Into<String>, allowed: &[&str]) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::String {
                allowed: Some(allowed.iter().map(|s| s.to_string()).collect()),
            },
            required: true,
        });
        self
    }

    pub fn number(mut self, name: impl Into<String>, min: f64, max: f64) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Number {
                min: Some(min),
                max: Some(max),
            },
            required: true,
        });
        self
    }

    pub fn boolean(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Boolean,
            required: true,
        });
        self
    }

    /// Validates a decoded value against this shape. The error string names
    /// the first offending field.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let obj = value
            .as_object()
            .ok_or_else(|| format!("{}: expected a JSON object", self.name))?;
        for field in &self.fields {
            let entry = match obj.get(&field.name) {
                Some(v) if !v.is_null() => v,
                _ if field.required => {
                    return Err(format!("{}: missing required field '{}'", self.name, field.name))
                }
                _ => continue,
            };
            match &field.kind {
                FieldKind::String { allowed } => {
                    let s = entry.as_str().ok_or_else(|| {
                        format!("{}: field '{}' must be a string", self.name, field.name)
                    })?;
                    if let Some(allowed) = allowed {
                        if !allowed.iter().any(|a| a == s) {
                            return Err(format!(
                                "{}: field '{}' must be one of {:?}, got '{}'",
                                self.name, field.name, allowed, s
                            ));
                        }
                    }
                }
                FieldKind::Number { min, max } => {
                    let n = entry.as_f64().ok_or_else(|| {
                        format!("{}: field '{}' must be a number", self.name, field.name)
                    })?;
                    if min.map_or(false, |m| n < m) || max.map_or(false, |m| n > m) {
                        return Err(format!(
                            "{}: field '{}' out of range: {}",
                            self.name, field.name, n
                        ));
                    }
                }
                FieldKind::Boolean => {
                    if !entry.is_boolean() {
                        return Err(format!(
                            "{}: field '{}' must be a boolean",
                            self.name, field.name
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// One-line prompt hint describing the expected object.
    pub fn prompt_hint(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                let kind = match &f.kind {
                    FieldKind::String { allowed: Some(a) } => a.join("|"),
                    FieldKind::String { allowed: None } => "string".to_string(),
                    FieldKind::Number { min, max } => match (min, max) {
                        (Some(min), Some(max)) => format!("number {}-{}", min, max),
                        _ => "number".to_string(),
                    },
                    FieldKind::Boolean => "true|false".to_string(),
                };
                format!("\"{}\": {}", f.name, kind)
            })
            .collect();
        format!("Respond with exactly one JSON object: {{{}}}", fields.join(", "))
    }
}
