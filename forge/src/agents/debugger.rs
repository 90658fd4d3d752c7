//! Debug agent: diagnose why validation failed.

use serde::Deserialize;

use crate::llm::Schema;

/// Structured diagnosis of a validation failure.
#[derive(Clone, Debug, Deserialize)]
pub struct Diagnosis {
    pub diagnosis: String,
    #[serde(default)]
    pub likely_cause: String,
}

pub fn schema() -> Schema {
    Schema::new("diagnosis")
        .string("diagnosis")
        .optional_string("likely_cause")
}

pub fn prompt(task: &str, code: &str, failure_output: &str) -> String {
    format!(
        "The generated code failed validation. Diagnose the failure.\n\n\
         TASK: {}\n\nCODE:\n{}\n\nVALIDATOR OUTPUT:\n{}",
        task, code, failure_output
    )
}

/// Manual fallback: the whole answer is the diagnosis.
pub fn parse_fallback(text: &str) -> Diagnosis {
    Diagnosis {
        diagnosis: text.trim().to_string(),
        likely_cause: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_accepts_diagnosis_object() {
        let v = json!({"diagnosis": "loop bound is off by one", "likely_cause": "range end"});
        assert!(schema().validate(&v).is_ok());
    }

    #[test]
    fn fallback_wraps_free_text() {
        let d = parse_fallback("  the index overflows  ");
        assert_eq!(d.diagnosis, "the index overflows");
    }
}
