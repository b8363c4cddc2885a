//! Structured half of a search: scope + per-field filters to a store predicate.

use std::collections::BTreeMap;

use serde_json::Value;

use formsearch_core::{FilterDescriptor, Predicate};

/// Compiles `(scope, filters)` into the store's query shape.
///
/// Pure and deterministic: conditions come out in a fixed order (scope first,
/// then fields in name order, lower bound before upper), so the same input
/// always renders to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateCompiler {
    scope_field: String,
    data_prefix: String,
}

impl Default for PredicateCompiler {
    fn default() -> Self {
        Self::new("formId", "data")
    }
}

impl PredicateCompiler {
    pub fn new(scope_field: impl Into<String>, data_prefix: impl Into<String>) -> Self {
        Self { scope_field: scope_field.into(), data_prefix: data_prefix.into() }
    }

    pub fn compile(&self, scope: Option<&str>, filters: &BTreeMap<String, FilterDescriptor>) -> Predicate {
        let mut conditions = Vec::with_capacity(filters.len() + 1);
        if let Some(scope) = scope.filter(|s| !s.is_empty()) {
            conditions.push(Predicate::eq(self.scope_field.as_str(), scope));
        }
        for (field, descriptor) in filters {
            self.push_field(&mut conditions, field, descriptor);
        }
        Predicate::all_of(conditions)
    }

    fn push_field(&self, out: &mut Vec<Predicate>, field: &str, descriptor: &FilterDescriptor) {
        match descriptor {
            FilterDescriptor::Range { min, max } => {
                if let Some(min) = min.as_ref().filter(|v| !is_blank(v)) {
                    out.push(Predicate::gte(self.path(field), min.clone()));
                }
                if let Some(max) = max.as_ref().filter(|v| !is_blank(v)) {
                    out.push(Predicate::lte(self.path(field), max.clone()));
                }
            }
            FilterDescriptor::Value(value) if !is_blank(value) => {
                out.push(Predicate::eq(self.path(field), value.clone()));
            }
            FilterDescriptor::Value(_) | FilterDescriptor::Absent => {}
        }
    }

    fn path(&self, field: &str) -> String {
        if self.data_prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", self.data_prefix, field)
        }
    }
}

// Descriptors built in code bypass the wire normalization.
fn is_blank(value: &Value) -> bool {
    value.is_null() || value.as_str() == Some("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(pairs: &[(&str, FilterDescriptor)]) -> BTreeMap<String, FilterDescriptor> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn empty_input_is_universal() {
        let compiler = PredicateCompiler::default();
        assert_eq!(compiler.compile(None, &BTreeMap::new()), Predicate::All);
        assert_eq!(compiler.compile(Some(""), &BTreeMap::new()), Predicate::All);
    }

    #[test]
    fn single_condition_is_not_wrapped() {
        let compiler = PredicateCompiler::default();
        assert_eq!(compiler.compile(Some("f1"), &BTreeMap::new()).to_query(), json!({"formId": "f1"}));

        let only = filters(&[("status", FilterDescriptor::value("open"))]);
        assert_eq!(compiler.compile(None, &only).to_query(), json!({"data.status": "open"}));
    }

    #[test]
    fn blank_and_absent_descriptors_emit_nothing() {
        let compiler = PredicateCompiler::default();
        let f = filters(&[
            ("a", FilterDescriptor::Absent),
            ("b", FilterDescriptor::value("")),
            ("c", FilterDescriptor::Value(Value::Null)),
            ("d", FilterDescriptor::range(None, None)),
            ("e", FilterDescriptor::range(Some(json!("")), Some(Value::Null))),
            ("f", FilterDescriptor::range(Some(Value::Null), None)),
            ("g", FilterDescriptor::range(None, Some(json!("")))),
        ]);
        assert_eq!(compiler.compile(None, &f), Predicate::All);
    }

    #[test]
    fn blank_bound_leaves_the_other_bound() {
        let compiler = PredicateCompiler::default();
        let f = filters(&[("age", FilterDescriptor::range(Some(json!("")), Some(json!(65))))]);
        assert_eq!(compiler.compile(None, &f).to_query(), json!({"data.age": {"$lte": 65}}));
    }

    #[test]
    fn custom_fields_are_honoured() {
        let compiler = PredicateCompiler::new("ownerId", "");
        let f = filters(&[("age", FilterDescriptor::at_least(18))]);
        assert_eq!(
            compiler.compile(Some("o-9"), &f).to_query(),
            json!({"$and": [{"ownerId": "o-9"}, {"age": {"$gte": 18}}]})
        );
    }
}
