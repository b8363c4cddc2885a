//! Boolean query shape understood by the document store.
//!
//! Rendered as the store's JSON query language: `{}` matches everything,
//! `{"path": v}` is equality, `{"path": {"$gte": v}}` / `{"path": {"$lte": v}}`
//! are inclusive bounds and `{"$and": [...]}` is conjunction.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All,
    Eq { path: String, value: Value },
    Gte { path: String, value: Value },
    Lte { path: String, value: Value },
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq { path: path.into(), value: value.into() }
    }

    pub fn gte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Gte { path: path.into(), value: value.into() }
    }

    pub fn lte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Lte { path: path.into(), value: value.into() }
    }

    /// Conjunction without redundant wrapping: universal conditions are
    /// dropped, zero conditions give [`Predicate::All`] and a single one is
    /// returned as-is. Order is preserved.
    pub fn all_of(conditions: Vec<Predicate>) -> Self {
        let mut conditions: Vec<Predicate> = conditions.into_iter().filter(|c| !c.is_all()).collect();
        match conditions.len() {
            0 => Predicate::All,
            1 => conditions.remove(0),
            _ => Predicate::And(conditions),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Predicate::All)
    }

    /// Number of leaf conditions.
    pub fn condition_count(&self) -> usize {
        match self {
            Predicate::All => 0,
            Predicate::And(parts) => parts.iter().map(Predicate::condition_count).sum(),
            _ => 1,
        }
    }

    pub fn to_query(&self) -> Value {
        match self {
            Predicate::All => json!({}),
            Predicate::Eq { path, value } => single(path, value.clone()),
            Predicate::Gte { path, value } => single(path, single("$gte", value.clone())),
            Predicate::Lte { path, value } => single(path, single("$lte", value.clone())),
            Predicate::And(parts) => json!({ "$and": parts.iter().map(Predicate::to_query).collect::<Vec<_>>() }),
        }
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_query().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_of_unwraps_and_drops_universal() {
        assert_eq!(Predicate::all_of(vec![]), Predicate::All);
        assert_eq!(Predicate::all_of(vec![Predicate::All, Predicate::All]), Predicate::All);
        let single = Predicate::eq("formId", "f1");
        assert_eq!(Predicate::all_of(vec![Predicate::All, single.clone()]), single);
    }

    #[test]
    fn renders_store_query_shape() {
        let p = Predicate::all_of(vec![
            Predicate::eq("formId", "f1"),
            Predicate::gte("data.age", 18),
            Predicate::lte("data.age", 65),
        ]);
        assert_eq!(
            p.to_query(),
            json!({"$and": [{"formId": "f1"}, {"data.age": {"$gte": 18}}, {"data.age": {"$lte": 65}}]})
        );
        assert_eq!(p.condition_count(), 3);
        assert_eq!(Predicate::All.to_query(), json!({}));
    }
}
