//! Caller-facing query criteria.
//!
//! Criteria use human field names and may reference entities directly
//! (`{"author": <entity>}`); the repository translates them into persisted
//! [`Conditions`](quire_store::Conditions).

use std::collections::BTreeMap;
use std::sync::Arc;

use quire_store::Conditions;
use quire_types::{EntryId, Value};

use crate::entity::Entity;

/// One criterion value.
#[derive(Clone, Debug)]
pub enum Criterion {
    Value(Value),
    Entry(Arc<Entity>),
    List(Vec<Criterion>),
}

impl Criterion {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    /// Persisted form: entries become their id, lists convert element-wise.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Entry(entry) => entry.id().map_or(Value::Null, |id| id.to_value()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
        }
    }

    /// Id reference: a bare id as is, an entry or a map holding `_id`
    /// (or `id`) as that id. Lists convert element-wise.
    pub fn to_id(&self) -> Value {
        match self {
            Self::Value(value) => id_of(value),
            Self::Entry(_) => self.to_value(),
            Self::List(items) => Value::Array(items.iter().map(Self::to_id).collect()),
        }
    }

    /// The elements of a list criterion, or the criterion itself.
    pub fn items(&self) -> Vec<Criterion> {
        match self {
            Self::List(items) => items.clone(),
            Self::Value(Value::Array(values)) => values.iter().cloned().map(Self::Value).collect(),
            other => vec![other.clone()],
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_) | Self::Value(Value::Array(_)))
    }
}

fn id_of(value: &Value) -> Value {
    match value {
        Value::Object(map) => map
            .get("_id")
            .or_else(|| map.get("id"))
            .cloned()
            .unwrap_or(Value::Null),
        Value::Array(values) => Value::Array(values.iter().map(id_of).collect()),
        other => other.clone(),
    }
}

impl PartialEq for Criterion {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Entry(a), Self::Entry(b)) => Arc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for Criterion {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Criterion {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for Criterion {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<i64> for Criterion {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i32> for Criterion {
    fn from(value: i32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for Criterion {
    fn from(value: bool) -> Self {
        Self::Value(Value::Bool(value))
    }
}

impl From<EntryId> for Criterion {
    fn from(id: EntryId) -> Self {
        Self::Value(id.to_value())
    }
}

impl From<Arc<Entity>> for Criterion {
    fn from(entry: Arc<Entity>) -> Self {
        Self::Entry(entry)
    }
}

impl From<&Arc<Entity>> for Criterion {
    fn from(entry: &Arc<Entity>) -> Self {
        Self::Entry(Arc::clone(entry))
    }
}

impl<T: Into<Criterion>> From<Vec<T>> for Criterion {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Criteria keyed by `field` or `field.op`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Criteria(BTreeMap<String, Criterion>);

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Criterion>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Criterion>,
    ) -> Option<Criterion> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Criterion> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Criterion> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Criterion)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A copy of `self` with `other` merged in; `other` wins on conflicts.
    pub fn merged(&self, other: &Criteria) -> Criteria {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl From<Conditions> for Criteria {
    fn from(conditions: Conditions) -> Self {
        conditions.into_iter().map(|(k, v)| (k, Criterion::Value(v))).collect()
    }
}

impl<K: Into<String>, V: Into<Criterion>> FromIterator<(K, V)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Criteria {
    type Item = (String, Criterion);
    type IntoIter = std::collections::btree_map::IntoIter<String, Criterion>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_types::json;

    #[test]
    fn ids_from_bare_values_maps_and_lists() {
        assert_eq!(Criterion::from(42).to_id(), json!(42));
        assert_eq!(Criterion::from(json!({ "_id": 42 })).to_id(), json!(42));
        assert_eq!(Criterion::from(json!({ "id": "x" })).to_id(), json!("x"));
        assert_eq!(Criterion::from(json!({ "name": "x" })).to_id(), Value::Null);
        assert_eq!(Criterion::from(vec![json!({ "_id": 1 }), json!(2)]).to_id(), json!([1, 2]));
    }

    #[test]
    fn items_of_scalars_and_lists() {
        assert_eq!(Criterion::from(42).items(), vec![Criterion::from(42)]);
        assert_eq!(
            Criterion::from(json!([1, 2])).items(),
            vec![Criterion::from(1), Criterion::from(2)]
        );
        assert!(Criterion::from(json!([1])).is_list());
        assert!(!Criterion::from(json!(null)).is_list());
    }

    #[test]
    fn merged_leaves_both_sides_untouched() {
        let base = Criteria::new().with("content_type_id", 1).with("author_id", 7);
        let extra = Criteria::new().with("author_id", 8).with("order_by", "title");
        let merged = base.merged(&extra);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("author_id"), Some(&Criterion::from(8)));
        assert_eq!(base.get("author_id"), Some(&Criterion::from(7)));
        assert!(!base.contains_key("order_by"));
    }

    #[test]
    fn from_conditions() {
        let criteria = Criteria::from(Conditions::new().with("title.ne", "x"));
        assert_eq!(criteria.get("title.ne"), Some(&Criterion::from("x")));
    }
}
