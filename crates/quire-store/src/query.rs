//! Query model shared by every adapter.
//!
//! Conditions are keyed by `field` or `field.op`. The operator suffix is
//! parsed with [`ConditionKey`] so callers can rename the field (for
//! instance `person.in` to `person_id.in`) and keep the operator intact.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use quire_types::{EntryId, Locale, Record, Value};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Operators and keys
// ---------------------------------------------------------------------------

/// Comparison applied by one condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Exists,
}

impl Operator {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "in" => Self::In,
            "nin" => Self::Nin,
            "exists" => Self::Exists,
            _ => return None,
        })
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Exists => "exists",
        }
    }

    /// Operators whose expected value is a list.
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }

    /// Evaluate this operator against a (possibly absent) record value.
    pub fn evaluate(&self, actual: Option<&Value>, expected: &Value) -> bool {
        let actual = actual.filter(|v| !v.is_null());
        match self {
            Self::Eq => equals(actual, expected),
            Self::Ne => !equals(actual, expected),
            Self::Gt => ordered(actual, expected, |o| o == Ordering::Greater),
            Self::Gte => ordered(actual, expected, |o| o != Ordering::Less),
            Self::Lt => ordered(actual, expected, |o| o == Ordering::Less),
            Self::Lte => ordered(actual, expected, |o| o != Ordering::Greater),
            Self::In => included(actual, expected),
            Self::Nin => !included(actual, expected),
            Self::Exists => actual.is_some() == expected.as_bool().unwrap_or(true),
        }
    }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) | (Some(_), Value::Null) => false,
        // an id list matches when it holds every expected id
        (Some(Value::Array(items)), Value::Array(wanted)) if !wanted.is_empty() => wanted
            .iter()
            .all(|w| items.iter().any(|item| same_value(item, w))),
        (Some(Value::Array(items)), Value::Array(_)) => items.is_empty(),
        (Some(Value::Array(items)), _) => items.iter().any(|item| same_value(item, expected)),
        (Some(value), _) => same_value(value, expected),
    }
}

fn ordered(actual: Option<&Value>, expected: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        Some(Value::Array(_)) | None => false,
        Some(value) => compare_values(value, expected).is_some_and(accept),
    }
}

fn included(actual: Option<&Value>, expected: &Value) -> bool {
    let candidates: &[Value] = match expected {
        Value::Array(list) => list,
        other => std::slice::from_ref(other),
    };
    match actual {
        None => candidates.iter().any(Value::is_null),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| candidates.iter().any(|c| same_value(item, c))),
        Some(value) => candidates.iter().any(|c| same_value(value, c)),
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Compare two raw values of the same kind.
///
/// Numbers compare numerically, strings lexicographically, booleans with
/// `false < true`. Values of different kinds are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// A condition key split into its field name and optional operator suffix.
///
/// The suffix is kept exactly as written, so `title.eq` stays `title.eq`
/// after the field is renamed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConditionKey {
    pub field: String,
    pub suffix: Option<Operator>,
}

impl ConditionKey {
    pub fn new(field: impl Into<String>, suffix: Option<Operator>) -> Self {
        Self {
            field: field.into(),
            suffix,
        }
    }

    /// Split `field.op`. Unknown suffixes are part of the field name.
    pub fn parse(key: &str) -> Self {
        if let Some((field, suffix)) = key.rsplit_once('.') {
            if let Some(op) = Operator::from_suffix(suffix) {
                return Self::new(field, Some(op));
            }
        }
        Self::new(key, None)
    }

    pub fn operator(&self) -> Operator {
        self.suffix.unwrap_or(Operator::Eq)
    }

    /// The same operator applied to another field.
    pub fn with_field(&self, field: impl Into<String>) -> Self {
        Self::new(field, self.suffix)
    }
}

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.suffix {
            Some(op) => write!(f, "{}.{}", self.field, op.suffix()),
            None => f.write_str(&self.field),
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Persisted conditions: condition key to expected raw value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(BTreeMap<String, Value>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when every condition holds for the record.
    ///
    /// Locale-map values (`{"en": .., "fr": ..}`) are compared by their
    /// entry for `locale` when one is given.
    pub fn matches(&self, record: &Record, locale: Option<&Locale>) -> bool {
        self.0.iter().all(|(key, expected)| {
            let key = ConditionKey::parse(key);
            let actual = record
                .get(&key.field)
                .and_then(|value| localized(value, locale));
            key.operator().evaluate(actual, expected)
        })
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Conditions {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for Conditions {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn localized<'a>(value: &'a Value, locale: Option<&Locale>) -> Option<&'a Value> {
    match (value, locale) {
        (Value::Object(map), Some(locale)) => map.get(locale.as_str()),
        _ => Some(value),
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Asc),
            "desc" | "descending" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// Ordered list of sort keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderBy(Vec<(String, Direction)>);

impl OrderBy {
    /// Sort by a single field.
    pub fn by(field: impl Into<String>, direction: Direction) -> Self {
        Self(vec![(field.into(), direction)])
    }

    /// Ascending by `_position`, the default order of content entries.
    pub fn position() -> Self {
        Self::by("_position", Direction::Asc)
    }

    /// Append a tie-breaking sort key.
    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.0.push((field.into(), direction));
        self
    }

    /// Parse `"title desc, _position"`. Fields without a direction sort
    /// ascending; an empty string gives an empty order.
    pub fn parse_str(s: &str) -> Self {
        let keys = s
            .split(',')
            .filter_map(|part| {
                let mut words = part.split_whitespace();
                let field = words.next()?;
                let direction = words.next().and_then(Direction::parse).unwrap_or_default();
                Some((field.to_string(), direction))
            })
            .collect();
        Self(keys)
    }

    /// Parse an order from a raw value: a string (see [`OrderBy::parse_str`])
    /// or an object mapping field names to directions.
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::parse_str(s)),
            Value::Object(map) => Some(Self(
                map.iter()
                    .map(|(field, dir)| {
                        let direction = dir.as_str().and_then(Direction::parse).unwrap_or_default();
                        (field.clone(), direction)
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    pub fn keys(&self) -> &[(String, Direction)] {
        &self.0
    }

    pub fn first(&self) -> Option<(&str, Direction)> {
        self.0.first().map(|(f, d)| (f.as_str(), *d))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The same keys with every direction flipped.
    pub fn reversed(&self) -> Self {
        Self(self.0.iter().map(|(f, d)| (f.clone(), d.reverse())).collect())
    }

    /// Compare two records. Absent or null values sort first ascending.
    pub fn compare(&self, a: &Record, b: &Record, locale: Option<&Locale>) -> Ordering {
        for (field, direction) in &self.0 {
            let left = a.get(field).and_then(|v| localized(v, locale)).filter(|v| !v.is_null());
            let right = b.get(field).and_then(|v| localized(v, locale)).filter(|v| !v.is_null());
            let ordering = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
            };
            let ordering = match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, direction)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field} {direction}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Everything an adapter needs to answer a collection read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub conditions: Conditions,
    pub order_by: OrderBy,
    pub offset: usize,
    pub limit: Option<usize>,
    /// Locale used to compare and sort locale-map values.
    pub locale: Option<Locale>,
    /// Records carrying a `site_id` must belong to this site.
    pub site_id: Option<EntryId>,
}

impl Query {
    pub fn new(conditions: Conditions) -> Self {
        Self {
            conditions,
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn with_site(mut self, site_id: Option<EntryId>) -> Self {
        self.site_id = site_id;
        self
    }

    /// The same query without offset and limit.
    pub fn unpaged(mut self) -> Self {
        self.offset = 0;
        self.limit = None;
        self
    }

    /// Returns `true` if the record is in scope and matches every condition.
    pub fn matches(&self, record: &Record) -> bool {
        let in_site = match (&self.site_id, record.get("site_id")) {
            (Some(site), Some(value)) if !value.is_null() => {
                EntryId::from_value(value).as_ref() == Some(site)
            }
            _ => true,
        };
        in_site && self.conditions.matches(record, self.locale.as_ref())
    }

    /// Filter, sort (stable) and page a list of records.
    pub fn apply(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut matching: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        if !self.order_by.is_empty() {
            matching.sort_by(|a, b| self.order_by.compare(a, b, self.locale.as_ref()));
        }
        let page = matching.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_types::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    // -----------------------------------------------------------------------
    // Keys
    // -----------------------------------------------------------------------

    #[test]
    fn parse_key_with_and_without_suffix() {
        assert_eq!(
            ConditionKey::parse("person.in"),
            ConditionKey::new("person", Some(Operator::In))
        );
        assert_eq!(ConditionKey::parse("title"), ConditionKey::new("title", None));
        assert_eq!(ConditionKey::parse("seo.title"), ConditionKey::new("seo.title", None));
    }

    #[test]
    fn renamed_key_keeps_suffix() {
        let key = ConditionKey::parse("person.ne").with_field("person_id");
        assert_eq!(key.to_string(), "person_id.ne");
        assert_eq!(ConditionKey::parse("title.eq").to_string(), "title.eq");
    }

    // -----------------------------------------------------------------------
    // Matching
    // -----------------------------------------------------------------------

    #[test]
    fn eq_and_ne() {
        let r = record(json!({ "title": "Hello", "count": 2 }));
        assert!(Conditions::new().with("title", "Hello").matches(&r, None));
        assert!(Conditions::new().with("count", 2.0).matches(&r, None));
        assert!(!Conditions::new().with("title.ne", "Hello").matches(&r, None));
    }

    #[test]
    fn null_tests_absence() {
        let r = record(json!({ "author_id": null }));
        assert!(Conditions::new().with("author_id", Value::Null).matches(&r, None));
        assert!(Conditions::new().with("missing", Value::Null).matches(&r, None));
        assert!(!Conditions::new().with("author_id.ne", Value::Null).matches(&r, None));
    }

    #[test]
    fn comparisons() {
        let r = record(json!({ "_position": 2 }));
        assert!(Conditions::new().with("_position.gt", 1).matches(&r, None));
        assert!(Conditions::new().with("_position.gte", 2).matches(&r, None));
        assert!(!Conditions::new().with("_position.lt", 2).matches(&r, None));
        assert!(Conditions::new().with("_position.lte", 2).matches(&r, None));
        assert!(!Conditions::new().with("missing.gt", 0).matches(&r, None));
    }

    #[test]
    fn in_against_scalars_and_arrays() {
        let scalar = record(json!({ "_id": "b" }));
        let list = record(json!({ "tag_ids": [1, 2] }));
        assert!(Conditions::new().with("_id.in", json!(["a", "b"])).matches(&scalar, None));
        assert!(!Conditions::new().with("_id.nin", json!(["a", "b"])).matches(&scalar, None));
        assert!(Conditions::new().with("tag_ids.in", json!([2, 3])).matches(&list, None));
        assert!(!Conditions::new().with("tag_ids.in", json!([3])).matches(&list, None));
        assert!(Conditions::new().with("tag_ids", 1).matches(&list, None));
    }

    #[test]
    fn eq_against_arrays_requires_every_expected_element() {
        let list = record(json!({ "tag_ids": ["rust", "cms"] }));
        let empty = record(json!({ "tag_ids": [] }));
        assert!(Conditions::new().with("tag_ids", json!(["rust"])).matches(&list, None));
        assert!(Conditions::new().with("tag_ids", json!(["cms", "rust"])).matches(&list, None));
        assert!(!Conditions::new().with("tag_ids", json!(["rust", "go"])).matches(&list, None));
        assert!(!Conditions::new().with("tag_ids.ne", json!(["rust"])).matches(&list, None));
        assert!(Conditions::new().with("tag_ids.ne", json!(["go"])).matches(&list, None));
        assert!(Conditions::new().with("tag_ids", json!([])).matches(&empty, None));
        assert!(!Conditions::new().with("tag_ids", json!([])).matches(&list, None));
    }

    #[test]
    fn exists() {
        let r = record(json!({ "a": 1, "b": null }));
        assert!(Conditions::new().with("a.exists", true).matches(&r, None));
        assert!(Conditions::new().with("b.exists", false).matches(&r, None));
    }

    #[test]
    fn locale_maps_compare_in_query_locale() {
        let r = record(json!({ "_slug": { "en": "hello", "fr": "bonjour" } }));
        let fr = Locale::from("fr");
        assert!(Conditions::new().with("_slug", "bonjour").matches(&r, Some(&fr)));
        assert!(!Conditions::new().with("_slug", "hello").matches(&r, Some(&fr)));
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn parse_order_from_string_and_object() {
        assert_eq!(
            OrderBy::parse_str("title desc, _position"),
            OrderBy::by("title", Direction::Desc).then("_position", Direction::Asc)
        );
        assert_eq!(
            OrderBy::parse(&json!({ "_position": "desc" })),
            Some(OrderBy::by("_position", Direction::Desc))
        );
        assert_eq!(OrderBy::parse(&json!(3)), None);
        assert_eq!(OrderBy::position().to_string(), "_position asc");
    }

    #[test]
    fn absent_values_sort_first() {
        let query = Query::default().with_order(OrderBy::by("rank", Direction::Asc));
        let sorted = query.apply(vec![
            record(json!({ "n": "b", "rank": 2 })),
            record(json!({ "n": "none" })),
            record(json!({ "n": "a", "rank": 1 })),
        ]);
        let names: Vec<_> = sorted.iter().map(|r| r.get("n").unwrap().clone()).collect();
        assert_eq!(names, vec![json!("none"), json!("a"), json!("b")]);
    }

    #[test]
    fn sort_is_stable_and_reversible() {
        let records = vec![
            record(json!({ "n": 1, "group": "x" })),
            record(json!({ "n": 2, "group": "x" })),
            record(json!({ "n": 3, "group": "a" })),
        ];
        let asc = Query::default().with_order(OrderBy::by("group", Direction::Asc));
        let ns: Vec<_> = asc.apply(records.clone()).iter().map(|r| r.get("n").cloned()).collect();
        assert_eq!(ns, vec![Some(json!(3)), Some(json!(1)), Some(json!(2))]);

        let desc = Query::default().with_order(OrderBy::by("group", Direction::Asc).reversed());
        let ns: Vec<_> = desc.apply(records).iter().map(|r| r.get("n").cloned()).collect();
        assert_eq!(ns, vec![Some(json!(1)), Some(json!(2)), Some(json!(3))]);
    }

    // -----------------------------------------------------------------------
    // Paging and scope
    // -----------------------------------------------------------------------

    #[test]
    fn offset_and_limit() {
        let records: Vec<_> = (0..5).map(|i| record(json!({ "_position": i }))).collect();
        let page = Query::default().with_offset(1).with_limit(2).apply(records);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].get("_position"), Some(&json!(1)));
    }

    #[test]
    fn site_scope_filters_foreign_records() {
        let query = Query::default().with_site(Some(EntryId::from(1)));
        assert!(query.matches(&record(json!({ "site_id": 1 }))));
        assert!(!query.matches(&record(json!({ "site_id": 2 }))));
        assert!(query.matches(&record(json!({ "title": "unscoped" }))));
    }
}
