//! Translation of caller criteria into persisted conditions.
//!
//! Field names become persisted keys (`category` to `category_id`,
//! `tags` to `tag_ids`), referenced entries become ids, select option names
//! become option ids and date values are normalized. Operator suffixes are
//! kept across the rename.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use quire_store::{ConditionKey, Conditions, OrderBy};
use quire_types::{Locale, Value};

use crate::content_type::{ContentType, Field, FieldKind};
use crate::criteria::{Criteria, Criterion};
use crate::error::{ContentError, ContentResult};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Translates criteria against one content type.
#[derive(Clone, Copy, Debug)]
pub struct ConditionTranslator<'a> {
    pub content_type: &'a ContentType,
    pub locale: &'a Locale,
    pub time_zone: FixedOffset,
}

impl<'a> ConditionTranslator<'a> {
    pub fn new(content_type: &'a ContentType, locale: &'a Locale, time_zone: FixedOffset) -> Self {
        Self {
            content_type,
            locale,
            time_zone,
        }
    }

    /// Persisted conditions plus the `order_by` criterion, if one was given.
    ///
    /// Visible entries only unless `_visible` is given; `_visible: null`
    /// lifts the restriction. The content type condition is always set.
    pub fn translate(&self, criteria: &Criteria) -> ContentResult<(Conditions, Option<OrderBy>)> {
        let mut conditions = Conditions::new();
        let mut order_by = None;

        match criteria.get("_visible") {
            None => {
                conditions.insert("_visible", true);
            }
            Some(visible) if visible.is_null() => {}
            Some(visible) => {
                conditions.insert("_visible", visible.to_value());
            }
        }

        for (key, criterion) in criteria.iter() {
            match key.as_str() {
                "_visible" | "content_type_id" => continue,
                "order_by" => {
                    order_by = criterion
                        .as_value()
                        .and_then(OrderBy::parse)
                        .filter(|o| !o.is_empty());
                    continue;
                }
                _ => {}
            }

            let parsed = ConditionKey::parse(key);
            let Some(field) = self.content_type.field(&parsed.field) else {
                conditions.insert(key.as_str(), criterion.to_value());
                continue;
            };
            let persisted = parsed.with_field(field.persisted_name()).to_string();

            match field.kind {
                FieldKind::Select => {
                    if let Some(value) = self.select_value(field, criterion) {
                        conditions.insert(persisted, value);
                    }
                }
                FieldKind::Date => {
                    let value = self.convert(field, criterion, &|v| self.date(field, v))?;
                    conditions.insert(persisted, value);
                }
                FieldKind::DateTime => {
                    let value = self.convert(field, criterion, &|v| self.date_time(field, v))?;
                    conditions.insert(persisted, value);
                }
                FieldKind::BelongsTo => {
                    let value = if parsed.operator().takes_list() && !criterion.is_null() {
                        Value::Array(criterion.items().iter().map(Criterion::to_id).collect())
                    } else {
                        criterion.to_id()
                    };
                    conditions.insert(persisted, value);
                }
                FieldKind::ManyToMany => {
                    let value = if criterion.is_null() {
                        Value::Null
                    } else {
                        Value::Array(criterion.items().iter().map(Criterion::to_id).collect())
                    };
                    conditions.insert(persisted, value);
                }
                _ => {
                    conditions.insert(persisted, criterion.to_value());
                }
            }
        }

        conditions.insert("content_type_id", self.content_type.id.to_value());
        Ok((conditions, order_by))
    }

    /// Option id for a name or id; `None` when nothing resolves.
    fn select_value(&self, field: &Field, criterion: &Criterion) -> Option<Value> {
        if criterion.is_null() {
            return Some(Value::Null);
        }
        let resolve = |c: &Criterion| {
            let value = c.to_value();
            field.select_option(&value, self.locale).map(|o| o.id.to_value())
        };
        if criterion.is_list() {
            let ids: Vec<Value> = criterion.items().iter().filter_map(resolve).collect();
            return (!ids.is_empty()).then_some(Value::Array(ids));
        }
        resolve(criterion)
    }

    fn convert(
        &self,
        field: &Field,
        criterion: &Criterion,
        parse: &dyn Fn(&Value) -> ContentResult<Value>,
    ) -> ContentResult<Value> {
        match criterion {
            Criterion::Value(Value::Null) => Ok(Value::Null),
            Criterion::Value(Value::Array(_)) | Criterion::List(_) => criterion
                .items()
                .iter()
                .map(|item| self.convert(field, item, parse))
                .collect::<ContentResult<Vec<_>>>()
                .map(Value::Array),
            Criterion::Value(value) => parse(value),
            Criterion::Entry(_) => parse(&criterion.to_value()),
        }
    }

    fn date(&self, field: &Field, value: &Value) -> ContentResult<Value> {
        value
            .as_str()
            .and_then(parse_date)
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| ContentError::InvalidDate {
                field: field.name.clone(),
                value: display(value),
            })
    }

    fn date_time(&self, field: &Field, value: &Value) -> ContentResult<Value> {
        let parsed = match value {
            Value::String(text) => parse_date_time(text, self.time_zone),
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|utc| utc.with_timezone(&self.time_zone)),
            _ => None,
        };
        parsed
            .map(|dt| Value::String(dt.to_rfc3339()))
            .ok_or_else(|| ContentError::InvalidDateTime {
                field: field.name.clone(),
                value: display(value),
            })
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

/// Parse a date-time in `time_zone`. Values carrying their own offset are
/// converted; naive values are read as local time in `time_zone`.
fn parse_date_time(text: &str, time_zone: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&time_zone));
    }
    let naive = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| parse_date(text).and_then(|date| date.and_hms_opt(0, 0, 0)))?;
    time_zone.from_local_datetime(&naive).single()
}
