//! Localized attribute values.
//!
//! A localized attribute is persisted as a locale map
//! (`{"en": "Hello", "fr": "Bonjour"}`). Reading never falls back to
//! another locale; callers choose their own fallback.

use std::collections::BTreeMap;

use quire_types::{Locale, Map, Record, Value};

/// The translations of one attribute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalizedValue {
    name: String,
    translations: BTreeMap<Locale, Value>,
}

impl LocalizedValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            translations: BTreeMap::new(),
        }
    }

    /// Wrap a persisted value. A locale map is taken as is, a scalar is
    /// read as the translation for `scalar_locale`, null or absent gives
    /// no translation.
    pub fn from_persisted(
        name: impl Into<String>,
        raw: Option<&Value>,
        scalar_locale: &Locale,
    ) -> Self {
        let mut value = Self::new(name);
        match raw {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => value.write_all(map),
            Some(scalar) => value.write(scalar_locale.clone(), scalar.clone()),
        }
        value
    }

    /// The same translations under another attribute name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            translations: self.translations.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The translation for `locale`. Null translations read as unset.
    pub fn read(&self, locale: &str) -> Option<&Value> {
        self.translations.get(locale).filter(|v| !v.is_null())
    }

    pub fn read_str(&self, locale: &str) -> Option<&str> {
        self.read(locale).and_then(Value::as_str)
    }

    pub fn write(&mut self, locale: impl Into<Locale>, value: impl Into<Value>) {
        self.translations.insert(locale.into(), value.into());
    }

    /// Replace every translation with the entries of a locale map.
    pub fn write_all(&mut self, map: &Map<String, Value>) {
        self.translations = map
            .iter()
            .map(|(locale, value)| (Locale::from(locale.as_str()), value.clone()))
            .collect();
    }

    pub fn translations(&self) -> &BTreeMap<Locale, Value> {
        &self.translations
    }

    pub fn locales(&self) -> impl Iterator<Item = &Locale> {
        self.translations.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }

    /// The persisted locale map.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.translations
                .iter()
                .map(|(locale, value)| (locale.to_string(), value.clone()))
                .collect(),
        )
    }

    /// Write the locale map into `target` under `attribute_name`.
    pub fn serialize(&self, target: &mut Record, attribute_name: &str) {
        target.insert(attribute_name, self.to_value());
    }
}
