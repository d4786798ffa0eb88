use quire_types::{EntryId, Locale, Record};

/// Per-request context: the current site and locales.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    pub site_id: Option<EntryId>,
    /// Active locale used for reads, comparisons and URLs.
    pub locale: Locale,
    pub default_locale: Locale,
    /// Every locale the site publishes, default first.
    pub locales: Vec<Locale>,
}

impl Scope {
    /// A single-locale scope without a site.
    pub fn new(locale: impl Into<Locale>) -> Self {
        let locale = locale.into();
        Self {
            site_id: None,
            locale: locale.clone(),
            default_locale: locale.clone(),
            locales: vec![locale],
        }
    }

    pub fn with_site(mut self, site_id: impl Into<EntryId>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    pub fn with_locales<I, L>(mut self, locales: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Locale>,
    {
        self.locales = locales.into_iter().map(Into::into).collect();
        if !self.locales.contains(&self.default_locale) {
            self.locales.insert(0, self.default_locale.clone());
        }
        self
    }

    /// The same scope rendering in another locale.
    pub fn with_locale(&self, locale: impl Into<Locale>) -> Self {
        Self {
            locale: locale.into(),
            ..self.clone()
        }
    }

    pub fn is_default_locale(&self) -> bool {
        self.locale == self.default_locale
    }

    /// Stamp the site onto a record about to be persisted.
    pub fn apply(&self, record: &mut Record) {
        if let Some(site_id) = &self.site_id {
            record.insert("site_id", site_id.to_value());
        }
    }
}
