//! Repository configuration.
//!
//! Loaded from TOML; every key is optional:
//!
//! ```toml
//! entries_collection = "content_entries"
//! content_types_collection = "content_types"
//! time_zone = "+02:00"
//!
//! [site]
//! site_id = 1
//! default_locale = "en"
//! locales = ["en", "fr"]
//! ```

use std::path::Path;

use chrono::FixedOffset;
use quire_types::{EntryId, Locale};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scope::Scope;

/// Settings shared by every repository built from one configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Collection holding content entries.
    pub entries_collection: String,
    /// Collection holding content type definitions.
    pub content_types_collection: String,
    /// Site time zone as a UTC offset (`"+02:00"`, `"-0500"`, `"UTC"`).
    pub time_zone: String,
    pub site: SiteConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            entries_collection: "content_entries".to_string(),
            content_types_collection: "content_types".to_string(),
            time_zone: "+00:00".to_string(),
            site: SiteConfig::default(),
        }
    }
}

/// The site a repository serves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub site_id: Option<EntryId>,
    pub default_locale: Locale,
    pub locales: Vec<Locale>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_id: None,
            default_locale: Locale::from("en"),
            locales: vec![Locale::from("en")],
        }
    }
}

impl RepositoryConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.time_zone_offset()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn time_zone_offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_offset(&self.time_zone)
            .ok_or_else(|| ConfigError::InvalidTimeZone(self.time_zone.clone()))
    }

    /// The scope for this site, rendering in `locale` (the default locale
    /// when `None`). The default locale is always part of the site locales.
    pub fn scope(&self, locale: Option<Locale>) -> Scope {
        let site = &self.site;
        let mut locales = site.locales.clone();
        if !locales.contains(&site.default_locale) {
            locales.insert(0, site.default_locale.clone());
        }
        Scope {
            site_id: site.site_id.clone(),
            locale: locale.unwrap_or_else(|| site.default_locale.clone()),
            default_locale: site.default_locale.clone(),
            locales,
        }
    }
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("utc") || text == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match *text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
