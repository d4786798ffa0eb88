use std::path::PathBuf;

use quire_store::StoreError;
use quire_types::{EntryId, TypeError};
use thiserror::Error;

use crate::association::AssociationKind;

/// Schema and configuration errors.
///
/// These surface when a mapper or a configuration is built, never while a
/// query runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("association {association} on {mapper} has no target")]
    MissingTarget { mapper: String, association: String },

    #[error("association {association} on {mapper} targets unknown content type {target}")]
    UnknownTarget {
        mapper: String,
        association: String,
        target: EntryId,
    },

    #[error("association {association} on {mapper}: a {kind} association cannot use this target")]
    TargetMismatch {
        mapper: String,
        association: String,
        kind: AssociationKind,
    },

    #[error("has_many association {association} on {mapper} needs an inverse_of")]
    MissingInverse { mapper: String, association: String },

    #[error("association {association} declared twice on {mapper}")]
    DuplicateAssociation { mapper: String, association: String },

    #[error("invalid time zone offset: {0}")]
    InvalidTimeZone(String),

    #[error("cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors from mapping and repository operations.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid content type {id}: {reason}")]
    InvalidContentType { id: String, reason: String },

    #[error("invalid date for {field}: {value}")]
    InvalidDate { field: String, value: String },

    #[error("invalid date-time for {field}: {value}")]
    InvalidDateTime { field: String, value: String },

    #[error("invalid embedded value for {association}: {reason}")]
    InvalidEmbedded { association: String, reason: String },

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for content operations.
pub type ContentResult<T> = Result<T, ContentError>;
