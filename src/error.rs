use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Filename has {tokens} underscore-delimited fields, at least 7 are required: {key}")]
    Unparseable { key: String, tokens: usize },

    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("No template item with reference geometry for segment {segment}: {reason}")]
    MissingTemplate { segment: String, reason: String },

    #[error("Catalog id does not match a known relocation pattern: {0}")]
    UnresolvedRelocationKey(String),

    #[error("Item link of catalog {catalog} cannot be relocated: {href}")]
    UnrelocatableItemLink { catalog: String, href: String },

    #[error("Validation failed for {id}: {reason}")]
    Validation { id: String, reason: String },

    #[error("Invalid href: {0}")]
    InvalidHref(#[from] url::ParseError),

    #[error("STAC error: {0}")]
    Stac(#[from] stac::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl CatalogError {
    pub(crate) fn validation(id: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
