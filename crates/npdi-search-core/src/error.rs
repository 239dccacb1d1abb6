//! Error types for npdi-search

use thiserror::Error;

use crate::domain::search::EntityCategory;

/// Result type alias using npdi-search's Error
pub type Result<T> = std::result::Result<T, Error>;

/// npdi-search error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Search errors (E001-E099)
    #[error("No search categories configured. Register at least one officer, unit or agency client.")]
    NoCategoriesConfigured,

    #[error("Category '{category}' unavailable: {reason}")]
    CategoryUnavailable {
        category: EntityCategory,
        reason: String,
    },

    #[error("Category '{0}' has more than one search client registered.")]
    DuplicateCategory(EntityCategory),

    #[error("Unknown category '{0}'. Valid categories: officer, unit, agency.")]
    UnknownCategory(String),

    // Config errors (E600-E699)
    #[error("Cache capacity must be at least 1. Set it with `npdi-search config set search.cache_capacity 50`.")]
    InvalidCacheCapacity,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dataset could not be parsed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a category failure from any displayable cause
    pub fn category_unavailable(category: EntityCategory, reason: impl Into<String>) -> Self {
        Self::CategoryUnavailable {
            category,
            reason: reason.into(),
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCategoriesConfigured => "E001",
            Self::CategoryUnavailable { .. } => "E002",
            Self::DuplicateCategory(_) => "E003",
            Self::UnknownCategory(_) => "E004",
            Self::InvalidCacheCapacity => "E600",
            Self::ConfigError(_) => "E601",
            Self::InvalidInput(_) => "E800",
            Self::Json(_) => "E801",
            Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NoCategoriesConfigured => {
                Some("Register clients with SearchOrchestrator::builder().client(..)".to_string())
            }
            Self::InvalidCacheCapacity => {
                Some("npdi-search config set search.cache_capacity 50".to_string())
            }
            Self::UnknownCategory(_) => {
                Some("npdi-search config set search.category_precedence officer,unit,agency".to_string())
            }
            Self::ConfigError(_) | Self::InvalidInput(_) => {
                Some("npdi-search config list".to_string())
            }
            Self::Json(_) => Some(
                "A dataset is a JSON array of records with id, category and label".to_string(),
            ),
            _ => None,
        }
    }
}
