//! Shared types, error model, and configuration for Wisdom.
//!
//! This crate is the foundation depended on by all other Wisdom crates.
//! It provides:
//! - [`WisdomError`], the unified error type
//! - Domain types ([`ArticleType`], [`ArticleDetail`], [`CategoryGroup`], ...)
//! - Configuration ([`AppConfig`], [`ExportConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, ClientCredentials, DEFAULT_PAGE_LIMIT, ExportConfig, ExportDefaults,
    OAuthConfig, client_credentials, client_credentials_with, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from,
};
pub use error::{Result, WisdomError};
pub use types::{
    ArticleDetail, ArticleMetadata, ArticleSummary, ArticleType, CURRENT_SCHEMA_VERSION,
    CategoryGroup, ExportManifest, FieldDescriptor, FieldKind, KEY_PREFIX_LEN, LayoutItem,
    SelectedCategory, SelectedCategoryGroup, is_record_id, key_prefix,
};
