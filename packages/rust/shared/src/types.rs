//! Core domain types for knowledge article exports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WisdomError};

/// Number of leading id characters that identify an object's type.
pub const KEY_PREFIX_LEN: usize = 3;

/// Describe payloads mark rich-text fields with this `extraTypeInfo`.
pub const RICH_TEXT_TYPE_INFO: &str = "richtextarea";

/// Current schema version for the export manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Whether `id` can name files in the export tree: ASCII alphanumeric and
/// at least [`KEY_PREFIX_LEN`] characters.
pub fn is_record_id(id: &str) -> bool {
    id.len() >= KEY_PREFIX_LEN && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// First [`KEY_PREFIX_LEN`] characters of a record id, if it is long enough.
pub fn key_prefix(id: &str) -> Option<&str> {
    id.get(..KEY_PREFIX_LEN)
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// How a field is rendered into an export row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Value goes into the CSV cell as-is.
    Plain,
    /// Value is HTML written to a side file; the cell holds its path.
    RichText,
}

impl FieldKind {
    /// Classify a describe field by its `extraTypeInfo`.
    pub fn from_type_info(extra_type_info: Option<&str>) -> Self {
        match extra_type_info {
            Some(info) if info.eq_ignore_ascii_case(RICH_TEXT_TYPE_INFO) => Self::RichText,
            _ => Self::Plain,
        }
    }
}

/// One column of an article type's export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Plain,
        }
    }

    pub fn rich_text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::RichText,
        }
    }
}

/// A knowledge article type (one CSV file in the export).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleType {
    /// 3-character id prefix shared by all articles of this type.
    pub key_prefix: String,
    /// Object name, e.g. `FAQ__ka`. Also the export directory name.
    pub name: String,
    /// Ordered fields; this order is the CSV header order.
    pub fields: Vec<FieldDescriptor>,
}

impl ArticleType {
    /// Name of the version object the describe call targets (`FAQ__kav`).
    pub fn version_object_name(&self) -> String {
        format!("{}v", self.name)
    }

    /// Header cells in field order.
    pub fn header(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

/// One entry of a knowledge article listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub id: String,
    /// Path of the detail resource, relative to the instance URL.
    pub url: String,
}

/// A rendered field returned alongside an article's raw values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutItem {
    pub name: String,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// Categories an article is filed under within one data category group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCategoryGroup {
    pub group_name: String,
    #[serde(default)]
    pub selected_categories: Vec<SelectedCategory>,
}

/// A single selected category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCategory {
    pub category_name: String,
}

/// Full article payload as returned by the detail endpoint.
///
/// The raw JSON object is kept untouched so it can be persisted verbatim;
/// typed views are parsed on demand.
#[derive(Debug, Clone)]
pub struct ArticleDetail {
    id: String,
    raw: Map<String, Value>,
}

impl ArticleDetail {
    /// Wrap a detail payload. The payload must be an object whose `id`
    /// passes [`is_record_id`]; the id is later used in file names.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(raw) = value else {
            return Err(WisdomError::parse("article detail is not a JSON object"));
        };

        let id = match raw.get("id") {
            Some(Value::String(id)) if is_record_id(id) => id.clone(),
            Some(other) => {
                return Err(WisdomError::parse(format!(
                    "article detail has an invalid id: {other}"
                )));
            }
            None => return Err(WisdomError::parse("article detail has no id")),
        };

        Ok(Self { id, raw })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Key prefix selecting the article type.
    pub fn key_prefix(&self) -> &str {
        &self.id[..KEY_PREFIX_LEN]
    }

    /// Top-level field mapping.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// The `layoutItems` fallback list. Malformed entries are skipped.
    pub fn layout_items(&self) -> Vec<LayoutItem> {
        match self.raw.get("layoutItems") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Raw payload for persistence.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}

/// The parts of a persisted metadata file that augmentation reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMetadata {
    #[serde(default)]
    pub category_groups: Vec<SelectedCategoryGroup>,
}

impl ArticleMetadata {
    /// `+`-joined category names selected in `group`, or empty.
    pub fn categories_in(&self, group: &str) -> String {
        self.category_groups
            .iter()
            .find(|g| g.group_name == group)
            .map(|g| {
                g.selected_categories
                    .iter()
                    .map(|c| c.category_name.as_str())
                    .collect::<Vec<_>>()
                    .join("+")
            })
            .unwrap_or_default()
    }
}

/// A data category group (one extra CSV column per group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl CategoryGroup {
    /// Column header for this group in augmented CSVs.
    pub fn column_name(&self) -> String {
        format!("datacategorygroup.{}", self.name)
    }
}

// ---------------------------------------------------------------------------
// ExportManifest
// ---------------------------------------------------------------------------

/// The `export.json` summary written at the root of the export tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: u32,
    pub tool_version: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Exported article type names.
    pub article_types: Vec<String>,
    pub articles_discovered: usize,
    pub articles_exported: usize,
    pub articles_failed: usize,
    pub category_groups: Vec<String>,
    pub images_saved: usize,
    pub images_failed: usize,
}
