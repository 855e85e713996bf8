//! Turns one fetched article into a CSV row for its type.
//!
//! Every declared field is looked up through an ordered list of sources:
//!
//! 1. the master version record, when one was fetched
//! 2. the top-level fields of the detail payload
//! 3. the detail's `layoutItems`
//! 4. the article id, exposed as `KnowledgeArticleId`
//!
//! Names match case-insensitively and the first source that carries the name
//! wins, even when its value is null. Rich-text values never go into the
//! cell: they are written to an HTML side file and the cell holds the
//! relative path.

use serde_json::{Map, Value};
use tracing::debug;

use wisdom_shared::{ArticleDetail, ArticleType, FieldKind, LayoutItem, Result};
use wisdom_storage::{CsvRow, TypeLayout};

use crate::images::extract_image_urls;

/// Field name under which the article id is always resolvable.
pub const IDENTITY_FIELD: &str = "KnowledgeArticleId";

/// One place a field value can come from.
#[derive(Debug, Clone, Copy)]
pub enum FieldSource<'a> {
    /// A JSON object keyed by field name.
    Flat(&'a Map<String, Value>),
    /// A `layoutItems` list of `{name, type, value}` entries.
    Layout(&'a [LayoutItem]),
}

impl FieldSource<'_> {
    /// Cell text for `name`, if this source carries the field.
    pub fn lookup(&self, name: &str) -> Option<String> {
        match self {
            Self::Flat(map) => map
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| cell_text(value)),
            Self::Layout(items) => items
                .iter()
                .find(|item| item.name.eq_ignore_ascii_case(name))
                .map(|item| cell_text(&item.value)),
        }
    }
}

/// First value for `name` across `sources`, in order.
pub fn resolve_value(sources: &[FieldSource<'_>], name: &str) -> Option<String> {
    sources.iter().find_map(|source| source.lookup(name))
}

/// Text written to a cell for a JSON value.
///
/// Strings are used verbatim, null is empty and anything else is its compact
/// JSON form.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A row ready to append plus what the row pulled in.
#[derive(Debug, Clone)]
pub struct ResolvedArticle {
    pub row: CsvRow,
    /// `<img src>` values found in the article's rich-text fields.
    pub images: Vec<String>,
    /// Fields no source carried; their cells are empty.
    pub missing_fields: Vec<String>,
}

/// Build the row for `detail` in the column order of `ty`.
///
/// Rich-text values are written under `layout`'s `html/` directory here, so
/// the only fallible step is the side-file write.
pub fn resolve_article(
    detail: &ArticleDetail,
    record: Option<&Map<String, Value>>,
    ty: &ArticleType,
    layout: &TypeLayout,
) -> Result<ResolvedArticle> {
    let layout_items = detail.layout_items();
    let mut identity = Map::new();
    identity.insert(IDENTITY_FIELD.into(), Value::String(detail.id().into()));

    let mut sources = Vec::with_capacity(4);
    if let Some(record) = record {
        sources.push(FieldSource::Flat(record));
    }
    sources.push(FieldSource::Flat(detail.fields()));
    sources.push(FieldSource::Layout(&layout_items));
    sources.push(FieldSource::Flat(&identity));

    let mut cells = Vec::with_capacity(ty.fields.len());
    let mut images = Vec::new();
    let mut missing_fields = Vec::new();

    for field in &ty.fields {
        let value = resolve_value(&sources, &field.name);
        if value.is_none() {
            debug!(article_id = detail.id(), field = %field.name, "field not found in any source");
            missing_fields.push(field.name.clone());
        }

        let cell = match (field.kind, value) {
            (FieldKind::RichText, Some(html)) if !html.is_empty() => {
                images.extend(extract_image_urls(&html));
                layout.write_html(detail.id(), &html)?
            }
            (FieldKind::RichText, _) => String::new(),
            (FieldKind::Plain, value) => value.unwrap_or_default(),
        };
        cells.push(cell);
    }

    Ok(ResolvedArticle {
        row: CsvRow::new(cells),
        images,
        missing_fields,
    })
}
