//! Category augmentation.
//!
//! Runs once after every article row is written. Each type CSV gains one
//! `datacategorygroup.<group>` column per category group, filled from the
//! article's persisted metadata. The rewritten file is verified before it
//! replaces the original, so an interrupted run leaves the old file intact.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument};

use wisdom_shared::{CategoryGroup, Result, WisdomError};
use wisdom_storage::{CsvRow, CsvTable, ExportLayout, TypeLayout, read_table, replace_table};

use crate::stage::{StageOptions, run_stage};

/// Outcome of augmenting one CSV file.
#[derive(Debug, Clone)]
pub struct AugmentedFile {
    pub path: PathBuf,
    pub rows: usize,
    pub columns_added: usize,
}

/// Augment every type CSV of `layout`, one stage task per file.
#[instrument(skip_all, fields(groups = groups.len()))]
pub async fn augment_exports(
    layout: Arc<ExportLayout>,
    groups: Arc<Vec<CategoryGroup>>,
    id_column: &str,
    opts: StageOptions,
) -> Result<Vec<AugmentedFile>> {
    let prefixes: Vec<String> = layout
        .type_layouts()
        .map(|t| t.key_prefix().to_string())
        .collect();
    let id_column: Arc<str> = Arc::from(id_column);

    let files = run_stage("augment", prefixes, opts, move |prefix| {
        let layout = layout.clone();
        let groups = groups.clone();
        let id_column = id_column.clone();
        async move {
            let type_layout = layout.type_layout(&prefix).ok_or_else(|| {
                WisdomError::validation(format!("no layout for key prefix '{prefix}'"))
            })?;
            augment_file(&layout, type_layout, &groups, &id_column)
        }
    })
    .await?;

    info!(files = files.len(), "augmentation finished");
    Ok(files)
}

/// Append one column per category group to a type CSV.
///
/// A missing id column or a row without persisted metadata is fatal.
pub fn augment_file(
    layout: &ExportLayout,
    type_layout: &TypeLayout,
    groups: &[CategoryGroup],
    id_column: &str,
) -> Result<AugmentedFile> {
    let path = type_layout.csv_path();
    let table = read_table(path)?;

    let id_index = table.column(id_column).ok_or_else(|| {
        WisdomError::validation(format!(
            "{}: no '{id_column}' column to join metadata on",
            path.display()
        ))
    })?;

    let mut header = table.header.clone();
    header.extend(groups.iter().map(CategoryGroup::column_name));

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let article_id = row.cells().get(id_index).map(String::as_str).unwrap_or_default();
        let metadata = layout.read_metadata(article_id)?;

        let mut cells = row.cells().to_vec();
        cells.extend(groups.iter().map(|g| metadata.categories_in(&g.name)));
        rows.push(CsvRow::new(cells));
    }

    let augmented = CsvTable { header, rows };
    replace_table(path, &augmented)?;

    info!(
        path = %path.display(),
        rows = augmented.rows.len(),
        columns = augmented.header.len(),
        "CSV augmented"
    );

    Ok(AugmentedFile {
        path: path.to_path_buf(),
        rows: augmented.rows.len(),
        columns_added: groups.len(),
    })
}
