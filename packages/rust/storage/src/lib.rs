//! On-disk layout of an export.
//!
//! ```text
//! <root>/
//! ├── export.json
//! ├── metadata/<articleId>.json
//! └── <Type>/
//!     ├── <Type>.csv
//!     ├── <Type>v.properties
//!     ├── html/<articleId>-<uuid>.html
//!     └── images/<basename>
//! ```
//!
//! [`ExportLayout`] owns every path in the tree. Rows for one article type are
//! appended under that type's own async mutex, so concurrent article tasks
//! never interleave partial records in the same file.

mod csv_table;

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use wisdom_shared::{
    ArticleDetail, ArticleMetadata, ArticleType, ExportManifest, Result, WisdomError,
    is_record_id,
};

pub use csv_table::{CsvRow, CsvTable, read_table, replace_table};

/// Name of the shared metadata directory under the export root.
pub const METADATA_DIR: &str = "metadata";

/// Name of the export summary file.
pub const MANIFEST_FILE: &str = "export.json";

// ---------------------------------------------------------------------------
// ExportLayout
// ---------------------------------------------------------------------------

/// Handle on the export tree, with one [`TypeLayout`] per article type.
#[derive(Debug)]
pub struct ExportLayout {
    root: PathBuf,
    metadata_dir: PathBuf,
    /// Keyed by article type key prefix.
    types: BTreeMap<String, TypeLayout>,
}

impl ExportLayout {
    /// Create (or reset) the export tree for `types`.
    ///
    /// Existing directories are reused. Each CSV is rewritten with just its
    /// header, so a re-run starts from a clean file.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn create<'a>(root: &Path, types: impl IntoIterator<Item = &'a ArticleType>) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| WisdomError::io(root, e))?;

        let metadata_dir = root.join(METADATA_DIR);
        ensure_dir(&metadata_dir)?;

        let mut layouts = BTreeMap::new();
        for ty in types {
            let layout = TypeLayout::ensure(root, ty)?;
            layouts.insert(ty.key_prefix.clone(), layout);
        }

        info!(types = layouts.len(), "export layout ready");

        Ok(Self {
            root: root.to_path_buf(),
            metadata_dir,
            types: layouts,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Layout for the type with `key_prefix`.
    pub fn type_layout(&self, key_prefix: &str) -> Option<&TypeLayout> {
        self.types.get(key_prefix)
    }

    /// All type layouts, ordered by key prefix.
    pub fn type_layouts(&self) -> impl Iterator<Item = &TypeLayout> {
        self.types.values()
    }

    /// Path of the persisted metadata for `article_id`.
    pub fn metadata_path(&self, article_id: &str) -> PathBuf {
        self.metadata_dir.join(format!("{article_id}.json"))
    }

    /// Persist the raw article payload as pretty-printed JSON.
    pub fn write_metadata(&self, detail: &ArticleDetail) -> Result<PathBuf> {
        let path = self.metadata_path(detail.id());
        write_json(&path, detail.raw())?;
        Ok(path)
    }

    /// Load the persisted metadata for `article_id`.
    ///
    /// A missing file, or anything other than a file at its path, is reported
    /// as [`WisdomError::MissingMetadata`].
    pub fn read_metadata(&self, article_id: &str) -> Result<ArticleMetadata> {
        check_record_id(article_id)?;
        let path = self.metadata_path(article_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound || path.is_dir() => {
                return Err(WisdomError::MissingMetadata {
                    article_id: article_id.to_string(),
                    path,
                });
            }
            Err(e) => return Err(WisdomError::io(&path, e)),
        };

        serde_json::from_str(&content).map_err(|e| {
            WisdomError::validation(format!("invalid metadata {}: {e}", path.display()))
        })
    }

    /// Write `export.json` at the root.
    pub fn write_manifest(&self, manifest: &ExportManifest) -> Result<PathBuf> {
        let path = self.root.join(MANIFEST_FILE);
        write_json(&path, manifest)?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// TypeLayout
// ---------------------------------------------------------------------------

/// Directory, CSV and side-file locations of one article type.
#[derive(Debug)]
pub struct TypeLayout {
    key_prefix: String,
    name: String,
    dir: PathBuf,
    csv_path: PathBuf,
    html_dir: PathBuf,
    images_dir: PathBuf,
    header: Vec<String>,
    append_lock: Mutex<()>,
}

impl TypeLayout {
    /// Create the type's directories, properties file and header-only CSV.
    fn ensure(root: &Path, ty: &ArticleType) -> Result<Self> {
        let dir = root.join(&ty.name);
        let html_dir = dir.join("html");
        let images_dir = dir.join("images");
        for d in [&dir, &html_dir, &images_dir] {
            ensure_dir(d)?;
        }

        let properties_path = dir.join(format!("{}.properties", ty.version_object_name()));
        std::fs::write(&properties_path, properties(ty))
            .map_err(|e| WisdomError::io(&properties_path, e))?;

        let header: Vec<String> = ty.fields.iter().map(|f| f.name.clone()).collect();
        let csv_path = dir.join(format!("{}.csv", ty.name));
        let file = std::fs::File::create(&csv_path).map_err(|e| WisdomError::io(&csv_path, e))?;
        csv_table::write_header(file, &header, &csv_path)?;

        debug!(path = %dir.display(), columns = header.len(), "type layout created");

        Ok(Self {
            key_prefix: ty.key_prefix.clone(),
            name: ty.name.clone(),
            dir,
            csv_path,
            html_dir,
            images_dir,
            header,
            append_lock: Mutex::new(()),
        })
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Header captured when the CSV was created.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Append one record to the CSV.
    ///
    /// A row whose width differs from the header is rejected.
    pub async fn append_row(&self, row: &CsvRow) -> Result<()> {
        if row.len() != self.header.len() {
            return Err(WisdomError::validation(format!(
                "{}: row has {} cells, header has {}",
                self.csv_path.display(),
                row.len(),
                self.header.len()
            )));
        }

        let _guard = self.append_lock.lock().await;
        let file = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .map_err(|e| WisdomError::io(&self.csv_path, e))?;
        csv_table::write_rows(file, std::iter::once(row), &self.csv_path)
    }

    /// Write a rich-text value to a uniquely named file under `html/`.
    ///
    /// Returns the path relative to the type directory (`html/<file>`).
    pub fn write_html(&self, article_id: &str, html: &str) -> Result<String> {
        check_record_id(article_id)?;
        let file_name = format!("{article_id}-{}.html", Uuid::now_v7().simple());
        let path = self.html_dir.join(&file_name);
        std::fs::write(&path, html).map_err(|e| WisdomError::io(&path, e))?;
        Ok(format!("html/{file_name}"))
    }

    /// Save image bytes under `images/`.
    pub fn write_image(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.images_dir.join(file_name);
        std::fs::write(&path, bytes).map_err(|e| WisdomError::io(&path, e))?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a directory, treating "already exists" as success.
fn ensure_dir(path: &Path) -> Result<()> {
    match std::fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(WisdomError::io(path, e)),
    }
}

/// Reject ids that would not stay inside the export tree as a file name.
fn check_record_id(article_id: &str) -> Result<()> {
    if is_record_id(article_id) {
        Ok(())
    } else {
        Err(WisdomError::validation(format!(
            "invalid article id {article_id:?}"
        )))
    }
}

/// Import settings file accompanying each type's CSV.
fn properties(ty: &ArticleType) -> String {
    format!(
        "CSVEncoding=UTF-8\n\
         CSVSeparator=,\n\
         DefaultHTMLEncoding=UTF-8\n\
         DateFormat=yyyy-MM-dd\n\
         DateTimeFormat=yyyy-MM-dd HH:mm:ss\n\
         ArticleTypes={}\n",
        ty.version_object_name()
    )
}

/// Write a JSON file (pretty-printed).
fn write_json<T: serde::Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| WisdomError::validation(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| WisdomError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use serde_json::json;
    use wisdom_shared::FieldDescriptor;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("wisdom-storage-test-{}", Uuid::now_v7()))
    }

    fn faq_type() -> ArticleType {
        ArticleType {
            key_prefix: "kA0".into(),
            name: "FAQ__ka".into(),
            fields: vec![
                FieldDescriptor::plain("KnowledgeArticleId"),
                FieldDescriptor::plain("Title"),
                FieldDescriptor::rich_text("Answer__c"),
            ],
        }
    }

    #[test]
    fn create_builds_tree_with_header() {
        let root = temp_dir();
        let ty = faq_type();
        let layout = ExportLayout::create(&root, [&ty]).unwrap();

        let faq = layout.type_layout("kA0").expect("layout registered");
        assert!(root.join("metadata").is_dir());
        assert!(faq.dir().join("html").is_dir());
        assert!(faq.images_dir().is_dir());
        assert_eq!(
            std::fs::read_to_string(faq.csv_path()).unwrap(),
            "KnowledgeArticleId,Title,Answer__c\n"
        );

        let props = std::fs::read_to_string(faq.dir().join("FAQ__kav.properties")).unwrap();
        assert!(props.contains("CSVSeparator=,"));
        assert!(props.contains("ArticleTypes=FAQ__kav"));
        assert!(!faq.dir().join("FAQ__ka.properties").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn create_is_rerunnable() {
        let root = temp_dir();
        let ty = faq_type();
        let layout = ExportLayout::create(&root, [&ty]).unwrap();
        let csv = layout.type_layout("kA0").unwrap().csv_path().to_path_buf();
        std::fs::write(&csv, "stale\n").unwrap();

        let again = ExportLayout::create(&root, [&ty]).unwrap();
        assert_eq!(
            std::fs::read_to_string(again.type_layout("kA0").unwrap().csv_path()).unwrap(),
            "KnowledgeArticleId,Title,Answer__c\n"
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn append_row_checks_width() {
        let root = temp_dir();
        let ty = faq_type();
        let layout = ExportLayout::create(&root, [&ty]).unwrap();
        let faq = layout.type_layout("kA0").unwrap();

        let short = CsvRow::new(vec!["kA0000000000001".into()]);
        assert!(faq.append_row(&short).await.is_err());

        let row = CsvRow::new(vec![
            "kA0000000000001".into(),
            "Hi, \"there\"".into(),
            "html/x.html".into(),
        ]);
        faq.append_row(&row).await.unwrap();

        let table = read_table(faq.csv_path()).unwrap();
        assert_eq!(table.rows, vec![row]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let root = temp_dir();
        let ty = faq_type();
        let layout = Arc::new(ExportLayout::create(&root, [&ty]).unwrap());

        let mut handles = Vec::new();
        for i in 0..32 {
            let layout = layout.clone();
            handles.push(tokio::spawn(async move {
                let row = CsvRow::new(vec![
                    format!("kA0{i:012}"),
                    "x".repeat(4096),
                    format!("html/{i}.html"),
                ]);
                layout.type_layout("kA0").unwrap().append_row(&row).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let table = read_table(layout.type_layout("kA0").unwrap().csv_path()).unwrap();
        assert_eq!(table.rows.len(), 32);
        assert!(table.rows.iter().all(|r| r.len() == 3));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn html_files_never_collide() {
        let root = temp_dir();
        let ty = faq_type();
        let layout = ExportLayout::create(&root, [&ty]).unwrap();
        let faq = layout.type_layout("kA0").unwrap();

        let a = faq.write_html("kA0000000000001", "<p>same</p>").unwrap();
        let b = faq.write_html("kA0000000000001", "<p>same</p>").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("html/kA0000000000001-"));
        assert_eq!(
            std::fs::read_to_string(faq.dir().join(&a)).unwrap(),
            "<p>same</p>"
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn metadata_roundtrip_and_missing() {
        let root = temp_dir();
        let layout = ExportLayout::create(&root, Vec::<&ArticleType>::new()).unwrap();

        let detail = ArticleDetail::from_value(json!({
            "id": "kA0000000000001",
            "categoryGroups": [{"groupName": "Products", "selectedCategories": [{"categoryName": "Widgets"}]}]
        }))
        .unwrap();
        let path = layout.write_metadata(&detail).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("\n  \"id\""));

        let meta = layout.read_metadata("kA0000000000001").unwrap();
        assert_eq!(meta.categories_in("Products"), "Widgets");

        let err = layout.read_metadata("kA0000000000009").unwrap_err();
        assert!(matches!(err, WisdomError::MissingMetadata { .. }));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn metadata_path_taken_by_directory_is_missing() {
        let root = temp_dir();
        let layout = ExportLayout::create(&root, Vec::<&ArticleType>::new()).unwrap();
        std::fs::create_dir(layout.metadata_path("kA0000000000001")).unwrap();

        let err = layout.read_metadata("kA0000000000001").unwrap_err();
        assert!(matches!(err, WisdomError::MissingMetadata { .. }), "{err:?}");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn ids_escaping_the_tree_are_rejected() {
        let root = temp_dir();
        let ty = faq_type();
        let layout = ExportLayout::create(&root, [&ty]).unwrap();
        let faq = layout.type_layout("kA0").unwrap();

        let err = layout.read_metadata("../../etc/passwd").unwrap_err();
        assert!(matches!(err, WisdomError::Validation { .. }), "{err:?}");
        let err = faq.write_html("kA0/../../escape", "<p>x</p>").unwrap_err();
        assert!(matches!(err, WisdomError::Validation { .. }), "{err:?}");
        assert!(!root.join("escape").exists());

        let _ = std::fs::remove_dir_all(&root);
    }
}
