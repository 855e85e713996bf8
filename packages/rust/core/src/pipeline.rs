//! End-to-end export: types → describe → layout → discovery → articles →
//! augmentation → images → manifest.
//!
//! Each stage drains before the next one starts. The registry and layout are
//! built up front and shared read-only through [`ExportContext`].

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use wisdom_client::ApiClient;
use wisdom_shared::{
    ArticleSummary, CURRENT_SCHEMA_VERSION, ExportConfig, ExportManifest, Result, WisdomError,
};
use wisdom_storage::ExportLayout;

use crate::augment::augment_exports;
use crate::discovery::discover_articles;
use crate::images::{ImageOutcome, ImageRequest, fetch_image, plan_image_requests};
use crate::registry::SchemaRegistry;
use crate::resolver::resolve_article;
use crate::stage::{StageOptions, run_stage};

/// Result of [`run_export`].
#[derive(Debug)]
pub struct ExportResult {
    /// Root of the export tree.
    pub output_root: PathBuf,
    /// What was written to `export.json`.
    pub manifest: ExportManifest,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting export status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once per article, exported or skipped.
    fn article_processed(&self, article_id: &str, current: usize, total: usize);
    /// Called when the export completes.
    fn done(&self, result: &ExportResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn article_processed(&self, _article_id: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &ExportResult) {}
}

/// State shared by every article task.
pub struct ExportContext {
    pub config: ExportConfig,
    pub client: Arc<ApiClient>,
    pub registry: SchemaRegistry,
    pub layout: Arc<ExportLayout>,
    progress: Arc<dyn ProgressReporter>,
    processed: AtomicUsize,
    total: usize,
}

enum ArticleOutcome {
    Exported { key_prefix: String, images: Vec<String> },
    Skipped,
}

impl ExportContext {
    /// Fetch, resolve and write one article.
    ///
    /// A failed detail fetch skips the article. An unregistered type or a
    /// filesystem error is returned and ends the run.
    async fn export_article(&self, summary: ArticleSummary) -> Result<ArticleOutcome> {
        let detail = match self.client.article_detail(&summary).await {
            Ok(detail) => detail,
            Err(e) if e.is_recoverable() => {
                warn!(article_id = %summary.id, error = %e, "article skipped");
                self.tick(&summary.id);
                return Ok(ArticleOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        let ty = self.registry.require(detail.id())?;
        let type_layout = self.layout.type_layout(&ty.key_prefix).ok_or_else(|| {
            WisdomError::validation(format!("no layout for article type {}", ty.name))
        })?;

        let record = if self.config.fetch_master_record {
            match self.client.master_record(detail.id()).await {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(article_id = detail.id(), error = %e, "master record unavailable, using detail payload");
                    None
                }
            }
        } else {
            None
        };

        let resolved = resolve_article(&detail, record.as_ref(), ty, type_layout)?;
        type_layout.append_row(&resolved.row).await?;

        if let Err(e) = self.layout.write_metadata(&detail) {
            warn!(article_id = detail.id(), error = %e, "metadata not persisted");
        }

        debug!(
            article_id = detail.id(),
            article_type = %ty.name,
            missing = resolved.missing_fields.len(),
            images = resolved.images.len(),
            "article exported"
        );
        self.tick(detail.id());

        Ok(ArticleOutcome::Exported {
            key_prefix: ty.key_prefix.clone(),
            images: resolved.images,
        })
    }

    fn tick(&self, article_id: &str) {
        let current = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        self.progress.article_processed(article_id, current, self.total);
    }
}

/// Run the full export.
///
/// 1. Register and describe article types
/// 2. Create the export tree
/// 3. Discover and export articles
/// 4. Augment CSVs with data category columns
/// 5. Fetch referenced images
/// 6. Write `export.json`
#[instrument(skip_all, fields(root = %config.output_root.display()))]
pub async fn run_export(
    config: &ExportConfig,
    client: ApiClient,
    progress: Arc<dyn ProgressReporter>,
) -> Result<ExportResult> {
    let start = Instant::now();
    let started_at = Utc::now();
    let client = Arc::new(client);
    let stage = StageOptions::new(config.concurrency, config.delay_ms);

    info!("starting export");

    // --- Phase 1: Schema ---
    progress.phase("Loading article types");
    let mut registry = SchemaRegistry::load(&client).await?;

    progress.phase("Describing article types");
    registry.describe_all(client.clone(), stage).await?;
    let article_types: Vec<String> = registry.types().map(|t| t.name.clone()).collect();

    // --- Phase 2: Layout ---
    progress.phase("Preparing export directory");
    let layout = Arc::new(ExportLayout::create(&config.output_root, registry.types())?);

    // --- Phase 3: Articles ---
    progress.phase("Discovering articles");
    let summaries = discover_articles(&client, config.page_size, config.page_limit).await?;
    let articles_discovered = summaries.len();

    progress.phase("Exporting articles");
    let ctx = Arc::new(ExportContext {
        config: config.clone(),
        client: client.clone(),
        registry,
        layout: layout.clone(),
        progress: progress.clone(),
        processed: AtomicUsize::new(0),
        total: articles_discovered,
    });

    let outcomes = run_stage("articles", summaries, stage, move |summary| {
        let ctx = ctx.clone();
        async move { ctx.export_article(summary).await }
    })
    .await?;

    let mut articles_exported = 0;
    let mut articles_failed = 0;
    let mut image_sources = BTreeSet::new();
    for outcome in outcomes {
        match outcome {
            ArticleOutcome::Exported { key_prefix, images } => {
                articles_exported += 1;
                image_sources.extend(images.into_iter().map(|src| (key_prefix.clone(), src)));
            }
            ArticleOutcome::Skipped => articles_failed += 1,
        }
    }
    info!(articles_exported, articles_failed, "article stage finished");

    // --- Phase 4: Categories ---
    progress.phase("Augmenting categories");
    let groups = Arc::new(client.data_category_groups().await?);
    augment_exports(
        layout.clone(),
        groups.clone(),
        &config.id_column,
        StageOptions::new(config.augment_concurrency, 0),
    )
    .await?;

    // --- Phase 5: Images ---
    let mut images_saved = 0;
    let mut images_failed = 0;
    if config.fetch_images && !image_sources.is_empty() {
        progress.phase("Fetching images");
        let plan = plan_image_requests(&client, image_sources);
        images_failed += plan.unresolved;

        let image_client = client.clone();
        let image_layout = layout.clone();
        let results = run_stage(
            "images",
            plan.requests,
            stage,
            move |request: ImageRequest| {
                let client = image_client.clone();
                let layout = image_layout.clone();
                async move {
                    let outcome = match layout.type_layout(&request.key_prefix) {
                        Some(type_layout) => fetch_image(&client, type_layout, &request).await,
                        None => ImageOutcome::Failed {
                            src: request.url.to_string(),
                            reason: "unknown article type".into(),
                        },
                    };
                    Ok(outcome)
                }
            },
        )
        .await?;

        for outcome in results {
            match outcome {
                ImageOutcome::Saved(_) => images_saved += 1,
                ImageOutcome::Failed { .. } => images_failed += 1,
            }
        }
        info!(images_saved, images_failed, "image stage finished");
    }

    // --- Phase 6: Manifest ---
    progress.phase("Writing manifest");
    let manifest = ExportManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        tool_version: config.tool_version.clone(),
        started_at,
        completed_at: Utc::now(),
        article_types,
        articles_discovered,
        articles_exported,
        articles_failed,
        category_groups: groups.iter().map(|g| g.name.clone()).collect(),
        images_saved,
        images_failed,
    };
    layout.write_manifest(&manifest)?;

    let result = ExportResult {
        output_root: config.output_root.clone(),
        manifest,
        elapsed: start.elapsed(),
    };

    info!(
        exported = result.manifest.articles_exported,
        failed = result.manifest.articles_failed,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "export complete"
    );

    progress.done(&result);
    Ok(result)
}
