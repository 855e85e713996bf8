//! Article types known to the instance, keyed by key prefix.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use wisdom_client::ApiClient;
use wisdom_client::responses::SObjectDescribe;
use wisdom_shared::{ArticleType, FieldDescriptor, FieldKind, Result, WisdomError, key_prefix};

use crate::stage::{StageOptions, run_stage};

/// Suffix of knowledge article object names.
pub const ARTICLE_OBJECT_SUFFIX: &str = "__ka";

/// Whether a global listing entry names a knowledge article type.
pub fn is_article_object(name: &str) -> bool {
    name.ends_with(ARTICLE_OBJECT_SUFFIX)
}

/// Registered article types. Built before any article is fetched and
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<String, ArticleType>,
}

impl SchemaRegistry {
    /// Build a registry from already-described types.
    pub fn from_types(types: impl IntoIterator<Item = ArticleType>) -> Self {
        Self {
            types: types
                .into_iter()
                .map(|ty| (ty.key_prefix.clone(), ty))
                .collect(),
        }
    }

    /// Read the global object listing and keep the article types.
    ///
    /// Field lists stay empty until [`SchemaRegistry::describe_all`] runs.
    #[instrument(skip_all)]
    pub async fn load(client: &ApiClient) -> Result<Self> {
        let objects = client.list_sobjects().await?;

        let types = objects.into_iter().filter_map(|object| {
            let prefix = object.key_prefix?;
            is_article_object(&object.name).then(|| ArticleType {
                key_prefix: prefix,
                name: object.name,
                fields: Vec::new(),
            })
        });
        let registry = Self::from_types(types);

        info!(types = registry.len(), "article types registered");
        Ok(registry)
    }

    /// Describe every registered type through a bounded stage and replace
    /// their field lists. Any failure is fatal.
    #[instrument(skip_all, fields(types = self.len()))]
    pub async fn describe_all(&mut self, client: Arc<ApiClient>, opts: StageOptions) -> Result<()> {
        let items: Vec<(String, String)> = self
            .types
            .values()
            .map(|ty| (ty.key_prefix.clone(), ty.version_object_name()))
            .collect();

        let described = run_stage("describe", items, opts, move |(prefix, object_name)| {
            let client = client.clone();
            async move {
                let describe = client.describe(&object_name).await?;
                Ok((prefix, describe))
            }
        })
        .await?;

        for (prefix, describe) in described {
            self.apply_describe(&prefix, describe)?;
        }
        Ok(())
    }

    /// Replace the field list of the type with `prefix`.
    pub fn apply_describe(&mut self, prefix: &str, describe: SObjectDescribe) -> Result<()> {
        let ty = self.types.get_mut(prefix).ok_or_else(|| {
            WisdomError::validation(format!("describe result for unregistered prefix '{prefix}'"))
        })?;

        ty.fields = describe
            .fields
            .into_iter()
            .map(|field| FieldDescriptor {
                kind: FieldKind::from_type_info(field.extra_type_info.as_deref()),
                name: field.name,
            })
            .collect();

        debug!(
            name = %ty.name,
            fields = ty.fields.len(),
            rich_text = ty.fields.iter().filter(|f| f.kind == FieldKind::RichText).count(),
            "type described"
        );
        Ok(())
    }

    pub fn get(&self, prefix: &str) -> Option<&ArticleType> {
        self.types.get(prefix)
    }

    /// Type of the article with `article_id`; an unregistered prefix is fatal.
    pub fn require(&self, article_id: &str) -> Result<&ArticleType> {
        let prefix = key_prefix(article_id).unwrap_or(article_id);
        self.types
            .get(prefix)
            .ok_or_else(|| WisdomError::UnknownArticleType {
                article_id: article_id.to_string(),
                prefix: prefix.to_string(),
            })
    }

    /// Registered types, ordered by key prefix.
    pub fn types(&self) -> impl Iterator<Item = &ArticleType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
