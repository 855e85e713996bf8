//! Wire shapes of the REST responses the exporter consumes.
//!
//! Only the fields the export reads are modelled; everything else in the
//! payloads is ignored by serde.

use serde::Deserialize;
use wisdom_shared::{ArticleSummary, CategoryGroup};

/// `GET /sobjects`
#[derive(Debug, Clone, Deserialize)]
pub struct SObjectList {
    #[serde(default)]
    pub sobjects: Vec<SObjectSummary>,
}

/// One object in the global listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SObjectSummary {
    pub name: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
}

/// `GET /sobjects/<name>/describe/`
#[derive(Debug, Clone, Deserialize)]
pub struct SObjectDescribe {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<DescribeField>,
}

/// A field of a describe payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeField {
    pub name: String,
    #[serde(default)]
    pub extra_type_info: Option<String>,
}

/// One page of `GET /support/knowledgeArticles`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    #[serde(default)]
    pub articles: Vec<ArticleSummary>,
    /// Relative URL of the following page; absent or null on the last page.
    #[serde(default)]
    pub next_page_url: Option<String>,
}

/// `GET /support/dataCategoryGroups`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGroupList {
    #[serde(default)]
    pub category_groups: Vec<CategoryGroup>,
}

/// `GET /knowledgeManagement/articleVersions/masterVersions`
#[derive(Debug, Clone, Deserialize)]
pub struct MasterVersionLinks {
    pub urls: MasterVersionUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MasterVersionUrls {
    #[serde(rename = "masterVersionID")]
    pub master_version_id: String,
}

/// The master version resource; points at the article record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterVersionInfo {
    pub additional_information: AdditionalInformation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdditionalInformation {
    pub data: String,
}

/// OAuth token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub instance_url: Option<String>,
}

/// OAuth error body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}
