//! Authenticated REST client for the knowledge article API.
//!
//! Every request carries `Accept-Language: en-US`. The bearer token is only
//! attached to URLs on the instance's origin; image links in article HTML
//! can point anywhere and must never receive it. Relative paths (as returned
//! in `nextPageUrl`, article `url` and the master-version links) are
//! resolved against the instance URL.

mod auth;
pub mod responses;

use std::time::Duration;

use reqwest::header::{ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;

use wisdom_shared::{ApiConfig, ArticleDetail, ArticleSummary, CategoryGroup, Result, WisdomError};

pub use auth::{AccessToken, UserCredentials, authenticate};
use responses::{
    ArticlePage, CategoryGroupList, MasterVersionInfo, MasterVersionLinks, SObjectDescribe,
    SObjectList, SObjectSummary,
};

/// User-Agent string for API requests.
pub(crate) const USER_AGENT: &str = concat!("Wisdom/", env!("CARGO_PKG_VERSION"));

/// Client bound to one instance and one access token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    instance_url: Url,
    api_version: String,
    bearer: HeaderValue,
}

impl ApiClient {
    /// Build a client for `instance_url` authenticated with `token`.
    pub fn new(
        instance_url: &str,
        api_version: &str,
        token: &AccessToken,
        timeout: Duration,
    ) -> Result<Self> {
        let instance_url = Url::parse(instance_url).map_err(|e| {
            WisdomError::config(format!("invalid instance URL '{instance_url}': {e}"))
        })?;

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
            .map_err(|e| WisdomError::Auth(format!("access token is not a valid header: {e}")))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| WisdomError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            instance_url,
            api_version: api_version.to_string(),
            bearer,
        })
    }

    /// Build a client from config, preferring the instance URL issued with the token.
    pub fn from_token(api: &ApiConfig, token: &AccessToken) -> Result<Self> {
        let instance = token
            .instance_url
            .as_deref()
            .unwrap_or(api.instance_url.as_str());
        Self::new(
            instance,
            &api.api_version,
            token,
            Duration::from_secs(api.timeout_secs),
        )
    }

    /// `/services/data/<version>` prefix for REST paths.
    pub fn data_path(&self) -> String {
        format!("/services/data/{}", self.api_version)
    }

    /// Path of the first article listing page.
    pub fn article_list_path(&self, page_size: u32) -> String {
        format!(
            "{}/support/knowledgeArticles?pageSize={page_size}",
            self.data_path()
        )
    }

    /// Resolve a path or absolute URL against the instance.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url> {
        self.instance_url
            .join(path_or_url)
            .map_err(|e| WisdomError::validation(format!("bad URL '{path_or_url}': {e}")))
    }

    /// Whether `url` shares the instance's origin (scheme, host and port).
    pub fn is_instance_url(&self, url: &Url) -> bool {
        url.origin() == self.instance_url.origin()
    }

    /// GET builder for `url`, with the bearer token only on the instance origin.
    fn get(&self, url: &Url) -> RequestBuilder {
        let request = self.http.get(url.clone());
        if self.is_instance_url(url) {
            request.header(AUTHORIZATION, self.bearer.clone())
        } else {
            debug!(%url, "foreign origin, sending without credentials");
            request
        }
    }

    /// GET and decode a JSON resource.
    pub async fn get_json<T: DeserializeOwned>(&self, path_or_url: &str) -> Result<T> {
        let url = self.resolve(path_or_url)?;
        debug!(%url, "GET");

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| WisdomError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WisdomError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| WisdomError::Network(format!("{url}: failed to read body: {e}")))?;

        serde_json::from_slice(&body).map_err(|e| WisdomError::parse(format!("{url}: {e}")))
    }

    /// GET raw bytes (images).
    pub async fn get_bytes(&self, path_or_url: &str) -> Result<Vec<u8>> {
        let url = self.resolve(path_or_url)?;

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| WisdomError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WisdomError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| WisdomError::Network(format!("{url}: body read failed: {e}")))?;
        Ok(body.to_vec())
    }

    /// Global object listing.
    #[instrument(skip_all)]
    pub async fn list_sobjects(&self) -> Result<Vec<SObjectSummary>> {
        let list: SObjectList = self
            .get_json(&format!("{}/sobjects", self.data_path()))
            .await?;
        Ok(list.sobjects)
    }

    /// Describe one object.
    #[instrument(skip(self))]
    pub async fn describe(&self, object_name: &str) -> Result<SObjectDescribe> {
        self.get_json(&format!(
            "{}/sobjects/{object_name}/describe/",
            self.data_path()
        ))
        .await
    }

    /// One page of the article listing.
    pub async fn article_page(&self, path_or_url: &str) -> Result<ArticlePage> {
        self.get_json(path_or_url).await
    }

    /// Full article payload for a listing entry.
    pub async fn article_detail(&self, summary: &ArticleSummary) -> Result<ArticleDetail> {
        let value: Value = self.get_json(&summary.url).await?;
        ArticleDetail::from_value(value)
    }

    /// Data category groups attached to knowledge articles.
    #[instrument(skip_all)]
    pub async fn data_category_groups(&self) -> Result<Vec<CategoryGroup>> {
        let list: CategoryGroupList = self
            .get_json(&format!(
                "{}/support/dataCategoryGroups?sObjectName=KnowledgeArticleVersion",
                self.data_path()
            ))
            .await?;
        Ok(list.category_groups)
    }

    /// Follow the online master version of an article to its record.
    pub async fn master_record(&self, article_id: &str) -> Result<Map<String, Value>> {
        let links: MasterVersionLinks = self
            .get_json(&format!(
                "{}/knowledgeManagement/articleVersions/masterVersions?FilterArticleId={article_id}&FilterPublishStatus=online",
                self.data_path()
            ))
            .await?;

        let info: MasterVersionInfo = self.get_json(&links.urls.master_version_id).await?;
        self.get_json(&info.additional_information.data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        let token = AccessToken {
            access_token: "tok".into(),
            instance_url: Some(server.uri()),
        };
        ApiClient::from_token(&ApiConfig::default(), &token).unwrap()
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let token = AccessToken {
            access_token: "tok".into(),
            instance_url: None,
        };
        let client = ApiClient::new(
            "https://na88.example.com",
            "v41.0",
            &token,
            Duration::from_secs(5),
        )
        .unwrap();

        let rel = client
            .resolve("/services/data/v41.0/support/knowledgeArticles?page=2")
            .unwrap();
        assert_eq!(
            rel.as_str(),
            "https://na88.example.com/services/data/v41.0/support/knowledgeArticles?page=2"
        );

        let abs = client.resolve("https://cdn.example.com/x.png").unwrap();
        assert_eq!(abs.host_str(), Some("cdn.example.com"));

        assert_eq!(
            client.article_list_path(10),
            "/services/data/v41.0/support/knowledgeArticles?pageSize=10"
        );
    }

    #[tokio::test]
    async fn requests_carry_bearer_and_language() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/services/data/v41.0/sobjects"))
            .and(header("authorization", "Bearer tok"))
            .and(header("accept-language", "en-US"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sobjects": [{"name": "FAQ__ka", "keyPrefix": "kA0"}]
            })))
            .mount(&server)
            .await;

        let objects = client_for(&server).list_sobjects().await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name, "FAQ__ka");
    }

    #[tokio::test]
    async fn bearer_stays_on_instance_origin() {
        let instance = MockServer::start().await;
        let cdn = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/img/a.png"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"own".to_vec()))
            .expect(1)
            .mount(&instance)
            .await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"cdn".to_vec()))
            .mount(&cdn)
            .await;

        let client = client_for(&instance);
        assert_eq!(client.get_bytes("/img/a.png").await.unwrap(), b"own");
        assert_eq!(
            client
                .get_bytes(&format!("{}/logo.png", cdn.uri()))
                .await
                .unwrap(),
            b"cdn"
        );

        let received = cdn.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());
        assert_eq!(
            received[0].headers.get("accept-language").unwrap(),
            "en-US"
        );
    }

    #[test]
    fn instance_origin_check() {
        let token = AccessToken {
            access_token: "tok".into(),
            instance_url: None,
        };
        let client = ApiClient::new(
            "https://na88.example.com",
            "v41.0",
            &token,
            Duration::from_secs(5),
        )
        .unwrap();

        let own = Url::parse("https://na88.example.com/servlet/rtaImage?eid=1").unwrap();
        let other_host = Url::parse("https://cdn.example.com/x.png").unwrap();
        let other_scheme = Url::parse("http://na88.example.com/x.png").unwrap();
        let other_port = Url::parse("https://na88.example.com:8443/x.png").unwrap();

        assert!(client.is_instance_url(&own));
        assert!(!client.is_instance_url(&other_host));
        assert!(!client.is_instance_url(&other_scheme));
        assert!(!client.is_instance_url(&other_port));
    }

    #[tokio::test]
    async fn http_error_is_network_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .describe("FAQ__kav")
            .await
            .unwrap_err();
        assert!(matches!(err, WisdomError::Network(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn master_record_follows_links() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(
                "/services/data/v41.0/knowledgeManagement/articleVersions/masterVersions",
            ))
            .and(query_param("FilterArticleId", "kA0000000000001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "urls": {"masterVersionID": "/mv/ka0v1"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/mv/ka0v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "additionalInformation": {"data": "/records/ka0v1"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/records/ka0v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "attributes": {"type": "FAQ__kav"},
                "KnowledgeArticleId": "kA0000000000001",
                "Title": "From record"
            })))
            .mount(&server)
            .await;

        let record = client_for(&server)
            .master_record("kA0000000000001")
            .await
            .unwrap();
        assert_eq!(record["Title"], "From record");
    }

    #[tokio::test]
    async fn detail_without_id_is_parse_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/articles/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "x"})))
            .mount(&server)
            .await;

        let summary = ArticleSummary {
            id: "kA0000000000001".into(),
            url: "/articles/1".into(),
        };
        let err = client_for(&server)
            .article_detail(&summary)
            .await
            .unwrap_err();
        assert!(matches!(err, WisdomError::Parse { .. }));
    }
}
