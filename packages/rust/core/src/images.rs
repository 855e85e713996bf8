//! Images referenced from rich-text fields.
//!
//! The resolver collects `<img src>` values while it writes HTML side files;
//! after augmentation they are resolved, given a file name that is unique
//! within their type, fetched once and saved under the type's `images/`
//! directory.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use wisdom_client::ApiClient;
use wisdom_shared::{Result, WisdomError};
use wisdom_storage::TypeLayout;

/// Hex characters of the URL hash prefixed to ambiguous file names.
const HASH_PREFIX_LEN: usize = 12;

/// An image to fetch for one article type, with its target file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub key_prefix: String,
    pub url: Url,
    pub file_name: String,
}

/// Requests ready for the image stage plus the sources that did not resolve.
#[derive(Debug, Default)]
pub struct ImagePlan {
    pub requests: Vec<ImageRequest>,
    pub unresolved: usize,
}

/// Result of one image task.
#[derive(Debug)]
pub enum ImageOutcome {
    Saved(PathBuf),
    Failed { src: String, reason: String },
}

/// `src` attributes of every `<img>` in an HTML fragment, in document order.
///
/// Inline `data:` images are skipped; they need no fetch.
pub fn extract_image_urls(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("img[src]").expect("static selector");

    fragment
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty() && !src.starts_with("data:"))
        .map(str::to_string)
        .collect()
}

/// Last path segment of `url` with unsafe characters replaced.
fn base_name(url: &Url) -> String {
    let base: String = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if base == "." || base == ".." {
        String::new()
    } else {
        base
    }
}

/// Base name behind a short hash of the full URL.
fn hashed_file_name(url: &Url) -> String {
    let digest = Sha256::digest(url.as_str().as_bytes());
    let hash: String = digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(HASH_PREFIX_LEN)
        .collect();

    match base_name(url) {
        base if base.is_empty() => hash,
        base => format!("{hash}-{base}"),
    }
}

/// Preferred file name an image is saved under.
///
/// This is the last path segment with unsafe characters replaced. URLs with a
/// query string (servlet-served images) or no usable segment get a short
/// hash of the full URL in front so distinct images do not overwrite each other.
pub fn image_file_name(url: &Url) -> String {
    let base = base_name(url);
    if url.query().is_none() && !base.is_empty() {
        base
    } else {
        hashed_file_name(url)
    }
}

/// Assign file names to resolved images, once per `(type, url)`.
///
/// The first URL to claim a base name within a type keeps it; any other URL
/// with the same base name falls back to the hashed name.
pub fn assign_file_names(images: impl IntoIterator<Item = (String, Url)>) -> Vec<ImageRequest> {
    let mut seen = HashSet::new();
    let mut claimed = HashSet::new();
    let mut requests = Vec::new();

    for (key_prefix, url) in images {
        if !seen.insert((key_prefix.clone(), url.as_str().to_string())) {
            continue;
        }

        let mut file_name = image_file_name(&url);
        if claimed.contains(&(key_prefix.clone(), file_name.clone())) {
            file_name = hashed_file_name(&url);
            debug!(%url, file_name = %file_name, "image name taken, using hashed name");
        }
        claimed.insert((key_prefix.clone(), file_name.clone()));

        requests.push(ImageRequest {
            key_prefix,
            url,
            file_name,
        });
    }
    requests
}

/// Resolve collected `(key prefix, src)` pairs against the instance and
/// assign file names. Sources that are not valid URLs are counted, not fatal.
pub fn plan_image_requests(client: &ApiClient, sources: BTreeSet<(String, String)>) -> ImagePlan {
    let mut unresolved = 0;
    let resolved: Vec<(String, Url)> = sources
        .into_iter()
        .filter_map(|(key_prefix, src)| match client.resolve(&src) {
            Ok(url) => Some((key_prefix, url)),
            Err(e) => {
                warn!(src = %src, error = %e, "image source skipped");
                unresolved += 1;
                None
            }
        })
        .collect();

    ImagePlan {
        requests: assign_file_names(resolved),
        unresolved,
    }
}

/// Fetch one image and save it under the type's `images/` directory.
///
/// Every failure is reported as [`ImageOutcome::Failed`]; a missing image
/// never ends the run.
pub async fn fetch_image(
    client: &ApiClient,
    layout: &TypeLayout,
    request: &ImageRequest,
) -> ImageOutcome {
    match try_fetch_image(client, layout, request).await {
        Ok(path) => {
            debug!(url = %request.url, path = %path.display(), "image saved");
            ImageOutcome::Saved(path)
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "image skipped");
            ImageOutcome::Failed {
                src: request.url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

async fn try_fetch_image(
    client: &ApiClient,
    layout: &TypeLayout,
    request: &ImageRequest,
) -> Result<PathBuf> {
    let url = &request.url;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(WisdomError::validation(format!(
            "unsupported image scheme '{}'",
            url.scheme()
        )));
    }

    let bytes = client.get_bytes(url.as_str()).await?;
    layout.write_image(&request.file_name, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use wisdom_client::AccessToken;
    use wisdom_shared::{ApiConfig, ArticleType, FieldDescriptor};
    use wisdom_storage::ExportLayout;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("wisdom-images-test-{}", Uuid::now_v7()))
    }

    fn client_for(server: &MockServer) -> ApiClient {
        let token = AccessToken {
            access_token: "SECRET".into(),
            instance_url: Some(server.uri()),
        };
        ApiClient::from_token(&ApiConfig::default(), &token).unwrap()
    }

    fn faq_type() -> ArticleType {
        ArticleType {
            key_prefix: "kA0".into(),
            name: "FAQ__ka".into(),
            fields: vec![FieldDescriptor::plain("Title")],
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn extracts_src_in_order() {
        let html = r#"<p><img src='x.png'>text<img alt="no src"><IMG SRC="/img/y.jpg"></p>"#;
        assert_eq!(extract_image_urls(html), vec!["x.png", "/img/y.jpg"]);
    }

    #[test]
    fn skips_inline_and_empty_sources() {
        let html = r#"<img src="data:image/png;base64,AAAA"><img src="  ">"#;
        assert!(extract_image_urls(html).is_empty());
    }

    #[test]
    fn decodes_entities_in_src() {
        let html = r#"<img src="/servlet/rtaImage?eid=ka0&amp;feoid=00N">"#;
        assert_eq!(
            extract_image_urls(html),
            vec!["/servlet/rtaImage?eid=ka0&feoid=00N"]
        );
    }

    #[test]
    fn plain_basename_is_kept() {
        assert_eq!(
            image_file_name(&url("https://cdn.example.com/assets/logo.png")),
            "logo.png"
        );
        assert_eq!(
            image_file_name(&url("https://cdn.example.com/a/my%20pic.png")),
            "my_20pic.png"
        );
    }

    #[test]
    fn query_urls_get_a_hash_prefix() {
        let a = url("https://x.example.com/servlet/rtaImage?refid=1");
        let b = url("https://x.example.com/servlet/rtaImage?refid=2");

        let name_a = image_file_name(&a);
        assert!(name_a.ends_with("-rtaImage"));
        assert_eq!(name_a.len(), HASH_PREFIX_LEN + "-rtaImage".len());
        assert_ne!(name_a, image_file_name(&b));
        assert_eq!(name_a, image_file_name(&a));
    }

    #[test]
    fn directory_url_is_hashed() {
        assert_eq!(
            image_file_name(&url("https://x.example.com/")).len(),
            HASH_PREFIX_LEN
        );
    }

    #[test]
    fn shared_basename_within_a_type_is_disambiguated() {
        let requests = assign_file_names([
            ("kA0".to_string(), url("https://x.example.com/a/logo.png")),
            ("kA0".to_string(), url("https://x.example.com/b/logo.png")),
            ("kA1".to_string(), url("https://x.example.com/b/logo.png")),
            ("kA0".to_string(), url("https://x.example.com/a/logo.png")),
        ]);

        let names: Vec<_> = requests
            .iter()
            .map(|r| (r.key_prefix.as_str(), r.file_name.as_str()))
            .collect();
        assert_eq!(names.len(), 3);
        assert_eq!(names[0], ("kA0", "logo.png"));
        assert_eq!(names[1].0, "kA0");
        assert!(names[1].1.ends_with("-logo.png"));
        assert_eq!(names[1].1.len(), HASH_PREFIX_LEN + "-logo.png".len());
        assert_eq!(names[2], ("kA1", "logo.png"));
    }

    #[tokio::test]
    async fn plan_dedupes_relative_and_absolute_forms() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        let sources = BTreeSet::from([
            ("kA0".to_string(), "/img/x.png".to_string()),
            ("kA0".to_string(), format!("{}/img/x.png", server.uri())),
            ("kA0".to_string(), "http://[broken".to_string()),
        ]);
        let plan = plan_image_requests(&client, sources);

        assert_eq!(plan.requests.len(), 1);
        assert_eq!(plan.requests[0].file_name, "x.png");
        assert_eq!(plan.unresolved, 1);
    }

    #[tokio::test]
    async fn same_basename_images_are_both_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"AAA".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"BBB".to_vec()))
            .mount(&server)
            .await;

        let root = temp_dir();
        let ty = faq_type();
        let layout = ExportLayout::create(&root, [&ty]).unwrap();
        let faq = layout.type_layout("kA0").unwrap();
        let client = client_for(&server);

        let plan = plan_image_requests(
            &client,
            BTreeSet::from([
                ("kA0".to_string(), "/a/logo.png".to_string()),
                ("kA0".to_string(), "/b/logo.png".to_string()),
            ]),
        );
        for request in &plan.requests {
            assert!(matches!(
                fetch_image(&client, faq, request).await,
                ImageOutcome::Saved(_)
            ));
        }

        let mut contents: Vec<Vec<u8>> = std::fs::read_dir(faq.images_dir())
            .unwrap()
            .map(|entry| std::fs::read(entry.unwrap().path()).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec![b"AAA".to_vec(), b"BBB".to_vec()]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn foreign_images_are_fetched_without_credentials() {
        let instance = MockServer::start().await;
        let cdn = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNG".to_vec()))
            .mount(&cdn)
            .await;

        let root = temp_dir();
        let ty = faq_type();
        let layout = ExportLayout::create(&root, [&ty]).unwrap();
        let faq = layout.type_layout("kA0").unwrap();
        let client = client_for(&instance);

        let request = ImageRequest {
            key_prefix: "kA0".into(),
            url: url(&format!("{}/logo.png", cdn.uri())),
            file_name: "logo.png".into(),
        };
        assert!(matches!(
            fetch_image(&client, faq, &request).await,
            ImageOutcome::Saved(_)
        ));

        let received = cdn.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());

        let _ = std::fs::remove_dir_all(&root);
    }
}
