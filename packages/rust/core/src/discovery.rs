//! Paged article discovery.

use tracing::{debug, info, instrument};

use wisdom_client::ApiClient;
use wisdom_shared::{ArticleSummary, Result};

/// Walk the article listing from the first page.
///
/// Stops when a page has no `nextPageUrl` or after `page_limit` pages
/// (inclusive; zero is treated as one). A page that fails to load ends
/// discovery with that error.
#[instrument(skip(client))]
pub async fn discover_articles(
    client: &ApiClient,
    page_size: u32,
    page_limit: u32,
) -> Result<Vec<ArticleSummary>> {
    let page_limit = page_limit.max(1);
    let mut next = client.article_list_path(page_size);
    let mut summaries = Vec::new();
    let mut pages = 0u32;

    loop {
        let page = client.article_page(&next).await?;
        pages += 1;
        debug!(page = pages, articles = page.articles.len(), "listing page fetched");
        summaries.extend(page.articles);

        match page.next_page_url {
            Some(url) if pages < page_limit && !url.is_empty() => next = url,
            _ => break,
        }
    }

    info!(pages, articles = summaries.len(), "discovery finished");
    Ok(summaries)
}
