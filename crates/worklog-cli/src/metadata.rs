//! Issue metadata fetching
//!
//! Resolves an issue reference to a title by fetching the issue page when
//! an item is added. Any failure degrades to the offline details.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};

use worklog_core::{IssueDetails, IssueProvider, IssueReference, OfflineIssueProvider};

/// Fetch timeout in seconds
const FETCH_TIMEOUT: u64 = 10;

/// Issue provider backed by the tracker's web pages
pub struct WebIssueProvider {
    offline: OfflineIssueProvider,
    base_url: String,
}

impl WebIssueProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            offline: OfflineIssueProvider::new(base_url.clone()),
            base_url,
        }
    }

    async fn fetch_title(&self, url: &str) -> Result<Option<String>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT))
            .user_agent("Mozilla/5.0 (compatible; worklog/1.0)")
            .build()?;

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            tracing::debug!(%url, status = %response.status(), "issue page unavailable");
            return Ok(None);
        }

        let html = response.text().await?;
        Ok(parse_issue_title(&html))
    }
}

#[async_trait]
impl IssueProvider for WebIssueProvider {
    async fn resolve(&self, reference: &IssueReference) -> IssueDetails {
        let mut details = self.offline.details(reference);
        let url = reference.url(&self.base_url);

        match self.fetch_title(&url).await {
            Ok(Some(title)) => details.title = title,
            Ok(None) => {}
            Err(e) => tracing::debug!(%url, error = %e, "failed to fetch issue title"),
        }
        details
    }
}

/// Extract the issue title from an issue page
///
/// Tracker pages decorate titles as `Title · Issue #42 · owner/repo`; only
/// the leading segment is kept.
fn parse_issue_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let raw = extract_title(&document)?;
    let title = raw.split(" · ").next().unwrap_or(&raw).trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// og:title, then twitter:title, then `<title>`
fn extract_title(document: &Html) -> Option<String> {
    if let Some(og_title) = extract_meta_content(document, "og:title") {
        return Some(og_title);
    }

    if let Some(twitter_title) = extract_meta_content(document, "twitter:title") {
        return Some(twitter_title);
    }

    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract content from a meta tag by property or name
fn extract_meta_content(document: &Html, property: &str) -> Option<String> {
    ["property", "name"].iter().find_map(|attr| {
        let selector = Selector::parse(&format!(r#"meta[{}="{}"]"#, attr, property)).ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(str::to_string)
    })
}
