//! External issue references
//!
//! Board items are usually created from an issue in an external tracker.
//! The reference is parsed once at add time, and a provider supplies the
//! title and canonical URL stored on the item. Ordering never looks at
//! these fields again.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing an issue reference
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueRefError {
    #[error("issue reference is empty")]
    Empty,

    #[error("'{0}' has no issue number (expected owner/repo#42)")]
    MissingNumber(String),

    #[error("'{0}' is not a valid issue number")]
    InvalidNumber(String),

    #[error("'{0}' does not name a repository (expected owner/repo#42)")]
    MissingRepository(String),
}

/// `owner/repo#number`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueReference {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl IssueReference {
    /// Parse `owner/repo#42` or an issue/pull URL such as
    /// `https://github.com/owner/repo/issues/42`
    pub fn parse(input: &str) -> Result<Self, IssueRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(IssueRefError::Empty);
        }

        if input.starts_with("http://") || input.starts_with("https://") {
            return Self::parse_url(input);
        }

        let (path, number) = input
            .split_once('#')
            .ok_or_else(|| IssueRefError::MissingNumber(input.to_string()))?;
        let number = parse_number(number)?;
        let (owner, repo) = path
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
            .ok_or_else(|| IssueRefError::MissingRepository(input.to_string()))?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        })
    }

    fn parse_url(input: &str) -> Result<Self, IssueRefError> {
        let path = input
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(input);
        let segments: Vec<&str> = path
            .split(['/', '?', '#'])
            .skip(1)
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [owner, repo, "issues" | "pull", number, ..] => Ok(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number: parse_number(number)?,
            }),
            [_, _, ..] => Err(IssueRefError::MissingNumber(input.to_string())),
            _ => Err(IssueRefError::MissingRepository(input.to_string())),
        }
    }

    /// Canonical key stored on the item
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Issue page under `base` (e.g. `https://github.com`)
    pub fn url(&self, base: &str) -> String {
        format!(
            "{}/{}/{}/issues/{}",
            base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.number
        )
    }
}

fn parse_number(value: &str) -> Result<u64, IssueRefError> {
    value
        .trim()
        .parse()
        .map_err(|_| IssueRefError::InvalidNumber(value.to_string()))
}

impl fmt::Display for IssueReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl FromStr for IssueReference {
    type Err = IssueRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What a provider knows about an issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDetails {
    pub key: String,
    pub title: String,
    pub url: String,
}

/// Supplies descriptive fields for a new item
///
/// Providers degrade instead of failing: when the tracker cannot be
/// reached the offline details are returned.
#[async_trait]
pub trait IssueProvider: Send + Sync {
    async fn resolve(&self, reference: &IssueReference) -> IssueDetails;
}

/// Derives everything from the reference itself
#[derive(Debug, Clone)]
pub struct OfflineIssueProvider {
    base_url: String,
}

impl OfflineIssueProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn details(&self, reference: &IssueReference) -> IssueDetails {
        IssueDetails {
            key: reference.key(),
            title: format!("{} #{}", reference.repo, reference.number),
            url: reference.url(&self.base_url),
        }
    }
}

#[async_trait]
impl IssueProvider for OfflineIssueProvider {
    async fn resolve(&self, reference: &IssueReference) -> IssueDetails {
        self.details(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_form() {
        let reference = IssueReference::parse(" acme/research#42 ").unwrap();
        assert_eq!(reference.owner, "acme");
        assert_eq!(reference.repo, "research");
        assert_eq!(reference.number, 42);
        assert_eq!(reference.key(), "acme/research#42");
    }

    #[test]
    fn test_parse_url_form() {
        let reference =
            IssueReference::parse("https://github.com/acme/roadmap-private/issues/7").unwrap();
        assert_eq!(reference.key(), "acme/roadmap-private#7");

        let pull = IssueReference::parse("https://github.com/acme/tools/pull/9?tab=files").unwrap();
        assert_eq!(pull.number, 9);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(IssueReference::parse(""), Err(IssueRefError::Empty));
        assert!(matches!(
            IssueReference::parse("acme/research"),
            Err(IssueRefError::MissingNumber(_))
        ));
        assert!(matches!(
            IssueReference::parse("acme/research#abc"),
            Err(IssueRefError::InvalidNumber(_))
        ));
        assert!(matches!(
            IssueReference::parse("research#4"),
            Err(IssueRefError::MissingRepository(_))
        ));
        assert!(matches!(
            IssueReference::parse("https://github.com/acme/research"),
            Err(IssueRefError::MissingNumber(_))
        ));
    }

    #[test]
    fn test_url_trims_base() {
        let reference: IssueReference = "acme/research#42".parse().unwrap();
        assert_eq!(
            reference.url("https://github.com/"),
            "https://github.com/acme/research/issues/42"
        );
    }

    #[tokio::test]
    async fn test_offline_provider() {
        let provider = OfflineIssueProvider::new("https://git.example.com");
        let reference = IssueReference::parse("acme/research#3").unwrap();
        let details = provider.resolve(&reference).await;

        assert_eq!(details.key, "acme/research#3");
        assert_eq!(details.title, "research #3");
        assert_eq!(details.url, "https://git.example.com/acme/research/issues/3");
    }
}
