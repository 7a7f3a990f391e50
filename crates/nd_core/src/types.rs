use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score value of an article that has not been through the relevance model yet.
pub const UNSCORED: i32 = -1;

/// Highest score the relevance model may assign.
pub const MAX_SCORE: i32 = 9;

const AUTHOR_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub site_name: String,
    pub url: String,
    pub title: String,
    pub text: String,
    pub authors: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub score: i32,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Article {
    pub fn is_scored(&self) -> bool {
        self.score != UNSCORED
    }
}

/// An extracted article on its way into storage. Identity, score and
/// creation time are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub site_name: String,
    pub url: String,
    pub title: String,
    pub text: String,
    pub authors: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
}

/// Reader interest profile attached to a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub text: String,
    pub language: String,
}

impl Preference {
    pub const DEFAULT_LANGUAGE: &'static str = "English";

    pub fn new(text: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            text: text.into(),
            language: language
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(Self::DEFAULT_LANGUAGE)
                .to_string(),
        }
    }
}

/// A validated relevance grade. Can only hold scores in `0..=MAX_SCORE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    score: i32,
    summary: String,
}

impl ScoreResult {
    pub fn new(score: i64, summary: impl Into<String>) -> Option<Self> {
        if !(0..=MAX_SCORE as i64).contains(&score) {
            return None;
        }
        Some(Self {
            score: score as i32,
            summary: summary.into(),
        })
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }
}

/// Outcome of asking the relevance model about one article.
///
/// Transport failures are not represented here; they travel on the `Err`
/// side of the surrounding `Result` so callers can tell "the service is
/// down" apart from "the service answered nonsense".
#[derive(Debug, Clone, PartialEq)]
pub enum Estimate {
    /// The article's site has no reader preference configured.
    Ineligible,
    /// The model answered, but not with a usable `{score, summary}`.
    Malformed(String),
    Scored(ScoreResult),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageQuery {
    pub site_names: Vec<String>,
    /// Inclusive lower bound on `publish_date`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `publish_date`.
    pub until: Option<DateTime<Utc>>,
    /// Only scored articles with at least this score.
    pub min_score: Option<i32>,
    pub limit: u32,
    pub offset: u32,
}

impl PageQuery {
    pub fn for_sites<I, S>(sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            site_names: sites.into_iter().map(Into::into).collect(),
            limit: 20,
            ..Default::default()
        }
    }

    pub fn window(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn at_least(mut self, min_score: Option<i32>) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn slice(mut self, limit: u32, offset: u32) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Whether an article passes the site, score and publish-date filter.
    pub fn matches(&self, article: &Article) -> bool {
        if !self.site_names.iter().any(|s| s == &article.site_name) {
            return false;
        }
        if let Some(min) = self.min_score {
            if !article.is_scored() || article.score < min {
                return false;
            }
        }
        if self.since.is_none() && self.until.is_none() {
            return true;
        }
        let Some(published) = article.publish_date else {
            return false;
        };
        self.since.map_or(true, |since| published >= since)
            && self.until.map_or(true, |until| published < until)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub articles: Vec<Article>,
    /// Number of articles matching the filter, ignoring `limit`/`offset`.
    pub total: u64,
}

/// Joins authors with `", "`. Commas and backslashes inside a name are
/// escaped with a backslash so [`split_authors`] gives the same list back.
pub fn join_authors(authors: &[String]) -> Option<String> {
    if authors.is_empty() {
        return None;
    }
    let escaped: Vec<String> = authors
        .iter()
        .map(|a| a.replace('\\', "\\\\").replace(',', "\\,"))
        .collect();
    Some(escaped.join(AUTHOR_SEPARATOR))
}

pub fn split_authors(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let mut authors = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            ',' => authors.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    authors.push(current);

    authors
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}
