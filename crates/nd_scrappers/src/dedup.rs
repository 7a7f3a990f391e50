use std::collections::HashSet;

/// Coarse substring allow-list for the links discovered on one source.
///
/// A URL passes when it contains any of the configured keywords or the
/// source's own root URL. This is intentionally not a URL pattern matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionFilter {
    tokens: Vec<String>,
}

impl IngestionFilter {
    pub fn for_source(root_url: &str, keywords: &[String]) -> Self {
        let mut tokens: Vec<String> = keywords
            .iter()
            .filter(|k| !k.is_empty())
            .cloned()
            .collect();
        if !tokens.iter().any(|t| t == root_url) {
            tokens.push(root_url.to_string());
        }
        Self { tokens }
    }

    pub fn allows(&self, url: &str) -> bool {
        self.tokens.iter().any(|token| url.contains(token.as_str()))
    }

    /// URLs worth downloading: allowed, not stored yet, each at most once.
    pub fn select_new_urls<I>(&self, discovered: I, processed: &HashSet<String>) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        discovered
            .into_iter()
            .filter(|url| self.allows(url) && !processed.contains(url))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}
