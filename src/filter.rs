use std::fmt;
use std::str::FromStr;

use crate::types::{Error, TokenEntry};

/// How a search query is matched against a token's name and symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Prefix,
    Contains,
}

impl FromStr for MatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Ok(MatchMode::Prefix),
            "contains" => Ok(MatchMode::Contains),
            other => Err(Error::Config(format!(
                "unknown search mode '{}', expected prefix or contains",
                other
            ))),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Prefix => write!(f, "prefix"),
            MatchMode::Contains => write!(f, "contains"),
        }
    }
}

fn matches(field: &str, query: &str, mode: MatchMode) -> bool {
    let field = field.to_lowercase();
    match mode {
        MatchMode::Prefix => field.starts_with(query),
        MatchMode::Contains => field.contains(query),
    }
}

/// Entries whose name or symbol match `query`, case-insensitively, in their original order.
/// An empty query keeps everything; entries still waiting for metadata only survive that case.
pub fn filter_tokens<'a>(query: &str, entries: &'a [TokenEntry], mode: MatchMode) -> Vec<&'a TokenEntry> {
    if query.is_empty() {
        return entries.iter().collect();
    }

    let query = query.to_lowercase();
    entries
        .iter()
        .filter(|entry| match &entry.data {
            Some(token) => matches(&token.name, &query, mode) || matches(&token.symbol, &query, mode),
            None => false,
        })
        .collect()
}
