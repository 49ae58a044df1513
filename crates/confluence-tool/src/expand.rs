//! The set of server-side expansions tracked for a content record

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Names of expansions (`body.view`, `version`, `space`, ...) that are either
/// materialized in a payload or wanted on the next fetch.
///
/// Kept sorted so the `expand=` query parameter is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expand(BTreeSet<String>);

impl Expand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list, e.g. `"body.view, version"`
    pub fn parse(s: &str) -> Self {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Add an expansion. Returns `false` if it was already tracked.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Value for the `expand` query parameter
    pub fn to_query(&self) -> String {
        self.iter().collect::<Vec<_>>().join(",")
    }
}

impl fmt::Display for Expand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

impl FromStr for Expand {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Expand {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl<S: Into<String>> FromIterator<S> for Expand {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
