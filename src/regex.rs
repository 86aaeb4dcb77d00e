use std::fmt;
use std::sync::{Arc, OnceLock};

use onig::{Region, SearchOptions};
use serde::{Deserialize, Serialize};

/// A regex wrapper that serializes as a string but compiles lazily at runtime
pub(crate) struct Regex {
    pattern: String,
    compiled: OnceLock<Option<Arc<onig::Regex>>>,
}

impl Clone for Regex {
    fn clone(&self) -> Self {
        // Create a new regex with the same pattern but fresh lazy compilation
        Regex::new(self.pattern.clone())
    }
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

/// A single non-anchored match with per-group byte spans.
/// Group 0 is the whole match; unmatched groups are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegexMatch {
    pub start: usize,
    pub end: usize,
    groups: Vec<Option<(usize, usize)>>,
}

impl RegexMatch {
    pub fn group(&self, idx: usize) -> Option<(usize, usize)> {
        self.groups.get(idx).copied().flatten()
    }
}

impl Regex {
    pub fn new(pattern: String) -> Self {
        Self {
            pattern,
            compiled: OnceLock::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn compiled(&self) -> Option<&Arc<onig::Regex>> {
        self.compiled
            .get_or_init(|| onig::Regex::new(&self.pattern).ok().map(Arc::new))
            .as_ref()
    }

    /// Validate that this regex pattern compiles successfully
    pub fn validate(&self) -> Result<(), onig::Error> {
        onig::Regex::new(&self.pattern).map(|_| ())
    }

    /// Number of numbered capture groups in the pattern, not counting group 0.
    /// `None` when the pattern does not compile.
    pub fn group_count(&self) -> Option<usize> {
        self.compiled().map(|re| re.captures_len())
    }

    /// Syntactic test for a lookbehind construct: the search primitive only
    /// grows its window backward when one is present.
    pub fn has_lookbehind(&self) -> bool {
        self.pattern
            .match_indices("(?<")
            .any(|(idx, _)| matches!(self.pattern.as_bytes().get(idx + 3), Some(b'=') | Some(b'!')))
    }

    /// Find the first match in `text`, with byte spans for every group.
    pub fn search(&self, text: &str) -> Option<RegexMatch> {
        self.search_at(text, 0)
    }

    /// Find the first match starting at or after `from`. Lookbehinds may
    /// still examine the text before `from`.
    pub fn search_at(&self, text: &str, from: usize) -> Option<RegexMatch> {
        let regex = self.compiled()?;
        let mut region = Region::new();
        regex.search_with_options(
            text,
            from,
            text.len(),
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        )?;

        let (start, end) = region.pos(0)?;
        let groups = (0..region.len()).map(|i| region.pos(i)).collect();
        Some(RegexMatch { start, end, groups })
    }
}

impl Serialize for Regex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.pattern)
    }
}

impl<'de> Deserialize<'de> for Regex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        Ok(Regex::new(pattern))
    }
}
