use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use serde::Deserialize;
use serde::de;

use crate::error::TramaResult;

/// An `include` string parsed into its reference kind.
///
/// Allowed values:
///  * self, e.g. `$self`
///  * Repository reference, e.g. `#expression`
///  * Scope name, e.g. `source.matlab`
///  * Scoped repository reference, e.g. `source.matlab#expression`
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Reference {
    /// The owning language's root rule.
    Self_,
    /// A name in the owning language's repository.
    Local(String),
    /// Another language by scope name.
    OtherComplete(String),
    /// A repository entry of another language.
    OtherSpecific(String, String),
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        match value {
            "$self" => Self::Self_,
            s if s.starts_with('#') => Self::Local(s[1..].to_string()),
            s if s.contains('#') => {
                let (scope, rule) = s.split_once('#').unwrap();
                Self::OtherSpecific(scope.to_string(), rule.to_string())
            }
            _ => Self::OtherComplete(value.to_string()),
        }
    }
}

/// Custom deserializer for the include field that parses string references into Reference enum
fn deserialize_reference<'de, D>(deserializer: D) -> Result<Option<Reference>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt_string = Option::<String>::deserialize(deserializer)?;
    Ok(opt_string.map(|s| Reference::from(s.as_str())))
}

/// Transparent wrapper around `BTreeMap<usize, RawRule>` for capture maps.
///
/// Grammar files write captures as JSON objects with numeric string keys
/// ("0", "1", ...) and occasionally as arrays; both forms deserialize into
/// the same usize-indexed map. Key 0 denotes the whole match.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Captures(pub(crate) BTreeMap<usize, RawRule>);

impl<'de> Deserialize<'de> for Captures {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct CapturesVisitor;

        impl<'de> de::Visitor<'de> for CapturesVisitor {
            type Value = Captures;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map keyed by capture group number, or a list of rules")
            }

            fn visit_map<M>(self, mut access: M) -> Result<Captures, M::Error>
            where
                M: de::MapAccess<'de>,
            {
                let mut groups = BTreeMap::new();
                while let Some((key, rule)) = access.next_entry::<String, RawRule>()? {
                    // keys that don't parse as group numbers get dropped
                    if let Ok(group) = key.parse::<usize>() {
                        groups.insert(group, rule);
                    }
                }
                Ok(Captures(groups))
            }

            fn visit_seq<S>(self, mut access: S) -> Result<Captures, S::Error>
            where
                S: de::SeqAccess<'de>,
            {
                let mut groups = BTreeMap::new();
                while let Some(rule) = access.next_element::<RawRule>()? {
                    groups.insert(groups.len(), rule);
                }
                Ok(Captures(groups))
            }

            // `"captures": null` appears in the wild
            fn visit_unit<E>(self) -> Result<Captures, E>
            where
                E: de::Error,
            {
                Ok(Captures::default())
            }
        }

        deserializer.deserialize_any(CapturesVisitor)
    }
}

impl Deref for Captures {
    type Target = BTreeMap<usize, RawRule>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A repository value is normally one rule, but a handful of grammars write a
/// rule list instead; either way the entry lands as a single rule.
#[derive(Deserialize)]
#[serde(untagged)]
enum RepositoryEntry {
    Rule(Box<RawRule>),
    Rules(Vec<RawRule>),
}

impl RepositoryEntry {
    fn into_rule(self) -> RawRule {
        let mut rule = match self {
            RepositoryEntry::Rule(rule) => *rule,
            RepositoryEntry::Rules(patterns) => RawRule {
                patterns,
                ..Default::default()
            },
        };

        // empty `{}` placeholders inside patterns carry no information and
        // would read as scope-only rules, prune them here
        let placeholder = RawRule::default();
        rule.patterns.retain(|child| *child != placeholder);
        rule
    }
}

fn deserialize_repository_map<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, RawRule>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries = BTreeMap::<String, RepositoryEntry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|(name, entry)| (name, entry.into_rule()))
        .collect())
}

/// One rule of the grammar tree.
///
/// The rule's shape is determined by which fields are present: `match` makes
/// a match rule, `begin` + `end` a block rule, a bare `patterns` list a
/// grouping rule, and `include` a reference to another rule. A rule carrying
/// only `name` (common inside captures) assigns a scope to its span.
///
/// # Examples
///
/// Match pattern:
/// ```json
/// {
///   "match": "\\bfunction\\b",
///   "name": "storage.type.function"
/// }
/// ```
///
/// Begin/end pattern:
/// ```json
/// {
///   "begin": "\"",
///   "end": "\"",
///   "name": "string.quoted.double",
///   "patterns": [
///     {"match": "\\\\.", "name": "constant.character.escape"}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRule {
    /// Reference to another rule, overriding every other field when present.
    #[serde(deserialize_with = "deserialize_reference")]
    pub include: Option<Reference>,

    /// Scope name assigned to the matched span.
    pub name: Option<String>,
    /// Scope name assigned to the content between begin and end.
    pub content_name: Option<String>,
    /// Author note; used as a scope fallback when `name` is absent.
    pub comment: Option<String>,

    /// The regex of a match rule.
    #[serde(rename = "match")]
    pub match_: Option<String>,
    /// Sub-grammars applied to the match's capture groups.
    pub captures: Captures,

    /// The opening regex of a block rule.
    pub begin: Option<String>,
    /// Sub-grammars applied to the begin match's capture groups.
    pub begin_captures: Captures,

    /// The closing regex of a block rule.
    pub end: Option<String>,
    /// Sub-grammars applied to the end match's capture groups.
    pub end_captures: Captures,

    /// Ordered child rules.
    pub patterns: Vec<RawRule>,
    /// Named rule definitions reachable via `#name` includes.
    #[serde(deserialize_with = "deserialize_repository_map")]
    pub repository: BTreeMap<String, RawRule>,
}

/// Top-level structure representing a complete TextMate grammar
///
/// # Examples
/// ```json
/// {
///   "name": "MATLAB",
///   "scopeName": "source.matlab",
///   "fileTypes": ["m"],
///   "patterns": [
///     { "include": "#numbers" }
///   ],
///   "repository": {
///     "numbers": {
///       "patterns": [
///         { "match": "\\d+", "name": "constant.numeric.matlab" }
///       ]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct RawGrammar {
    /// Human-readable name of the language
    pub name: String,
    /// Unique identifier for this grammar's scope
    /// Example: "source.matlab", "text.html.markdown"
    pub scope_name: String,
    /// File extensions this grammar applies to
    pub file_types: Vec<String>,
    /// Unique identifier carried by some grammar files
    pub uuid: String,
    /// Named pattern definitions that can be referenced by includes
    #[serde(deserialize_with = "deserialize_repository_map")]
    pub repository: BTreeMap<String, RawRule>,
    /// Root patterns applied first when parsing
    pub patterns: Vec<RawRule>,
    /// Injection rules, keyed by a selector of the form
    /// `L:target.scope - except.scope1 - except.scope2`
    pub injections: BTreeMap<String, RawRule>,
}

impl RawGrammar {
    /// Deserialize a grammar from its JSON text.
    pub fn load_from_str(content: &str) -> TramaResult<Self> {
        let raw_grammar = serde_json::from_str(content)?;
        Ok(raw_grammar)
    }

    /// Deserialize a grammar from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> TramaResult<Self> {
        let file = File::open(&path)?;
        let raw_grammar = serde_json::from_reader(&file)?;
        Ok(raw_grammar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_parsing() {
        let test_cases = vec![
            ("$self", Reference::Self_),
            ("#value", Reference::Local("value".to_string())),
            ("#built-in.constant", Reference::Local("built-in.constant".to_string())),
            ("source.js", Reference::OtherComplete("source.js".to_string())),
            (
                "text.html.basic",
                Reference::OtherComplete("text.html.basic".to_string()),
            ),
            (
                "source.ts#expression",
                Reference::OtherSpecific("source.ts".to_string(), "expression".to_string()),
            ),
            ("", Reference::OtherComplete("".to_string())),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                Reference::from(input),
                expected,
                "Failed to parse reference: {}",
                input
            );
        }
    }

    #[test]
    fn captures_from_object_and_array() {
        let rule: RawRule = serde_json::from_str(
            r##"{"match": "(a)(b)", "captures": {"1": {"name": "first"}, "2": {"name": "second"}}}"##,
        )
        .unwrap();
        assert_eq!(rule.captures.len(), 2);
        assert_eq!(rule.captures[&1].name.as_deref(), Some("first"));

        let rule: RawRule = serde_json::from_str(
            r##"{"match": "ab", "captures": [{"name": "whole"}]}"##,
        )
        .unwrap();
        assert_eq!(rule.captures[&0].name.as_deref(), Some("whole"));
    }

    #[test]
    fn captures_skip_non_numeric_keys() {
        let rule: RawRule =
            serde_json::from_str(r##"{"captures": {"1": {"name": "ok"}, "oops": {"name": "no"}}}"##)
                .unwrap();
        assert_eq!(rule.captures.len(), 1);
    }

    #[test]
    fn repository_values_can_be_lists() {
        let grammar: RawGrammar = serde_json::from_str(
            r##"{
                "scopeName": "source.test",
                "repository": {
                    "single": {"match": "a"},
                    "list": [{"match": "b"}, {"match": "c"}]
                }
            }"##,
        )
        .unwrap();
        assert!(grammar.repository["single"].match_.is_some());
        assert_eq!(grammar.repository["list"].patterns.len(), 2);
    }

    #[test]
    fn empty_pattern_entries_are_dropped() {
        let grammar: RawGrammar = serde_json::from_str(
            r##"{
                "scopeName": "source.test",
                "repository": {
                    "block": {"begin": "#-", "end": "-#", "patterns": [{}]}
                }
            }"##,
        )
        .unwrap();
        assert!(grammar.repository["block"].patterns.is_empty());
    }
}
