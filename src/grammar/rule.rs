use std::collections::HashMap;
use std::ops::Deref;

use crate::error::{Error, TramaResult};
use crate::grammar::raw::{Captures, RawGrammar, RawRule, Reference};
use crate::regex::Regex;

/// Index into a language's rule arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) struct RuleId(pub u16);

impl Deref for RuleId {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The language root is always the first compiled rule.
pub(crate) const ROOT_RULE_ID: RuleId = RuleId(0);

/// A child rule reference as seen by the dispatcher.
///
/// `Local` only exists between compilation and the link pass; afterwards every
/// local reference is a plain `Rule` id. Cross-language references stay
/// symbolic and resolve lazily through the registry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RuleRef {
    Rule(RuleId),
    SelfRef,
    Local(String),
    Other(String),
    OtherRule(String, String),
}

/// Capture-group sub-grammars, ascending by group index.
pub(crate) type CaptureMap = Vec<(usize, RuleRef)>;

#[derive(Debug, Clone)]
pub(crate) struct MatchRule {
    pub token: Option<String>,
    pub comment: Option<String>,
    pub regex: Regex,
    pub captures: CaptureMap,
}

#[derive(Debug, Clone)]
pub(crate) struct BlockRule {
    pub token: Option<String>,
    pub content_token: Option<String>,
    pub comment: Option<String>,
    pub begin: Regex,
    pub end: Regex,
    pub begin_captures: CaptureMap,
    pub end_captures: CaptureMap,
    pub patterns: Vec<RuleRef>,
}

#[derive(Debug, Clone)]
pub(crate) struct PatternsRule {
    pub token: Option<String>,
    pub patterns: Vec<RuleRef>,
}

#[derive(Debug, Clone)]
pub(crate) struct LeafRule {
    pub token: Option<String>,
    pub comment: Option<String>,
}

/// A resolved grammar rule, dispatched on by shape.
#[derive(Debug, Clone)]
pub(crate) enum Rule {
    Match(MatchRule),
    Block(BlockRule),
    Patterns(PatternsRule),
    Leaf(LeafRule),
}

impl Rule {
    /// The rule's `name` scope, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Rule::Match(r) => r.token.as_deref(),
            Rule::Block(r) => r.token.as_deref(),
            Rule::Patterns(r) => r.token.as_deref(),
            Rule::Leaf(r) => r.token.as_deref(),
        }
    }
}

/// The compiled rule arena of one language, plus its flattened repository.
#[derive(Debug, Default)]
pub(crate) struct RuleGraph {
    pub rules: Vec<Rule>,
    pub repository: HashMap<String, RuleId>,
}

impl RuleGraph {
    /// Compile the grammar's root patterns and every repository entry found
    /// anywhere in the tree. Local references stay symbolic until `link`.
    pub fn compile_root(&mut self, grammar: &RawGrammar) -> TramaResult<()> {
        let root = RawRule {
            patterns: grammar.patterns.clone(),
            ..Default::default()
        };
        let root_id = self.compile_rule(&root)?;
        debug_assert_eq!(root_id, ROOT_RULE_ID);

        for (name, raw_rule) in collect_repositories(grammar) {
            let id = self.compile_rule(raw_rule)?;
            // later (more deeply nested) definitions shadow earlier ones
            self.repository.insert(name.to_string(), id);
        }

        Ok(())
    }

    /// Compile one rule into the arena, returning its id.
    pub fn compile_rule(&mut self, raw_rule: &RawRule) -> TramaResult<RuleId> {
        let id = self.reserve_id();
        let rule = self.build_rule(raw_rule)?;
        self.rules[*id as usize] = rule;
        Ok(id)
    }

    /// Claim the next arena index. Building a rule compiles its sub-rules,
    /// which take arena slots of their own, so a rule's index is fixed before
    /// its children exist and the slot is filled in afterwards.
    fn reserve_id(&mut self) -> RuleId {
        let id = RuleId(self.rules.len() as u16);
        self.rules.push(Rule::Leaf(LeafRule {
            token: None,
            comment: None,
        }));
        id
    }

    fn build_rule(&mut self, raw_rule: &RawRule) -> TramaResult<Rule> {
        let token = raw_rule.name.clone();
        let comment = raw_rule.comment.clone();

        let rule = match (&raw_rule.match_, &raw_rule.begin, &raw_rule.end) {
            (Some(pattern), _, _) => {
                let regex = compile_regex(pattern)?;
                let captures = self.compile_captures(&raw_rule.captures, &regex)?;
                Rule::Match(MatchRule {
                    token,
                    comment,
                    regex,
                    captures,
                })
            }
            (None, Some(begin_pattern), Some(end_pattern)) => {
                let begin = compile_regex(begin_pattern)?;
                let end = compile_regex(end_pattern)?;
                let begin_captures = self.compile_captures(&raw_rule.begin_captures, &begin)?;
                let end_captures = self.compile_captures(&raw_rule.end_captures, &end)?;
                let patterns = self.compile_children(&raw_rule.patterns)?;
                Rule::Block(BlockRule {
                    token,
                    content_token: raw_rule.content_name.clone(),
                    comment,
                    begin,
                    end,
                    begin_captures,
                    end_captures,
                    patterns,
                })
            }
            (None, Some(begin_pattern), None) => {
                // some published grammars ship a begin with no closing end;
                // the opening regex still works as an ordinary match rule
                let regex = compile_regex(begin_pattern)?;
                let captures = self.compile_captures(&raw_rule.begin_captures, &regex)?;
                Rule::Match(MatchRule {
                    token,
                    comment,
                    regex,
                    captures,
                })
            }
            _ if !raw_rule.patterns.is_empty() => {
                let patterns = self.compile_children(&raw_rule.patterns)?;
                Rule::Patterns(PatternsRule { token, patterns })
            }
            // scope-only rule, reads whatever window it is assigned
            _ => Rule::Leaf(LeafRule { token, comment }),
        };

        Ok(rule)
    }

    fn compile_children(&mut self, rules: &[RawRule]) -> TramaResult<Vec<RuleRef>> {
        rules.iter().map(|r| self.compile_child(r)).collect()
    }

    fn compile_child(&mut self, raw_rule: &RawRule) -> TramaResult<RuleRef> {
        // every other field is ignored when an include is present
        if let Some(reference) = &raw_rule.include {
            Ok(match reference {
                Reference::Self_ => RuleRef::SelfRef,
                Reference::Local(name) => RuleRef::Local(name.clone()),
                Reference::OtherComplete(scope) => RuleRef::Other(scope.clone()),
                Reference::OtherSpecific(scope, name) => {
                    RuleRef::OtherRule(scope.clone(), name.clone())
                }
            })
        } else {
            Ok(RuleRef::Rule(self.compile_rule(raw_rule)?))
        }
    }

    fn compile_captures(
        &mut self,
        captures: &Captures,
        regex: &Regex,
    ) -> TramaResult<CaptureMap> {
        if captures.is_empty() {
            return Ok(Vec::new());
        }

        if captures.contains_key(&0) && captures.len() > 1 {
            return Err(Error::RegexGroupsMismatch {
                pattern: regex.pattern().to_string(),
                group: 0,
            });
        }

        // validate() has passed, so the count is available
        let group_count = regex.group_count().unwrap_or(0);

        let mut out = Vec::with_capacity(captures.len());
        for (&group, raw_rule) in captures.iter() {
            if group > group_count {
                return Err(Error::RegexGroupsMismatch {
                    pattern: regex.pattern().to_string(),
                    group,
                });
            }
            out.push((group, self.compile_child(raw_rule)?));
        }

        Ok(out)
    }

    /// Replace every `Local` reference with its repository rule id.
    pub fn link(&mut self) -> TramaResult<()> {
        let repository = std::mem::take(&mut self.repository);

        let mut result = Ok(());
        'rules: for rule in &mut self.rules {
            let (patterns, captures): (Option<&mut Vec<RuleRef>>, Vec<&mut CaptureMap>) =
                match rule {
                    Rule::Match(r) => (None, vec![&mut r.captures]),
                    Rule::Block(r) => (
                        Some(&mut r.patterns),
                        vec![&mut r.begin_captures, &mut r.end_captures],
                    ),
                    Rule::Patterns(r) => (Some(&mut r.patterns), vec![]),
                    Rule::Leaf(_) => (None, vec![]),
                };

            let children = patterns
                .into_iter()
                .flatten()
                .chain(captures.into_iter().flatten().map(|(_, child)| child));
            for child in children {
                if let RuleRef::Local(name) = child {
                    match repository.get(name.as_str()) {
                        Some(id) => *child = RuleRef::Rule(*id),
                        None => {
                            result = Err(Error::IncludedParserNotFound(name.clone()));
                            break 'rules;
                        }
                    }
                }
            }
        }

        self.repository = repository;
        result
    }
}

fn compile_regex(pattern: &str) -> TramaResult<Regex> {
    let regex = Regex::new(pattern.to_string());
    if let Err(err) = regex.validate() {
        return Err(Error::Regex {
            pattern: pattern.to_string(),
            message: err.to_string(),
        });
    }
    Ok(regex)
}

/// Every `(name, rule)` repository entry anywhere in the grammar tree, in
/// document order so deeper definitions shadow shallower ones on collision.
fn collect_repositories(grammar: &RawGrammar) -> Vec<(&String, &RawRule)> {
    let mut out = Vec::new();
    for (name, rule) in &grammar.repository {
        out.push((name, rule));
        collect_nested(rule, &mut out);
    }
    for rule in &grammar.patterns {
        collect_nested(rule, &mut out);
    }
    for rule in grammar.injections.values() {
        collect_nested(rule, &mut out);
    }
    out
}

fn collect_nested<'g>(rule: &'g RawRule, out: &mut Vec<(&'g String, &'g RawRule)>) {
    for (name, nested) in &rule.repository {
        out.push((name, nested));
        collect_nested(nested, out);
    }
    for child in &rule.patterns {
        collect_nested(child, out);
    }
    for captures in [&rule.captures, &rule.begin_captures, &rule.end_captures] {
        for nested in captures.values() {
            collect_nested(nested, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_for(json: &str) -> TramaResult<RuleGraph> {
        let grammar = RawGrammar::load_from_str(json).unwrap();
        let mut graph = RuleGraph::default();
        graph.compile_root(&grammar)?;
        graph.link()?;
        Ok(graph)
    }

    #[test]
    fn shapes_are_detected() {
        let graph = graph_for(
            r##"{
                "scopeName": "source.test",
                "patterns": [
                    {"match": "a", "name": "m"},
                    {"begin": "\\(", "end": "\\)", "name": "b"},
                    {"patterns": [{"match": "c"}]},
                    {"name": "scope.only"}
                ]
            }"##,
        )
        .unwrap();

        let Rule::Patterns(root) = &graph.rules[*ROOT_RULE_ID as usize] else {
            panic!("root must be a patterns rule");
        };
        assert_eq!(root.patterns.len(), 4);

        let shapes: Vec<_> = root
            .patterns
            .iter()
            .map(|r| match r {
                RuleRef::Rule(id) => match &graph.rules[**id as usize] {
                    Rule::Match(_) => "match",
                    Rule::Block(_) => "block",
                    Rule::Patterns(_) => "patterns",
                    Rule::Leaf(_) => "leaf",
                },
                _ => "ref",
            })
            .collect();
        assert_eq!(shapes, vec!["match", "block", "patterns", "leaf"]);
    }

    #[test]
    fn begin_without_end_becomes_match() {
        let graph = graph_for(
            r##"{"scopeName": "s", "patterns": [{"begin": "x", "name": "odd"}]}"##,
        )
        .unwrap();
        assert!(matches!(&graph.rules[1], Rule::Match(_)));
    }

    #[test]
    fn nested_repositories_are_flattened() {
        let graph = graph_for(
            r##"{
                "scopeName": "source.test",
                "patterns": [{"include": "#inner"}],
                "repository": {
                    "outer": {
                        "patterns": [{"include": "#inner"}],
                        "repository": {
                            "inner": {"match": "i", "name": "nested"}
                        }
                    }
                }
            }"##,
        )
        .unwrap();
        assert!(graph.repository.contains_key("outer"));
        assert!(graph.repository.contains_key("inner"));
    }

    #[test]
    fn missing_include_fails_linking() {
        let err = graph_for(
            r##"{"scopeName": "s", "patterns": [{"include": "#nowhere"}]}"##,
        )
        .unwrap_err();
        assert!(matches!(err, Error::IncludedParserNotFound(name) if name == "nowhere"));
    }

    #[test]
    fn out_of_range_capture_group() {
        let err = graph_for(
            r##"{"scopeName": "s", "patterns": [
                {"match": "(a)", "captures": {"2": {"name": "no"}}}
            ]}"##,
        )
        .unwrap_err();
        assert!(matches!(err, Error::RegexGroupsMismatch { group: 2, .. }));
    }

    #[test]
    fn whole_match_capture_must_be_alone() {
        let err = graph_for(
            r##"{"scopeName": "s", "patterns": [
                {"match": "(a)", "captures": {"0": {"name": "w"}, "1": {"name": "g"}}}
            ]}"##,
        )
        .unwrap_err();
        assert!(matches!(err, Error::RegexGroupsMismatch { group: 0, .. }));
    }

    #[test]
    fn invalid_regex_fails_construction() {
        let err = graph_for(r##"{"scopeName": "s", "patterns": [{"match": "(unclosed"}]}"##)
            .unwrap_err();
        assert!(matches!(err, Error::Regex { .. }));
    }

    #[test]
    fn cross_language_references_stay_symbolic() {
        let graph = graph_for(
            r##"{"scopeName": "s", "patterns": [
                {"include": "source.other"},
                {"include": "source.other#entry"},
                {"include": "$self"}
            ]}"##,
        )
        .unwrap();
        let Rule::Patterns(root) = &graph.rules[0] else { panic!() };
        assert_eq!(root.patterns[0], RuleRef::Other("source.other".into()));
        assert_eq!(
            root.patterns[1],
            RuleRef::OtherRule("source.other".into(), "entry".into())
        );
        assert_eq!(root.patterns[2], RuleRef::SelfRef);
    }
}
