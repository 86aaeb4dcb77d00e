//! The grammar interpreter: recursive descent over the resolved rule graph.
//!
//! Semantics per shape:
//! - a match rule applies its regex through the search primitive and emits one
//!   element with its capture sub-parses as children;
//! - a block rule matches `begin`, then hunts for `end` inside the remaining
//!   window (failing the whole block when `end` is missing), then fills the
//!   body by dispatching its inner patterns between the two;
//! - a patterns rule just dispatches its children, wrapping them in a single
//!   element only when it carries a scope of its own;
//! - a leaf rule assigns its scope to whatever window it was given.

mod dispatch;
mod search;

pub(crate) use dispatch::match_patterns;
pub(crate) use search::search;

use std::sync::Arc;

use crate::element::Element;
use crate::grammar::{BlockRule, LeafRule, MatchRule, PatternsRule, ROOT_RULE_ID, Rule, RuleId, RuleRef};
use crate::handler::ContentHandler;
use crate::language::Language;
use crate::registry::LanguageRegistry;
use crate::scope::Scope;

/// The result of applying a rule (or the language root) at a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    /// Elements produced, in source order.
    pub elements: Vec<Element>,
    /// The half-open window the elements cover.
    pub span: (usize, usize),
}

/// Per-parse state threaded through the interpreter.
pub(crate) struct ParseContext<'h> {
    pub handler: &'h ContentHandler,
    /// Stack of rule `name` scopes entered so far, rooted at the language
    /// scope. Consulted by injection selectors.
    pub scopes: Vec<Scope>,
    pub lookbehind_max: usize,
    pub lookbehind_step: usize,
}

/// Resolve a child reference to a concrete `(language, rule)` pair.
///
/// Cross-language references degrade to `None` (skipped candidate) when the
/// scope has not been loaded, so embedded-language grammars keep working
/// without their host.
pub(crate) fn resolve_ref(
    lang: &Arc<Language>,
    child: &RuleRef,
) -> Option<(Arc<Language>, RuleId)> {
    match child {
        RuleRef::Rule(id) => Some((lang.clone(), *id)),
        RuleRef::SelfRef => Some((lang.clone(), ROOT_RULE_ID)),
        RuleRef::Local(name) => {
            debug_assert!(false, "unlinked local reference #{name}");
            lang.repository_rule(name).map(|id| (lang.clone(), id))
        }
        RuleRef::Other(scope) => match LanguageRegistry::global().get(scope) {
            Some(other) => Some((other, ROOT_RULE_ID)),
            None => {
                log::warn!("included scope '{}' is not loaded, skipping", scope);
                None
            }
        },
        RuleRef::OtherRule(scope, name) => {
            let Some(other) = LanguageRegistry::global().get(scope) else {
                log::warn!("included scope '{}' is not loaded, skipping", scope);
                return None;
            };
            match other.repository_rule(name) {
                Some(id) => Some((other, id)),
                None => {
                    log::warn!("included parser '{}#{}' not found, skipping", scope, name);
                    None
                }
            }
        }
    }
}

/// Apply one rule at `start`, bounded by `close` when given.
/// `None` is a local failure: the caller's position is unchanged.
pub(crate) fn parse_rule(
    ctx: &mut ParseContext,
    lang: &Arc<Language>,
    id: RuleId,
    start: usize,
    close: Option<usize>,
) -> Option<Parsed> {
    let rule = lang.rule(id);

    let pushed = match rule.token() {
        Some(token) if !token.is_empty() => {
            ctx.scopes.push(Scope::new(token));
            true
        }
        _ => false,
    };

    let result = match rule {
        Rule::Match(r) => parse_match(ctx, lang, r, start, close),
        Rule::Block(r) => parse_block(ctx, lang, r, start, close),
        Rule::Patterns(r) => parse_patterns(ctx, lang, r, start, close),
        Rule::Leaf(r) => parse_leaf(ctx, r, start, close),
    };

    if pushed {
        ctx.scopes.pop();
    }
    result
}

fn parse_match(
    ctx: &mut ParseContext,
    lang: &Arc<Language>,
    rule: &MatchRule,
    start: usize,
    close: Option<usize>,
) -> Option<Parsed> {
    let read_size = close.map(|c| c.saturating_sub(start));
    let hit = search(ctx, lang, &rule.regex, start, &rule.captures, read_size, true)?;

    #[cfg(feature = "debug")]
    log::debug!(
        "[match] '{}' matched {:?} at {}",
        rule.token.as_deref().unwrap_or("<untagged>"),
        hit.matched,
        hit.start
    );

    let token = scope_token(&rule.token, &rule.comment);
    let element = Element::with_captures(token, hit.matched, hit.elements);
    Some(Parsed {
        elements: vec![element],
        span: (hit.start, hit.end),
    })
}

fn parse_block(
    ctx: &mut ParseContext,
    lang: &Arc<Language>,
    rule: &BlockRule,
    start: usize,
    close: Option<usize>,
) -> Option<Parsed> {
    let begin_size = close.map(|c| c.saturating_sub(start));
    let begin = search(ctx, lang, &rule.begin, start, &rule.begin_captures, begin_size, true)?;
    let mid_start = begin.end;

    // the end is only searched within the window the begin established;
    // missing it rejects the whole block and the begin match with it
    let end_window = close.unwrap_or_else(|| ctx.handler.end_pos());
    let Some(end) = search(
        ctx,
        lang,
        &rule.end,
        mid_start,
        &rule.end_captures,
        Some(end_window.saturating_sub(mid_start)),
        false,
    ) else {
        #[cfg(feature = "debug")]
        log::debug!(
            "[block] '{}' cannot close its end in [{mid_start}, {end_window})",
            rule.token.as_deref().unwrap_or("<untagged>")
        );
        return None;
    };
    let mid_close = end.start;
    let block_end = end.end;

    // a body identical to the scanned window would re-enter this block forever
    if start == mid_start && close == Some(mid_close) {
        let content = ctx.handler.read(mid_start, mid_close).to_string();
        return Some(Parsed {
            elements: vec![Element::new("", content)],
            span: (mid_start, mid_close),
        });
    }

    let body = if rule.patterns.is_empty() {
        Vec::new()
    } else {
        match_patterns(ctx, lang, &rule.patterns, mid_start, mid_close, false).elements
    };

    let begin_element = begin.elements.into_iter().next();
    let end_element = end.elements.into_iter().next();

    let element = if let Some(content_token) = &rule.content_token {
        Element::block(
            rule.token.clone().unwrap_or_default(),
            ctx.handler.read(mid_start, mid_close),
            Some(content_token.clone()),
            body,
            begin_element,
            end_element,
        )
    } else {
        Element::block(
            scope_token(&rule.token, &rule.comment),
            ctx.handler.read(begin.start, block_end),
            None,
            body,
            begin_element,
            end_element,
        )
    };

    Some(Parsed {
        elements: vec![element],
        span: (begin.start, block_end),
    })
}

fn parse_patterns(
    ctx: &mut ParseContext,
    lang: &Arc<Language>,
    rule: &PatternsRule,
    start: usize,
    close: Option<usize>,
) -> Option<Parsed> {
    let parsed_end = close.unwrap_or_else(|| ctx.handler.end_pos());
    let outcome = match_patterns(ctx, lang, &rule.patterns, start, parsed_end, false);

    if outcome.elements.is_empty() {
        return Some(Parsed {
            elements: Vec::new(),
            span: (start, start),
        });
    }

    if let Some(token) = &rule.token {
        let element = Element::with_captures(
            token.clone(),
            ctx.handler.read(start, outcome.cursor),
            outcome.elements,
        );
        Some(Parsed {
            elements: vec![element],
            span: (start, outcome.cursor),
        })
    } else {
        // transparent grouping
        Some(Parsed {
            elements: outcome.elements,
            span: (start, outcome.cursor),
        })
    }
}

fn parse_leaf(
    ctx: &mut ParseContext,
    rule: &LeafRule,
    start: usize,
    close: Option<usize>,
) -> Option<Parsed> {
    let token = scope_token(&rule.token, &rule.comment);
    let (content, end) = match close {
        Some(close) => (ctx.handler.read(start, close).to_string(), close),
        None => {
            log::warn!("scope-only rule applied without a close position, reading one line");
            let line = ctx.handler.read_line_from(start);
            (line.to_string(), start + line.len())
        }
    };

    Some(Parsed {
        elements: vec![Element::new(token, content)],
        span: (start, end),
    })
}

fn scope_token(token: &Option<String>, comment: &Option<String>) -> String {
    token
        .clone()
        .or_else(|| comment.clone())
        .unwrap_or_default()
}
