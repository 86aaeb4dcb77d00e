//! The rule dispatcher: picks the winning alternative at each position.
//!
//! Ordering policy: smallest match start wins, ties go to the largest match
//! end, remaining ties to the earliest candidate. Each candidate's last
//! result is memoized and reused while the cursor has not moved past its
//! start; a candidate regex scans forward from the cursor, so its result
//! stays valid until then. Without the memo, dispatch is quadratic in rules
//! times window length.

use std::sync::Arc;

use crate::element::Element;
use crate::grammar::{InjectionPrecedence, RuleId, RuleRef};
use crate::language::Language;
use crate::parser::{ParseContext, Parsed, parse_rule, resolve_ref};

/// What a dispatch run produced: the accumulated elements and the cursor
/// position after the last winner.
#[derive(Debug, Clone)]
pub(crate) struct DispatchOutcome {
    pub elements: Vec<Element>,
    pub cursor: usize,
}

/// Find patterns between a starting and closing position.
///
/// `find_one` makes the dispatcher return after the first successful
/// alternative instead of scanning the whole window.
pub(crate) fn match_patterns(
    ctx: &mut ParseContext,
    lang: &Arc<Language>,
    patterns: &[RuleRef],
    start: usize,
    close: usize,
    find_one: bool,
) -> DispatchOutcome {
    let candidates = collect_candidates(ctx, lang, patterns);
    let count = candidates.len();

    let mut memo: Vec<Option<Parsed>> = vec![None; count];
    let mut dead_at: Vec<Option<usize>> = vec![None; count];
    let mut elements = Vec::new();
    let mut cursor = start;

    while cursor < close {
        let mut best: Option<usize> = None;

        for i in 0..count {
            let cached = memo[i]
                .as_ref()
                .is_some_and(|parsed| parsed.span.0 >= cursor);
            if !cached {
                memo[i] = None;
                if dead_at[i] == Some(cursor) {
                    continue;
                }
                let (candidate_lang, id) = &candidates[i];
                match parse_rule(ctx, candidate_lang, *id, cursor, Some(close)) {
                    Some(parsed) if !parsed.elements.is_empty() => memo[i] = Some(parsed),
                    // misses and empty successes contribute nothing here
                    _ => {
                        dead_at[i] = Some(cursor);
                        continue;
                    }
                }
            }

            let span = memo[i].as_ref().unwrap().span;
            best = match best {
                None => Some(i),
                Some(j) => {
                    let best_span = memo[j].as_ref().unwrap().span;
                    if span.0 < best_span.0 || (span.0 == best_span.0 && span.1 > best_span.1) {
                        Some(i)
                    } else {
                        Some(j)
                    }
                }
            };
        }

        let Some(winner) = best else {
            break;
        };
        let parsed = memo[winner].take().unwrap();

        #[cfg(feature = "debug")]
        log::debug!(
            "[dispatch] candidate {winner} won [{}, {}) with {} element(s)",
            parsed.span.0,
            parsed.span.1,
            parsed.elements.len()
        );

        elements.extend(parsed.elements);

        let previous = cursor;
        cursor = parsed.span.1;
        // a zero-width winner sitting at the cursor would never let it advance
        if parsed.span.0 == parsed.span.1 && cursor == previous {
            cursor = ctx.handler.ceil_char_boundary(cursor + 1);
        }

        if find_one {
            break;
        }
    }

    DispatchOutcome { elements, cursor }
}

/// The candidate set: left-precedence injections, then the rule's own
/// children, then the remaining injections. Injections not matching the
/// active scope stack are withheld; unresolvable references are skipped.
fn collect_candidates(
    ctx: &ParseContext,
    lang: &Arc<Language>,
    patterns: &[RuleRef],
) -> Vec<(Arc<Language>, RuleId)> {
    let injections = lang.active_injections(&ctx.scopes);

    let mut candidates = Vec::with_capacity(patterns.len() + injections.len());
    for (precedence, home, id) in &injections {
        if *precedence == InjectionPrecedence::Left {
            candidates.push((home.clone(), *id));
        }
    }
    for child in patterns {
        if let Some(candidate) = resolve_ref(lang, child) {
            candidates.push(candidate);
        }
    }
    for (precedence, home, id) in injections {
        if precedence == InjectionPrecedence::Right {
            candidates.push((home, id));
        }
    }

    candidates
}
