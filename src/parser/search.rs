//! The search primitive: applies one regex at a position.
//!
//! Two scanning modes. Windowed mode (`read_size` given) reads the window,
//! splits it into physical lines and returns the first line containing a
//! match. Line mode reads exactly one line from the position; a match there
//! can be rejected when anything before it on the line is not a space.
//!
//! When the pattern contains a lookbehind, a miss retries the whole scan from
//! a position shifted backward in fixed steps, up to a bounded distance and
//! never past the buffer start. Patterns without a lookbehind get one pass.

use std::borrow::Cow;
use std::sync::Arc;

use crate::element::Element;
use crate::grammar::CaptureMap;
use crate::language::Language;
use crate::parser::{ParseContext, parse_rule, resolve_ref};
use crate::regex::{Regex, RegexMatch};

/// A successful search: the matched text, the elements assembled from the
/// capture parsers, and the absolute match span.
#[derive(Debug, Clone)]
pub(crate) struct SearchHit {
    pub matched: String,
    pub elements: Vec<Element>,
    pub start: usize,
    pub end: usize,
}

pub(crate) fn search(
    ctx: &mut ParseContext,
    lang: &Arc<Language>,
    regex: &Regex,
    pos: usize,
    captures: &CaptureMap,
    read_size: Option<usize>,
    only_leading_whitespace: bool,
) -> Option<SearchHit> {
    let handler = ctx.handler;
    let perform_lookbehind = regex.has_lookbehind();
    let step = ctx.lookbehind_step.max(1);
    let mut lookbehind = 0usize;

    // Growing backward only supplies lookbehind context: every scan starts at
    // the line offset corresponding to `pos`, so a match never begins before
    // the position being scanned.
    let (base, m) = loop {
        let search_from = handler.floor_char_boundary(pos.saturating_sub(lookbehind));

        let attempt = if let Some(size) = read_size {
            let window_close = pos.saturating_add(size).min(handler.end_pos());
            let window = handler.read(search_from, window_close);

            let mut line_offset = 0;
            let mut hit = None;
            for line in lines_of(window) {
                let line_base = search_from + line_offset;
                line_offset += line.len();

                let from = pos.saturating_sub(line_base);
                if from > line.len() {
                    // the line lies entirely before the scanned position
                    continue;
                }
                if let Some(m) = regex.search_at(&line, from) {
                    hit = Some((line_base, m));
                    break;
                }
            }
            hit
        } else {
            let line = handler.read_line_from(search_from);
            let from = pos.saturating_sub(search_from);
            if from > line.len() {
                None
            } else {
                match regex.search_at(line, from) {
                    Some(m)
                        if only_leading_whitespace
                            && line[..m.start].chars().any(|c| c != ' ') =>
                    {
                        None
                    }
                    Some(m) => Some((search_from, m)),
                    None => None,
                }
            }
        };

        if let Some(found) = attempt {
            break found;
        }
        if !perform_lookbehind || search_from == 0 {
            return None;
        }
        lookbehind += step;
        if lookbehind > ctx.lookbehind_max {
            return None;
        }
    };

    let start = base + m.start;
    let end = (base + m.end).min(handler.end_pos());
    let matched = handler.read(start, end).to_string();

    let elements = assemble_captures(ctx, lang, captures, base, &m, &matched)?;

    Some(SearchHit {
        matched,
        elements,
        start,
        end,
    })
}

/// Run the capture parsers over the match's groups.
/// `None` when a required group parser fails, failing the whole search.
fn assemble_captures(
    ctx: &mut ParseContext,
    lang: &Arc<Language>,
    captures: &CaptureMap,
    base: usize,
    m: &RegexMatch,
    matched: &str,
) -> Option<Vec<Element>> {
    // a parser on group 0 claims the whole match, nothing recurses
    if let Some((_, whole)) = captures.iter().find(|(group, _)| *group == 0) {
        let token = resolve_ref(lang, whole)
            .and_then(|(capture_lang, id)| {
                capture_lang.rule(id).token().map(|t| t.to_string())
            })
            .unwrap_or_default();
        return Some(vec![Element::new(token, matched)]);
    }

    let mut elements = Vec::new();
    for (group, child) in captures {
        let Some((group_start, group_end)) = m.group(*group) else {
            continue;
        };
        if group_start == group_end {
            continue;
        }
        let Some((capture_lang, id)) = resolve_ref(lang, child) else {
            continue;
        };
        let sub = parse_rule(
            ctx,
            &capture_lang,
            id,
            base + group_start,
            Some(base + group_end),
        )?;
        elements.extend(sub.elements);
    }

    Some(elements)
}

/// Split a window into physical lines, each keeping its `\n`. A window cut
/// mid-line gets a synthetic newline so anchored patterns still see one.
fn lines_of(window: &str) -> impl Iterator<Item = Cow<'_, str>> {
    window.split_inclusive('\n').map(|line| {
        if line.ends_with('\n') {
            Cow::Borrowed(line)
        } else {
            Cow::Owned(format!("{line}\n"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_lines_keep_newlines() {
        let lines: Vec<_> = lines_of("ab\ncd\n").collect();
        assert_eq!(lines, vec!["ab\n", "cd\n"]);
    }

    #[test]
    fn cut_line_gets_synthetic_newline() {
        let lines: Vec<_> = lines_of("ab\ncd").collect();
        assert_eq!(lines, vec!["ab\n", "cd\n"]);
        assert!(lines_of("").next().is_none());
    }
}
