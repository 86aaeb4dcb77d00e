use serde::{Deserialize, Serialize};

/// A scoped span of parsed text.
///
/// A plain element comes from a `match` rule or a scope-only capture rule; a
/// block element (from a `begin`/`end` rule) additionally carries the elements
/// produced by its begin and end captures, and the `contentName` scope when
/// the rule declared one. Elements are immutable after construction.
///
/// `captures` holds the child elements in source order. An empty `token`
/// marks an untagged leaf (text that matched nothing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// The scope name attached to this span, `""` when untagged.
    pub token: String,
    /// The matched text.
    pub content: String,
    /// The `contentName` scope covering the inner content of a block.
    pub content_token: Option<String>,
    /// Child elements in source order.
    pub captures: Vec<Element>,
    /// The element produced by the first begin capture of a block rule.
    pub begin: Option<Box<Element>>,
    /// The element produced by the first end capture of a block rule.
    pub end: Option<Box<Element>>,
}

impl Element {
    /// A plain element with no children.
    pub fn new(token: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            content: content.into(),
            content_token: None,
            captures: Vec::new(),
            begin: None,
            end: None,
        }
    }

    /// A plain element with child elements.
    pub fn with_captures(
        token: impl Into<String>,
        content: impl Into<String>,
        captures: Vec<Element>,
    ) -> Self {
        Self {
            captures,
            ..Self::new(token, content)
        }
    }

    /// A block element with begin/end capture elements.
    pub fn block(
        token: impl Into<String>,
        content: impl Into<String>,
        content_token: Option<String>,
        captures: Vec<Element>,
        begin: Option<Element>,
        end: Option<Element>,
    ) -> Self {
        Self {
            token: token.into(),
            content: content.into(),
            content_token,
            captures,
            begin: begin.map(Box::new),
            end: end.map(Box::new),
        }
    }

    /// Whether this element came from a begin/end rule.
    pub fn is_block(&self) -> bool {
        self.begin.is_some() || self.end.is_some() || self.content_token.is_some()
    }

    /// Whether this element carries a scope name.
    pub fn is_tagged(&self) -> bool {
        !self.token.is_empty()
    }

    /// Collapse the capture tree into the leaf elements in source order.
    ///
    /// An element with children contributes its begin element, its captures
    /// recursively, then its end element; an element without children
    /// contributes itself.
    pub fn flatten(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'e>(&'e self, out: &mut Vec<&'e Element>) {
        if self.captures.is_empty() && self.begin.is_none() && self.end.is_none() {
            out.push(self);
            return;
        }
        if let Some(begin) = &self.begin {
            begin.collect_leaves(out);
        }
        for child in &self.captures {
            child.collect_leaves(out);
        }
        if let Some(end) = &self.end {
            end.collect_leaves(out);
        }
    }

    /// Visit every element pre-order, in source order.
    pub fn walk<F: FnMut(&Element)>(&self, f: &mut F) {
        f(self);
        if let Some(begin) = &self.begin {
            begin.walk(f);
        }
        for child in &self.captures {
            child.walk(f);
        }
        if let Some(end) = &self.end {
            end.walk(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Element {
        Element::block(
            "expression.group",
            "(ab)",
            None,
            vec![Element::with_captures(
                "keyword.pair",
                "ab",
                vec![Element::new("keyword.letter", "a"), Element::new("keyword.letter", "b")],
            )],
            Some(Element::new("punctuation.open", "(")),
            Some(Element::new("punctuation.close", ")")),
        )
    }

    #[test]
    fn flatten_yields_leaves_in_source_order() {
        let block = sample_block();
        let leaves: Vec<_> = block.flatten().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(leaves, vec!["(", "a", "b", ")"]);
    }

    #[test]
    fn walk_visits_parents_before_children() {
        let block = sample_block();
        let mut tokens = Vec::new();
        block.walk(&mut |e| tokens.push(e.token.clone()));
        assert_eq!(
            tokens,
            vec![
                "expression.group",
                "punctuation.open",
                "keyword.pair",
                "keyword.letter",
                "keyword.letter",
                "punctuation.close"
            ]
        );
    }

    #[test]
    fn block_detection() {
        assert!(sample_block().is_block());
        assert!(!Element::new("keyword.letter", "a").is_block());
        assert!(!Element::new("", "x").is_tagged());
    }
}
