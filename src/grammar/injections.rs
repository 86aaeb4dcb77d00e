//! Injection selector parsing and scope-stack filtering.
//!
//! Selector keys look like `L:target.scope - except.one - except.two`. The
//! target names the language receiving the injection (empty = the owning
//! language); each `-` clause names a scope under which the injection must
//! stay inactive.

use crate::scope::Scope;

/// Where an injection slots into the dispatcher's candidate order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum InjectionPrecedence {
    /// `L:` prefix, tried before the rule's own children
    Left,
    /// `R:` prefix (and unprefixed selectors), tried after
    Right,
}

/// A parsed injection selector.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InjectionSelector {
    pub precedence: InjectionPrecedence,
    /// Scope name of the language to inject into, `None` for the owner.
    pub target: Option<String>,
    /// Scopes under which the injection is withheld.
    pub except: Vec<Scope>,
}

impl InjectionSelector {
    /// Whether the injection applies given the active scope stack.
    pub fn matches(&self, scopes: &[Scope]) -> bool {
        !self
            .except
            .iter()
            .any(|except| scopes.iter().any(|active| except.is_prefix_of(*active)))
    }
}

/// Parse an injection selector key.
pub(crate) fn parse_injection_selector(selector: &str) -> InjectionSelector {
    let mut rest = selector.trim();

    let precedence = if let Some(stripped) = rest.strip_prefix("L:") {
        rest = stripped;
        InjectionPrecedence::Left
    } else if let Some(stripped) = rest.strip_prefix("R:") {
        rest = stripped;
        InjectionPrecedence::Right
    } else {
        InjectionPrecedence::Right
    };

    let mut clauses = rest.split('-').map(str::trim);
    let target = match clauses.next() {
        Some("") | None => None,
        Some(t) => Some(t.to_string()),
    };
    let except = clauses
        .map(Scope::new)
        .filter(|scope| !scope.is_empty())
        .collect();

    InjectionSelector {
        precedence,
        target,
        except,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_target() {
        let sel = parse_injection_selector("source.matlab");
        assert_eq!(sel.precedence, InjectionPrecedence::Right);
        assert_eq!(sel.target.as_deref(), Some("source.matlab"));
        assert!(sel.except.is_empty());
    }

    #[test]
    fn left_precedence_with_excepts() {
        let sel = parse_injection_selector("L:source.matlab - comment - string.quoted");
        assert_eq!(sel.precedence, InjectionPrecedence::Left);
        assert_eq!(sel.target.as_deref(), Some("source.matlab"));
        assert_eq!(sel.except.len(), 2);
        assert_eq!(sel.except[0].build_string(), "comment");
        assert_eq!(sel.except[1].build_string(), "string.quoted");
    }

    #[test]
    fn empty_target_defaults_to_owner() {
        let sel = parse_injection_selector("L: - comment");
        assert_eq!(sel.target, None);
        assert_eq!(sel.except.len(), 1);
    }

    #[test]
    fn except_scopes_filter_by_prefix() {
        let sel = parse_injection_selector("source.x - comment");
        assert!(sel.matches(&[Scope::new("source.x")]));
        assert!(!sel.matches(&[Scope::new("source.x"), Scope::new("comment.line.matlab")]));
        // "comment" must be a dotted prefix, not a string prefix
        assert!(sel.matches(&[Scope::new("commentary.note")]));
    }
}
