mod injections;
mod raw;
mod rule;

pub use raw::{Captures, RawGrammar, RawRule, Reference};

pub(crate) use injections::{InjectionPrecedence, InjectionSelector, parse_injection_selector};
pub(crate) use rule::{
    BlockRule, CaptureMap, LeafRule, MatchRule, PatternsRule, ROOT_RULE_ID, Rule, RuleGraph,
    RuleId, RuleRef,
};
