use std::path::Path;
use std::sync::{Arc, RwLock, Weak};

use crate::cache::{Cache, NoopCache};
use crate::element::Element;
use crate::error::{Error, TramaResult};
use crate::grammar::{
    InjectionPrecedence, InjectionSelector, ROOT_RULE_ID, RawGrammar, Rule, RuleGraph, RuleId,
    parse_injection_selector,
};
use crate::handler::ContentHandler;
use crate::parser::{ParseContext, Parsed, match_patterns};
use crate::registry::LanguageRegistry;
use crate::scope::Scope;

/// One resolved language: its rule arena, flattened repository and the
/// injections other languages (or itself) have attached to it.
///
/// Rules and repository are frozen once built; the injection list is
/// append-only during setup and read-only afterwards.
pub(crate) struct Language {
    pub name: String,
    pub scope_name: String,
    pub uuid: String,
    pub file_types: Vec<String>,
    graph: RuleGraph,
    injections: RwLock<Vec<Injection>>,
}

/// An injection rule attached to a target language. The rule itself lives in
/// the arena of the language that declared it (`home`).
pub(crate) struct Injection {
    pub selector: InjectionSelector,
    pub home: Weak<Language>,
    pub rule: RuleId,
}

impl Language {
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.graph.rules[*id as usize]
    }

    pub fn repository_rule(&self, name: &str) -> Option<RuleId> {
        self.graph.repository.get(name).copied()
    }

    pub fn add_injection(&self, injection: Injection) {
        self.injections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(injection);
    }

    /// The injections applicable under the given scope stack.
    pub fn active_injections(
        &self,
        scopes: &[Scope],
    ) -> Vec<(InjectionPrecedence, Arc<Language>, RuleId)> {
        let injections = self.injections.read().unwrap_or_else(|e| e.into_inner());
        injections
            .iter()
            .filter(|injection| injection.selector.matches(scopes))
            .filter_map(|injection| {
                injection
                    .home
                    .upgrade()
                    .map(|home| (injection.selector.precedence, home, injection.rule))
            })
            .collect()
    }
}

/// Options accepted by the parse entry points.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Return after the first successful alternative at the start position.
    pub find_one: bool,
    /// How far a lookbehind-carrying search may grow backward, in bytes.
    pub lookbehind_max: usize,
    /// Backward step of the lookbehind growth, in bytes.
    pub lookbehind_step: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            find_one: false,
            lookbehind_max: 100,
            lookbehind_step: 5,
        }
    }
}

/// The parser of a language grammar.
///
/// Building one compiles the grammar into a rule graph and registers the
/// language in the process-wide registry under its `scopeName`, making it
/// available to cross-language includes from other grammars.
pub struct LanguageParser {
    language: Arc<Language>,
    cache: Box<dyn Cache>,
}

impl LanguageParser {
    /// Build a language from its in-memory grammar tree.
    pub fn new(grammar: RawGrammar) -> Result<Self, Error> {
        let mut graph = RuleGraph::default();
        graph.compile_root(&grammar)?;

        // injection rules compile before linking so their #refs resolve too
        let mut pending = Vec::with_capacity(grammar.injections.len());
        for (key, raw_rule) in &grammar.injections {
            let selector = parse_injection_selector(key);
            let rule = graph.compile_rule(raw_rule)?;
            pending.push((selector, rule));
        }

        graph.link()?;

        let language = Arc::new(Language {
            name: grammar.name.clone(),
            scope_name: grammar.scope_name.clone(),
            uuid: grammar.uuid.clone(),
            file_types: grammar.file_types.clone(),
            graph,
            injections: RwLock::new(Vec::new()),
        });

        LanguageRegistry::global().register(&language.scope_name, language.clone());

        for (selector, rule) in pending {
            let target = match selector.target.as_deref() {
                Some(scope) if scope != language.scope_name => {
                    match LanguageRegistry::global().get(scope) {
                        Some(target) => target,
                        None => {
                            log::warn!("injection target '{}' is not loaded, skipping", scope);
                            continue;
                        }
                    }
                }
                _ => language.clone(),
            };
            target.add_injection(Injection {
                selector,
                home: Arc::downgrade(&language),
                rule,
            });
        }

        Ok(Self {
            language,
            cache: Box::new(NoopCache),
        })
    }

    /// The language's human-readable name.
    pub fn name(&self) -> &str {
        &self.language.name
    }

    /// The language's `scopeName`.
    pub fn scope_name(&self) -> &str {
        &self.language.scope_name
    }

    /// The grammar's `uuid`, empty when the grammar file carried none.
    pub fn uuid(&self) -> &str {
        &self.language.uuid
    }

    /// File extensions accepted by [`parse_file`](Self::parse_file).
    pub fn file_types(&self) -> &[String] {
        &self.language.file_types
    }

    /// Replace the element cache consulted by [`parse_file`](Self::parse_file).
    pub fn set_cache(&mut self, cache: Box<dyn Cache>) {
        self.cache = cache;
    }

    /// Low-level entry: dispatch the language root over `[start, end)`.
    ///
    /// Returns the matched elements (empty when nothing matched) and the
    /// covered span. Exposed for testing against grammar fixtures.
    pub fn parse(
        &self,
        handler: &ContentHandler,
        start: usize,
        options: &ParseOptions,
    ) -> Parsed {
        let mut ctx = ParseContext {
            handler,
            scopes: vec![Scope::new(&self.language.scope_name)],
            lookbehind_max: options.lookbehind_max,
            lookbehind_step: options.lookbehind_step,
        };

        let patterns: &[_] = match self.language.rule(ROOT_RULE_ID) {
            Rule::Patterns(root) => &root.patterns,
            // a grammar without root patterns matches nothing
            _ => &[],
        };

        let outcome = match_patterns(
            &mut ctx,
            &self.language,
            patterns,
            start,
            handler.end_pos(),
            options.find_one,
        );
        Parsed {
            elements: outcome.elements,
            span: (start, outcome.cursor),
        }
    }

    /// Parse an input string into a single root element scoped with the
    /// language `scopeName`. `None` for empty input.
    pub fn parse_string(&self, input: &str, options: &ParseOptions) -> Option<Element> {
        let handler = ContentHandler::from_string(input);
        self.parse_handler(&handler, options)
    }

    /// Parse a whole file, going through the cache when it is current.
    ///
    /// Fails with [`Error::IncompatibleFileType`] when the file extension is
    /// not one of the grammar's `fileTypes`. `None` for an empty file.
    pub fn parse_file(
        &self,
        path: impl AsRef<Path>,
        options: &ParseOptions,
    ) -> TramaResult<Option<Element>> {
        let path = path.as_ref();

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !self.language.file_types.iter().any(|ft| ft == extension) {
            return Err(Error::IncompatibleFileType {
                extensions: self.language.file_types.clone(),
            });
        }

        if self.cache.cache_valid(path) {
            if let Some(element) = self.cache.load(path) {
                return Ok(Some(element));
            }
        }

        let handler = ContentHandler::from_path(path)?;
        let element = self.parse_handler(&handler, options);
        if let Some(element) = &element {
            self.cache.save(path, element);
        }
        Ok(element)
    }

    fn parse_handler(&self, handler: &ContentHandler, options: &ParseOptions) -> Option<Element> {
        if handler.is_empty() {
            return None;
        }
        let parsed = self.parse(handler, 0, options);
        Some(Element::with_captures(
            self.language.scope_name.clone(),
            handler.source(),
            parsed.elements,
        ))
    }
}
