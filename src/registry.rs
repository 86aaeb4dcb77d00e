//! Process-wide language registry.
//!
//! Cross-language includes (`scope.name`, `scope.name#entry`) resolve against
//! this map lazily at dispatch time. Registration happens once per language
//! at construction; after setup the map is only read, so lookups take a
//! pinned guard and never lock.

use std::sync::{Arc, LazyLock};

use crate::language::Language;

/// Mapping from `scopeName` to the language built for it.
pub(crate) struct LanguageRegistry {
    languages: papaya::HashMap<String, Arc<Language>>,
}

impl LanguageRegistry {
    /// The registry shared by every parser in the process.
    pub fn global() -> &'static LanguageRegistry {
        static GLOBAL: LazyLock<LanguageRegistry> = LazyLock::new(|| LanguageRegistry {
            languages: papaya::HashMap::new(),
        });
        &GLOBAL
    }

    /// Register a language under its scope name, replacing any previous one.
    pub fn register(&self, scope_name: &str, language: Arc<Language>) {
        self.languages
            .pin()
            .insert(scope_name.to_string(), language);
    }

    /// Look up a language by scope name.
    pub fn get(&self, scope_name: &str) -> Option<Arc<Language>> {
        self.languages.pin().get(scope_name).cloned()
    }
}
