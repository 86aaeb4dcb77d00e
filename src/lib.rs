//! A TextMate grammar engine producing trees of scoped elements.
//!
//! Given a declarative grammar (a tree of regex-based rules describing a
//! language's lexical syntax) and an input text, the engine walks the grammar
//! graph with an Oniguruma-compatible regex engine and assembles the matches
//! into nested spans tagged with hierarchical scope names like
//! `constant.numeric.decimal.matlab`.
//!
//! # Example
//!
//! ```ignore
//! use trama::{LanguageParser, ParseOptions, RawGrammar};
//!
//! let grammar = RawGrammar::load_from_file("matlab.tmLanguage.json")?;
//! let parser = LanguageParser::new(grammar)?;
//!
//! let element = parser.parse_string("x = 0xF", &ParseOptions::default());
//! if let Some(element) = element {
//!     for leaf in element.flatten() {
//!         println!("{} -> {}", leaf.token, leaf.content);
//!     }
//! }
//! ```

#![deny(missing_docs)]

mod cache;
mod element;
mod error;
mod grammar;
mod handler;
mod language;
mod parser;
mod regex;
mod registry;
mod scope;

#[cfg(feature = "cache")]
pub use cache::FileCache;
pub use cache::{Cache, NoopCache};
pub use element::Element;
pub use error::Error;
pub use grammar::{Captures, RawGrammar, RawRule, Reference};
pub use handler::ContentHandler;
pub use language::{LanguageParser, ParseOptions};
pub use parser::Parsed;

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::{LanguageParser, RawGrammar};

    /// A small bracketed-expression grammar: letters and nestable
    /// parenthesized groups with begin/end captures.
    pub fn letters_grammar(scope: &str) -> String {
        format!(
            r##"{{
  "scopeName": "{scope}",
  "fileTypes": ["abc"],
  "patterns": [
    {{ "include": "#expression" }}
  ],
  "repository": {{
    "expression": {{
      "patterns": [
        {{ "include": "#letter" }},
        {{ "include": "#paren-expression" }}
      ]
    }},
    "letter": {{
      "match": "a|b|c",
      "name": "keyword.letter"
    }},
    "paren-expression": {{
      "begin": "\\(",
      "end": "\\)",
      "beginCaptures": {{
        "0": {{ "name": "punctuation.paren.open" }}
      }},
      "endCaptures": {{
        "0": {{ "name": "punctuation.paren.close" }}
      }},
      "name": "expression.group",
      "patterns": [
        {{ "include": "#expression" }}
      ]
    }}
  }}
}}"##
        )
    }

    pub fn parser_for(json: &str) -> LanguageParser {
        let grammar = RawGrammar::load_from_str(json).unwrap();
        LanguageParser::new(grammar).unwrap()
    }
}
