//! Thread-local parser pooling.
//!
//! Each worker thread keeps one tree-sitter parser per grammar, created on
//! first use and reused for every later file in that language.

use crate::tree::TreeError;
use ast_grep_language::{LanguageExt, SupportLang};
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tree_sitter::Parser;

thread_local! {
    // Keyed by "<lang_debug>" so grammars never share a parser.
    static PARSERS: RefCell<HashMap<String, Parser>> = RefCell::new(HashMap::new());
}

/// Execute `f` with this thread's parser for `lang`.
pub fn with_parser<F, R>(lang: &SupportLang, f: F) -> Result<R, TreeError>
where
    F: FnOnce(&mut Parser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(format!("{lang:?}")) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut parser = Parser::new();
                parser
                    .set_language(&lang.get_ts_language())
                    .map_err(|_| TreeError::LanguageSet)?;
                entry.insert(parser)
            }
        };
        Ok(f(parser))
    })
}

/// Number of parsers pooled on this thread.
pub fn pooled_parsers() -> usize {
    PARSERS.with(|cell| cell.borrow().len())
}
