//! Per-thread cache of compiled ast-grep patterns.
//!
//! A declarative rule compiles the same pattern for every file it visits.
//! Each worker keeps its own compiled copies, keyed by grammar and pattern
//! text, and evicts the oldest entry once `CAPACITY` is reached.

use ast_grep_core::Pattern;
use ast_grep_language::SupportLang;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use xxhash_rust::xxh3::xxh3_64;

const CAPACITY: usize = 128;

/// Grammar name plus a digest of the pattern text.
type Key = (String, u64);

#[derive(Default)]
struct Compiled {
    patterns: HashMap<Key, Pattern>,
    order: VecDeque<Key>,
}

thread_local! {
    static COMPILED: RefCell<Compiled> = RefCell::new(Compiled::default());
}

fn key(lang: &SupportLang, pattern: &str) -> Key {
    (format!("{lang:?}"), xxh3_64(pattern.as_bytes()))
}

/// The compiled form of `pattern` under `lang`, compiling on first use.
pub fn compiled(lang: &SupportLang, pattern: &str) -> Pattern {
    let key = key(lang, pattern);
    COMPILED.with(|cell| {
        let mut cache = cell.borrow_mut();
        if let Some(hit) = cache.patterns.get(&key) {
            return hit.clone();
        }

        if cache.order.len() >= CAPACITY {
            if let Some(oldest) = cache.order.pop_front() {
                cache.patterns.remove(&oldest);
            }
        }
        let pattern = Pattern::new(pattern, lang.clone());
        cache.order.push_back(key.clone());
        cache.patterns.insert(key, pattern.clone());
        pattern
    })
}

/// Number of patterns compiled on this thread.
pub fn len() -> usize {
    COMPILED.with(|cell| cell.borrow().patterns.len())
}

pub fn reset() {
    COMPILED.with(|cell| *cell.borrow_mut() = Compiled::default());
}
