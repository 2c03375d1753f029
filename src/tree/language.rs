//! Language detection for built-in grammars.
//!
//! Grammars come from ast-grep-language's `SupportLang`, which also feeds
//! the tree-sitter parsers and the structural pattern matcher.

use std::path::Path;

pub use ast_grep_language::SupportLang;

/// Map a file extension (without the dot) to a grammar.
pub fn from_extension(ext: &str) -> Option<SupportLang> {
    match ext {
        "rs" => Some(SupportLang::Rust),
        "rb" | "rake" | "gemspec" | "ru" => Some(SupportLang::Ruby),
        "py" | "pyi" => Some(SupportLang::Python),
        "js" | "mjs" | "cjs" | "jsx" => Some(SupportLang::JavaScript),
        "ts" | "mts" | "cts" => Some(SupportLang::TypeScript),
        "tsx" => Some(SupportLang::Tsx),
        "go" => Some(SupportLang::Go),
        _ => None,
    }
}

pub fn from_path(path: &Path) -> Option<SupportLang> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(from_extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast_grep_core::AstGrep;

    #[test]
    fn detects_by_extension() {
        assert_eq!(from_path(Path::new("src/lib.rs")), Some(SupportLang::Rust));
        assert_eq!(from_path(Path::new("app/models/post.rb")), Some(SupportLang::Ruby));
        assert_eq!(from_path(Path::new("web/index.tsx")), Some(SupportLang::Tsx));
        assert_eq!(from_path(Path::new("README")), None);
        assert_eq!(from_path(Path::new("app/views/show.html.erb")), None);
    }

    #[test]
    fn detected_grammar_parses() {
        let sg = AstGrep::new("class Foobar\nend", SupportLang::Ruby);
        assert_eq!(sg.root().kind(), "program");
    }
}
