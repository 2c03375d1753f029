//! ERB: Ruby embedded in `<% %>` tags.
//!
//! The encoding is length-preserving. Tag openers become spaces, closers
//! become a statement separator padded to the same width, and everything
//! outside tags is blanked (line breaks kept). Offsets in the surrogate are
//! offsets in the raw template.

use super::{blank_into, Encoded, TemplateEngine};
use crate::mutation::{Action, ActionKind};
use crate::tree::SupportLang;

#[derive(Debug, Clone, Copy, Default)]
pub struct Erb;

impl TemplateEngine for Erb {
    fn name(&self) -> &'static str {
        "erb"
    }

    fn target_language(&self) -> SupportLang {
        SupportLang::Ruby
    }

    fn encode(&self, raw: &str) -> Encoded {
        Encoded::new(encode(raw), Vec::new())
    }
}

fn encode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut pos = 0;

    while pos < raw.len() {
        let Some(open) = find_from(raw, pos, "<%") else {
            blank_into(&mut out, &raw[pos..]);
            break;
        };
        blank_into(&mut out, &raw[pos..open]);

        let marker = bytes.get(open + 2).copied();
        if marker == Some(b'%') {
            // `<%%` is a literal `<%`
            blank_into(&mut out, &raw[open..open + 3]);
            pos = open + 3;
            continue;
        }
        let comment = marker == Some(b'#');
        let opener_len = if matches!(marker, Some(b'=' | b'-' | b'#')) { 3 } else { 2 };
        out.extend(std::iter::repeat(' ').take(opener_len));

        let code_start = open + opener_len;
        let Some(close) = find_from(raw, code_start, "%>") else {
            // Unterminated tag runs to the end of the template
            if comment {
                blank_into(&mut out, &raw[code_start..]);
            } else {
                out.push_str(&raw[code_start..]);
            }
            break;
        };
        let trimmed = close > code_start && bytes[close - 1] == b'-';
        let code_end = if trimmed { close - 1 } else { close };

        if comment {
            blank_into(&mut out, &raw[code_start..close + 2]);
        } else {
            out.push_str(&raw[code_start..code_end]);
            out.push_str(if trimmed { " ; " } else { "; " });
        }
        pos = close + 2;
    }
    out
}

fn find_from(haystack: &str, from: usize, needle: &str) -> Option<usize> {
    haystack[from..].find(needle).map(|i| from + i)
}

/// Turn the statement tag enclosing `offset` into an expression tag by
/// inserting `=` after its `<%`.
///
/// Returns `None` when the tag already outputs (`<%=`), is a comment, or no
/// tag precedes `offset`. A trim marker (`<%-`) is replaced.
pub fn stmt_to_expr(raw: &str, offset: usize) -> Option<Action> {
    let open = raw.get(..offset)?.rfind("<%")?;
    let at = open + 2;
    match raw.as_bytes().get(at).copied() {
        Some(b'=' | b'#' | b'%') => None,
        Some(b'-') => Some(Action::new(ActionKind::Replace, at, at + 1, "=")),
        _ => Some(Action::new(ActionKind::Insert, at, at, "=")),
    }
}
