//! HAML: markup by indentation with Ruby on `-` and `=` lines.
//!
//! Code lines keep their Ruby at the original offsets; markers, tags,
//! attributes and plain text are blanked. HAML closes blocks by dedenting,
//! so the encoder emits a synthetic `end` line wherever a block closes and
//! records a boundary for it.

use super::{blank_into, Boundary, Encoded, TemplateEngine};
use crate::tree::SupportLang;

const BLOCK_KEYWORDS: &[&str] = &["if", "unless", "case", "while", "until", "begin", "for"];
const CONTINUATIONS: &[&str] = &["else", "elsif", "when", "in", "rescue", "ensure"];
const CLOSER: &str = "end\n";

#[derive(Debug, Clone, Copy, Default)]
pub struct Haml;

impl TemplateEngine for Haml {
    fn name(&self) -> &'static str {
        "haml"
    }

    fn target_language(&self) -> SupportLang {
        SupportLang::Ruby
    }

    fn encode(&self, raw: &str) -> Encoded {
        let mut out = String::with_capacity(raw.len() + CLOSER.len() * 4);
        let mut boundaries = Vec::new();
        let mut open_blocks: Vec<usize> = Vec::new();

        for line in raw.split_inclusive('\n') {
            let content = line.trim_end_matches(['\n', '\r']);
            let body = content.trim_start_matches([' ', '\t']);
            let indent = content.len() - body.len();

            if !body.is_empty() {
                let continues = code_of(body).is_some_and(is_continuation);
                while let Some(&open) = open_blocks.last() {
                    if indent > open || (indent == open && continues) {
                        break;
                    }
                    open_blocks.pop();
                    push_synthetic(&mut out, &mut boundaries, CLOSER);
                }
            }

            match code_marker(body) {
                Some(marker) => {
                    let code_start = indent + marker;
                    blank_into(&mut out, &line[..code_start]);
                    out.push_str(&line[code_start..]);
                    if opens_block(&body[marker..]) {
                        open_blocks.push(indent);
                    }
                }
                None => blank_into(&mut out, line),
            }
        }

        if !open_blocks.is_empty() && !out.is_empty() && !out.ends_with('\n') {
            push_synthetic(&mut out, &mut boundaries, "\n");
        }
        while open_blocks.pop().is_some() {
            push_synthetic(&mut out, &mut boundaries, CLOSER);
        }

        Encoded::new(out, boundaries)
    }
}

fn push_synthetic(out: &mut String, boundaries: &mut Vec<Boundary>, text: &str) {
    boundaries.push(Boundary {
        offset: out.len(),
        delta: text.len() as isize,
    });
    out.push_str(text);
}

/// Length of the marker in front of a line's Ruby, if the line carries any.
fn code_marker(body: &str) -> Option<usize> {
    if body.starts_with("-#") {
        return None;
    }
    if body.starts_with("!=") || body.starts_with("&=") {
        return Some(2);
    }
    if body.starts_with(['-', '=', '~']) {
        return Some(1);
    }
    if body.starts_with(['%', '.']) || (body.starts_with('#') && !body.starts_with("#{")) {
        return tag_marker(body);
    }
    None
}

/// `%p.title{ class: x }= code`: the marker runs through the `=`.
fn tag_marker(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len()
        && !matches!(
            bytes[i],
            b' ' | b'\t' | b'=' | b'{' | b'(' | b'[' | b'/' | b'<' | b'>' | b'&' | b'!'
        )
    {
        i += 1;
    }
    loop {
        let closer = match bytes.get(i) {
            Some(b'{') => '}',
            Some(b'(') => ')',
            Some(b'[') => ']',
            _ => break,
        };
        i += body[i..].find(closer)? + 1;
    }
    match bytes.get(i) {
        Some(b'=') => Some(i + 1),
        Some(b'!' | b'&') if bytes.get(i + 1) == Some(&b'=') => Some(i + 2),
        _ => None,
    }
}

fn code_of(body: &str) -> Option<&str> {
    code_marker(body).map(|marker| body[marker..].trim())
}

fn first_word(code: &str) -> &str {
    code.trim()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
}

fn is_continuation(code: &str) -> bool {
    CONTINUATIONS.contains(&first_word(code))
}

fn opens_block(code: &str) -> bool {
    let code = code.trim();
    BLOCK_KEYWORDS.contains(&first_word(code))
        || code == "do"
        || code.ends_with(" do")
        || (code.ends_with('|') && code.contains(" do |"))
}
