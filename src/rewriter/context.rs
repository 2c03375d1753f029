//! Evaluation context for one rule body against one file.
//!
//! A [`Context`] carries the current node (the cursor), a stack of saved
//! cursors, and the actions and warnings produced so far. Scopes rebind the
//! cursor for a nested body and always restore it afterwards, whether the
//! body succeeds or fails.
//!
//! Offsets in actions are in the coordinates of the parsed text. For
//! templates that is the surrogate, and the instance remaps them before the
//! mutation session splices the raw source. Text copied into new code is
//! always taken from the raw source.

use super::{RuleError, Warning};
use crate::mutation::{Action, ActionKind};
use crate::query::{Matcher, QueryOptions};
use crate::template::{erb, Encoded};
use crate::tree::{Adapter, NodeId, NodeRef, Resolved, SyntaxTree, TreeError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type Helper = Arc<dyn Fn(&[&str]) -> String + Send + Sync>;
pub type Helpers = BTreeMap<String, Helper>;

/// Which edge of the target range an insertion goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertAt {
    Beginning,
    #[default]
    End,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOptions {
    pub at: InsertAt,
    /// Capability path of the target; the current node when `None`.
    pub to: Option<String>,
    /// Join with `", "` on the side facing the existing code.
    pub and_comma: bool,
}

impl InsertOptions {
    pub fn at(at: InsertAt) -> Self {
        Self {
            at,
            ..Self::default()
        }
    }

    pub fn to(mut self, path: impl Into<String>) -> Self {
        self.to = Some(path.into());
        self
    }

    pub fn and_comma(mut self) -> Self {
        self.and_comma = true;
        self
    }
}

pub struct Context<'t> {
    adapter: &'t dyn Adapter,
    tree: &'t SyntaxTree,
    raw: &'t str,
    encoded: &'t Encoded,
    file_path: &'t Path,
    current: NodeId,
    saved: Vec<NodeId>,
    actions: Vec<Action>,
    warnings: Vec<Warning>,
    helpers: Option<&'t Helpers>,
    tab_width: usize,
    single_quote: bool,
}

impl<'t> Context<'t> {
    /// A context positioned at the root of `tree`.
    ///
    /// `encoded` is the text `tree` was parsed from; `raw` is the file as it
    /// is on disk.
    pub fn new(
        adapter: &'t dyn Adapter,
        tree: &'t SyntaxTree,
        raw: &'t str,
        encoded: &'t Encoded,
        file_path: &'t Path,
    ) -> Self {
        Self {
            adapter,
            tree,
            raw,
            encoded,
            file_path,
            current: tree.root().id(),
            saved: Vec::new(),
            actions: Vec::new(),
            warnings: Vec::new(),
            helpers: None,
            tab_width: 2,
            single_quote: true,
        }
    }

    pub fn with_helpers(mut self, helpers: &'t Helpers) -> Self {
        self.helpers = Some(helpers);
        self
    }

    pub fn with_formatting(mut self, tab_width: usize, single_quote: bool) -> Self {
        self.tab_width = tab_width;
        self.single_quote = single_quote;
        self
    }

    pub fn tree(&self) -> &'t SyntaxTree {
        self.tree
    }

    /// The current node.
    pub fn node(&self) -> NodeRef<'t> {
        self.tree.node(self.current)
    }

    pub fn file_path(&self) -> &Path {
        self.file_path
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Hand back everything the body produced.
    pub fn finish(self) -> (Vec<Action>, Vec<Warning>) {
        (self.actions, self.warnings)
    }

    /// Resolve a capability path from the current node.
    pub fn resolve(&self, path: &str) -> Result<Resolved, TreeError> {
        self.adapter.resolve(self.tree, self.current, path)
    }

    fn resolve_range(&self, path: &str) -> Result<Range<usize>, TreeError> {
        self.resolve(path)?
            .range(self.tree)
            .ok_or_else(|| TreeError::EmptyRange {
                path: path.to_string(),
                text: self.node().text().to_string(),
            })
    }

    /// Smallest range covering every path; the current node for no paths.
    fn resolve_span(&self, paths: &[&str]) -> Result<Range<usize>, TreeError> {
        if paths.is_empty() {
            return Ok(self.node().range());
        }
        let mut span = usize::MAX..0;
        for path in paths {
            let range = self.resolve_range(path)?;
            span.start = span.start.min(range.start);
            span.end = span.end.max(range.end);
        }
        Ok(span)
    }

    // -- scopes -----------------------------------------------------------

    /// Run `body` with the cursor on `id`, then put the cursor back.
    pub fn with_node<F>(&mut self, id: NodeId, body: F) -> Result<(), RuleError>
    where
        F: FnOnce(&mut Self) -> Result<(), RuleError>,
    {
        self.saved.push(self.current);
        self.current = id;
        let outcome = body(self);
        if let Some(previous) = self.saved.pop() {
            self.current = previous;
        }
        outcome
    }

    /// Run `body` on whatever `path` resolves to: once for a node, once per
    /// element for a sequence, not at all when absent.
    pub fn goto<F>(&mut self, path: &str, mut body: F) -> Result<(), RuleError>
    where
        F: FnMut(&mut Self) -> Result<(), RuleError>,
    {
        for id in self.resolve(path)?.nodes() {
            self.with_node(id, &mut body)?;
        }
        Ok(())
    }

    /// Run `body` once per match in the current subtree, the current node
    /// included.
    pub fn within<M, F>(&mut self, matcher: &M, body: F) -> Result<(), RuleError>
    where
        M: Matcher + ?Sized,
        F: FnMut(&mut Self) -> Result<(), RuleError>,
    {
        self.within_with(matcher, QueryOptions::scope(), body)
    }

    pub fn within_with<M, F>(
        &mut self,
        matcher: &M,
        options: QueryOptions,
        mut body: F,
    ) -> Result<(), RuleError>
    where
        M: Matcher + ?Sized,
        F: FnMut(&mut Self) -> Result<(), RuleError>,
    {
        let tree = self.tree;
        for found in matcher.query(tree.node(self.current), options) {
            self.with_node(found.id(), &mut body)?;
        }
        Ok(())
    }

    // -- conditions -------------------------------------------------------

    fn exists_below<M: Matcher + ?Sized>(&self, matcher: &M) -> bool {
        matcher
            .query(self.node(), QueryOptions::exists_below())
            .next()
            .is_some()
    }

    /// Run `body` if something below the current node matches.
    pub fn if_exist<M, F>(&mut self, matcher: &M, body: F) -> Result<(), RuleError>
    where
        M: Matcher + ?Sized,
        F: FnOnce(&mut Self) -> Result<(), RuleError>,
    {
        if self.exists_below(matcher) {
            body(self)?;
        }
        Ok(())
    }

    pub fn unless_exist<M, F>(&mut self, matcher: &M, body: F) -> Result<(), RuleError>
    where
        M: Matcher + ?Sized,
        F: FnOnce(&mut Self) -> Result<(), RuleError>,
    {
        if !self.exists_below(matcher) {
            body(self)?;
        }
        Ok(())
    }

    /// Run `body` if the node's content is exactly one child and that child
    /// matches. Content is the `body` field's children when the node has
    /// one.
    pub fn if_only_exist<M, F>(&mut self, matcher: &M, body: F) -> Result<(), RuleError>
    where
        M: Matcher + ?Sized,
        F: FnOnce(&mut Self) -> Result<(), RuleError>,
    {
        let node = self.node();
        let container = node.field("body").unwrap_or(node);
        let mut children = container.named_children();
        let only = match (children.next(), children.next()) {
            (Some(only), None) => only,
            _ => return Ok(()),
        };
        let options = QueryOptions {
            include_self: true,
            stop_at_first: true,
        };
        if matcher.query(only, options).next() == Some(only) {
            body(self)?;
        }
        Ok(())
    }

    // -- mutation primitives ---------------------------------------------

    fn push(&mut self, kind: ActionKind, range: Range<usize>, code: Option<String>) {
        let node = self.node();
        let mut action = match code {
            Some(code) => Action::new(kind, range.start, range.end, code),
            None => Action {
                kind,
                ..Action::noop(range.start, range.end)
            },
        };
        action = action.with_source_node(node.kind(), node.start(), node.end());
        self.actions.push(action);
    }

    /// Insert `code` on a new line after the current node.
    pub fn append(&mut self, code: &str) -> Result<(), RuleError> {
        let node = self.node();
        let indent = self.raw_indent(node.start()).to_string();
        let code = indent_later_lines(&self.expand(code)?, &indent);
        self.push(ActionKind::Append, node.end()..node.end(), Some(format!("\n{indent}{code}")));
        Ok(())
    }

    /// Insert `code` on a new line before the current node.
    pub fn prepend(&mut self, code: &str) -> Result<(), RuleError> {
        let node = self.node();
        let indent = self.raw_indent(node.start()).to_string();
        let code = indent_later_lines(&self.expand(code)?, &indent);
        self.push(
            ActionKind::Prepend,
            node.start()..node.start(),
            Some(format!("{code}\n{indent}")),
        );
        Ok(())
    }

    pub fn insert(&mut self, code: &str, options: InsertOptions) -> Result<(), RuleError> {
        let range = match &options.to {
            Some(path) => self.resolve_range(path)?,
            None => self.node().range(),
        };
        let code = self.expand(code)?;
        let (offset, code) = match options.at {
            InsertAt::Beginning if options.and_comma => (range.start, format!("{code}, ")),
            InsertAt::Beginning => (range.start, code),
            InsertAt::End if options.and_comma => (range.end, format!(", {code}")),
            InsertAt::End => (range.end, code),
        };
        self.push(ActionKind::Insert, offset..offset, Some(code));
        Ok(())
    }

    /// Replace the span covered by `paths` with the expanded `with`.
    pub fn replace(&mut self, paths: &[&str], with: &str) -> Result<(), RuleError> {
        let span = self.resolve_span(paths)?;
        let code = self.expand(with)?;
        self.push(ActionKind::Replace, span, Some(code));
        Ok(())
    }

    /// Replace the whole current node.
    pub fn replace_with(&mut self, code: &str) -> Result<(), RuleError> {
        let node = self.node();
        let indent = self.raw_indent(node.start()).to_string();
        let code = indent_later_lines(&self.expand(code)?, &indent);
        self.push(ActionKind::ReplaceWith, node.range(), Some(code));
        Ok(())
    }

    /// Remove the current node. A node alone on its lines takes the lines
    /// with it.
    pub fn remove(&mut self, and_comma: bool) -> Result<(), RuleError> {
        let range = self.node().range();
        let range = match self.whole_lines(range.clone()) {
            Some(lines) => lines,
            None if and_comma => with_adjacent_comma(self.tree.source(), range),
            None => range,
        };
        self.push(ActionKind::Remove, range, Some(String::new()));
        Ok(())
    }

    /// Delete the span covered by `paths`.
    pub fn delete(&mut self, paths: &[&str], and_comma: bool) -> Result<(), RuleError> {
        let mut span = self.resolve_span(paths)?;
        if and_comma {
            span = with_adjacent_comma(self.tree.source(), span);
        }
        self.push(ActionKind::Delete, span, Some(String::new()));
        Ok(())
    }

    pub fn wrap(&mut self, prefix: &str, suffix: &str) -> Result<(), RuleError> {
        let range = self.node().range();
        let code = format!(
            "{}{}{}",
            self.expand(prefix)?,
            self.raw_text(range.clone()),
            self.expand(suffix)?
        );
        self.push(ActionKind::Wrap, range, Some(code));
        Ok(())
    }

    /// Put the current node inside a `header`/`footer` block, indented one
    /// level deeper.
    pub fn wrap_block(&mut self, header: &str, footer: &str) -> Result<(), RuleError> {
        let range = self.node().range();
        let indent = self.raw_indent(range.start).to_string();
        let pad = " ".repeat(self.tab_width);
        let body = indent_later_lines(self.raw_text(range.clone()), &pad);
        let code = format!(
            "{}\n{indent}{pad}{body}\n{indent}{}",
            self.expand(header)?,
            self.expand(footer)?
        );
        self.push(ActionKind::Wrap, range, Some(code));
        Ok(())
    }

    pub fn noop(&mut self) {
        let range = self.node().range();
        self.push(ActionKind::Noop, range, None);
    }

    /// Record a warning at the current node's line.
    pub fn warn(&mut self, message: &str) -> Result<(), RuleError> {
        let message = self.expand(message)?;
        let offset = self.encoded.to_raw_offset(self.node().start());
        let line = self
            .raw
            .get(..offset)
            .map_or(1, |before| before.matches('\n').count() + 1);
        self.warnings.push(Warning {
            file_path: PathBuf::from(self.file_path),
            line,
            message,
        });
        Ok(())
    }

    /// Call a helper registered on the rule.
    pub fn helper(&self, name: &str, args: &[&str]) -> Result<String, RuleError> {
        self.helpers
            .and_then(|helpers| helpers.get(name))
            .map(|helper| helper(args))
            .ok_or_else(|| RuleError::UnknownHelper {
                name: name.to_string(),
            })
    }

    /// Quote `text` as a string literal in the configured style.
    pub fn quote(&self, text: &str) -> String {
        let quote = if self.single_quote { '\'' } else { '"' };
        let mut out = String::with_capacity(text.len() + 2);
        out.push(quote);
        for c in text.chars() {
            if c == quote || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push(quote);
        out
    }

    /// Turn the ERB statement tag around the current node into an
    /// expression tag. Does nothing inside `<%=` tags, or in files whose
    /// surrogate shifts offsets (ERB never does).
    pub fn erb_stmt_to_expr(&mut self) {
        if !self.encoded.is_identity() {
            return;
        }
        let offset = self.encoded.to_raw_offset(self.node().start());
        if let Some(action) = erb::stmt_to_expr(self.raw, offset) {
            let node = self.node();
            self.actions
                .push(action.with_source_node(node.kind(), node.start(), node.end()));
        }
    }

    /// Expand `{{path}}` placeholders against the current node.
    pub fn expand(&self, template: &str) -> Result<String, TreeError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            out.push_str(&rest[..open]);
            let path = rest[open + 2..open + 2 + close].trim();
            if let Some(range) = self.resolve(path)?.range(self.tree) {
                out.push_str(self.raw_text(range));
            }
            rest = &rest[open + 2 + close + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }

    // -- raw-text helpers -------------------------------------------------

    fn raw_range(&self, range: Range<usize>) -> Range<usize> {
        self.encoded.to_raw_offset(range.start)..self.encoded.to_raw_offset(range.end)
    }

    fn raw_text(&self, range: Range<usize>) -> &'t str {
        let raw = self.raw;
        raw.get(self.raw_range(range)).unwrap_or("")
    }

    fn raw_indent(&self, offset: usize) -> &'t str {
        let raw = self.raw;
        let offset = self.encoded.to_raw_offset(offset).min(raw.len());
        let before = raw.get(..offset).unwrap_or("");
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let line = &raw[line_start..];
        let width = line.len() - line.trim_start_matches([' ', '\t']).len();
        &line[..width]
    }

    /// Full lines covering `range` when nothing else shares them, in both
    /// the parsed and the raw text.
    fn whole_lines(&self, range: Range<usize>) -> Option<Range<usize>> {
        let lines = alone_on_lines(self.tree.source(), range.clone())?;
        alone_on_lines(self.raw, self.raw_range(range))?;
        Some(lines)
    }
}

/// Expand `range` to its lines (trailing newline included) when only
/// whitespace shares them.
fn alone_on_lines(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let before = text.get(..range.start)?;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let after = text.get(range.end..)?;
    let line_end = after.find('\n').map_or(text.len(), |i| range.end + i);
    let blank = |s: &str| s.chars().all(|c| c == ' ' || c == '\t');
    if !blank(&text[line_start..range.start]) || !blank(&text[range.end..line_end]) {
        return None;
    }
    if line_end < text.len() {
        Some(line_start..line_end + 1)
    } else if line_start > 0 {
        // Last line without a newline: take the one before it instead.
        Some(line_start - 1..line_end)
    } else {
        Some(line_start..line_end)
    }
}

/// Extend `range` over one neighbouring comma: a following `, ` first,
/// otherwise a preceding `,`.
fn with_adjacent_comma(text: &str, range: Range<usize>) -> Range<usize> {
    let after = &text[range.end..];
    let gap = after.len() - after.trim_start().len();
    if after[gap..].starts_with(',') {
        let rest = &after[gap + 1..];
        let space = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        return range.start..range.end + gap + 1 + space;
    }
    let before = text[..range.start].trim_end();
    if before.ends_with(',') {
        return before.len() - 1..range.end;
    }
    range
}

fn indent_later_lines(code: &str, indent: &str) -> String {
    if indent.is_empty() || !code.contains('\n') {
        return code.to_string();
    }
    let mut lines = code.split('\n');
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        if !line.is_empty() {
            out.push_str(indent);
        }
        out.push_str(line);
    }
    out
}
