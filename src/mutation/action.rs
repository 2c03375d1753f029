use serde::Serialize;

/// What an [`Action`] does to its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Append,
    Prepend,
    Insert,
    Replace,
    ReplaceWith,
    Remove,
    Delete,
    Wrap,
    Noop,
    AddFile,
    RemoveFile,
}

/// The node an action was derived from, detached from its tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSpan {
    pub kind: String,
    pub start: usize,
    pub end: usize,
}

/// One proposed edit: replace `[start, end)` with `new_code`.
///
/// Pure insertions have `start == end`. An action without `new_code` leaves
/// its range untouched (see [`ActionKind::Noop`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use = "an Action does nothing until it is queued on a MutationSession"]
pub struct Action {
    pub kind: ActionKind,
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
    pub new_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_node: Option<NodeSpan>,
}

impl Action {
    pub fn new(kind: ActionKind, start: usize, end: usize, new_code: impl Into<String>) -> Self {
        debug_assert!(start <= end, "action range [{start}, {end}) is inverted");
        Self {
            kind,
            start,
            end,
            new_code: Some(new_code.into()),
            source_node: None,
        }
    }

    pub fn noop(start: usize, end: usize) -> Self {
        Self {
            kind: ActionKind::Noop,
            start,
            end,
            new_code: None,
            source_node: None,
        }
    }

    pub fn add_file(content: impl Into<String>) -> Self {
        Self::new(ActionKind::AddFile, 0, 0, content)
    }

    pub fn remove_file() -> Self {
        Self {
            kind: ActionKind::RemoveFile,
            start: 0,
            end: 0,
            new_code: None,
            source_node: None,
        }
    }

    pub fn with_source_node(mut self, kind: impl Into<String>, start: usize, end: usize) -> Self {
        self.source_node = Some(NodeSpan {
            kind: kind.into(),
            start,
            end,
        });
        self
    }

    pub fn is_insertion(&self) -> bool {
        self.start == self.end
    }

    pub fn sort_key(&self) -> (usize, usize) {
        (self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_is_zero_width() {
        let action = Action::new(ActionKind::Insert, 12, 12, " < Base");
        assert!(action.is_insertion());
        assert!(!Action::new(ActionKind::Replace, 6, 12, "Rejuvinate").is_insertion());
    }

    #[test]
    fn file_actions_have_empty_ranges() {
        let add = Action::add_file("fn main() {}\n");
        assert_eq!((add.kind, add.start, add.end), (ActionKind::AddFile, 0, 0));
        assert_eq!(add.new_code.as_deref(), Some("fn main() {}\n"));

        let remove = Action::remove_file();
        assert_eq!(remove.kind, ActionKind::RemoveFile);
        assert!(remove.new_code.is_none());
    }

    #[test]
    fn serializes_kind_in_snake_case() {
        let action = Action::new(ActionKind::ReplaceWith, 0, 3, "bar");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "replace_with");
        assert!(json.get("source_node").is_none());
    }
}
