use super::{Action, MutationError, Strategy};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Rewrites surrogate-space action ranges into source coordinates.
pub type Remap = Box<dyn Fn(&mut [Action]) + Send + Sync>;

/// Outcome of one [`MutationSession`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[must_use = "MutationResult reports whether anything changed"]
pub struct MutationResult {
    pub affected: bool,
    pub conflicted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    /// Actions the conflict sweep discarded, in scan order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<Action>,
    pub file_path: Option<PathBuf>,
}

/// One file's source plus the actions queued against it.
///
/// A session produces exactly one result: [`apply`](Self::apply) splices the
/// surviving actions into the source, [`test`](Self::test) returns them.
pub struct MutationSession {
    source: String,
    actions: Vec<Action>,
    remap: Option<Remap>,
    strategy: Strategy,
}

impl fmt::Debug for MutationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationSession")
            .field("source_len", &self.source.len())
            .field("actions", &self.actions)
            .field("remap", &self.remap.is_some())
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl MutationSession {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            actions: Vec::new(),
            remap: None,
            strategy: Strategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn set_remap(&mut self, remap: Remap) {
        self.remap = Some(remap);
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn extend(&mut self, actions: impl IntoIterator<Item = Action>) {
        self.actions.extend(actions);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Splice every surviving action into the source.
    pub fn apply(mut self) -> Result<MutationResult, MutationError> {
        if self.actions.is_empty() {
            return Ok(MutationResult::default());
        }
        let dropped = self.prepare()?;
        let new_source = splice(&self.source, &self.actions)?;
        Ok(MutationResult {
            affected: true,
            conflicted: !dropped.is_empty(),
            new_source: Some(new_source),
            dropped,
            ..MutationResult::default()
        })
    }

    /// Run the same pipeline as [`apply`](Self::apply) but return the
    /// surviving actions instead of rewritten text.
    pub fn test(mut self) -> Result<MutationResult, MutationError> {
        if self.actions.is_empty() {
            return Ok(MutationResult::default());
        }
        let dropped = self.prepare()?;
        Ok(MutationResult {
            affected: true,
            conflicted: !dropped.is_empty(),
            actions: Some(self.actions),
            dropped,
            ..MutationResult::default()
        })
    }

    /// Remap, sort and sweep. Returns the dropped actions.
    fn prepare(&mut self) -> Result<Vec<Action>, MutationError> {
        if let Some(remap) = &self.remap {
            remap(&mut self.actions);
        }
        // Stable: equal ranges keep their queued order.
        self.actions.sort_by_key(Action::sort_key);

        let conflicts = remove_conflicts(&mut self.actions, self.strategy);
        if conflicts.is_empty() {
            return Ok(conflicts);
        }
        tracing::debug!(dropped = conflicts.len(), "conflicting actions");
        if self.strategy.contains(Strategy::THROW_ERROR) {
            return Err(MutationError::Conflict { conflicts });
        }
        Ok(conflicts)
    }
}

/// Right-to-left sweep over actions sorted by `(start, end)`.
///
/// The window starts at the last action. Each earlier action is dropped when
/// it ends after the window starts, or when both it and the window are
/// zero-width insertions at the same offset (unless the strategy allows
/// that). Survivors become the new window. Returns the dropped actions in
/// scan order.
pub fn remove_conflicts(actions: &mut Vec<Action>, strategy: Strategy) -> Vec<Action> {
    let mut conflicts = Vec::new();
    let Some(last) = actions.last() else {
        return conflicts;
    };
    let allow_same_position = strategy.contains(Strategy::ALLOW_INSERT_AT_SAME_POSITION);
    let (mut begin, mut end) = (last.start, last.end);

    // Removing index j only shifts elements above j, so a descending walk
    // over the original indices stays valid.
    for j in (0..actions.len() - 1).rev() {
        let candidate = &actions[j];
        let same_position = begin == candidate.start && begin == end && candidate.is_insertion();
        let overlapped = begin < candidate.end;
        if (!allow_same_position && same_position) || overlapped {
            conflicts.push(actions.remove(j));
        } else {
            begin = candidate.start;
            end = candidate.end;
        }
    }
    conflicts
}

/// Splice non-conflicting actions, sorted by `(start, end)`, into `source`.
///
/// Every range is validated before the first splice so a bad action leaves
/// nothing half-applied.
pub fn splice(source: &str, actions: &[Action]) -> Result<String, MutationError> {
    for action in actions {
        if action.start > action.end || action.end > source.len() {
            return Err(MutationError::InvalidRange {
                start: action.start,
                end: action.end,
                len: source.len(),
            });
        }
        for offset in [action.start, action.end] {
            if !source.is_char_boundary(offset) {
                return Err(MutationError::NotCharBoundary { offset });
            }
        }
    }

    let mut output = source.to_string();
    // Back to front so earlier offsets stay valid.
    for action in actions.iter().rev() {
        if let Some(code) = &action.new_code {
            output.replace_range(action.start..action.end, code);
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::ActionKind;

    const CLASS: &str = "class Foobar\nend";

    fn replace(start: usize, end: usize, code: &str) -> Action {
        Action::new(ActionKind::Replace, start, end, code)
    }

    fn insert(at: usize, code: &str) -> Action {
        Action::new(ActionKind::Insert, at, at, code)
    }

    #[test]
    fn no_actions_leave_source_untouched() {
        let result = MutationSession::new(CLASS).apply().unwrap();
        assert!(!result.affected);
        assert!(!result.conflicted);
        assert!(result.new_source.is_none());
    }

    #[test]
    fn replaces_class_name() {
        let mut session = MutationSession::new(CLASS);
        session.push(replace(6, 12, "Rejuvinate"));
        let result = session.apply().unwrap();
        assert!(result.affected);
        assert!(!result.conflicted);
        assert_eq!(result.new_source.as_deref(), Some("class Rejuvinate\nend"));
    }

    #[test]
    fn drops_widest_overlapping_action() {
        let source = "class Foobar\n  def foo; end\nend";
        let mut session = MutationSession::new(source);
        session.push(replace(6, 12, "Rejuvinate"));
        session.push(insert(12, " < Base"));
        session.push(replace(0, 12, "class Foobar < Base"));
        let result = session.apply().unwrap();
        assert!(result.conflicted);
        assert_eq!(result.dropped, vec![replace(0, 12, "class Foobar < Base")]);
        assert_eq!(
            result.new_source.as_deref(),
            Some("class Rejuvinate < Base\n  def foo; end\nend")
        );
    }

    #[test]
    fn same_position_inserts_conflict_by_default() {
        let mut session = MutationSession::new(CLASS);
        session.push(insert(12, " < Base"));
        session.push(insert(12, " < Base"));
        let result = session.apply().unwrap();
        assert!(result.conflicted);
        assert_eq!(result.new_source.as_deref(), Some("class Foobar < Base\nend"));
    }

    #[test]
    fn same_position_inserts_survive_in_queued_order() {
        let mut session = MutationSession::new(CLASS)
            .with_strategy(Strategy::KEEP_RUNNING | Strategy::ALLOW_INSERT_AT_SAME_POSITION);
        session.push(insert(12, " < Base"));
        session.push(insert(12, " < Object"));
        let result = session.apply().unwrap();
        assert!(!result.conflicted);
        assert_eq!(
            result.new_source.as_deref(),
            Some("class Foobar < Base < Object\nend")
        );
    }

    #[test]
    fn throw_error_aborts_on_overlap() {
        let mut session = MutationSession::new(CLASS).with_strategy(Strategy::THROW_ERROR);
        session.push(replace(6, 12, "Rejuvinate"));
        session.push(replace(0, 12, "class Other"));
        let err = session.apply().unwrap_err();
        assert_eq!(err.to_string(), "mutation actions are conflicted");
        match err {
            MutationError::Conflict { conflicts } => {
                assert_eq!(conflicts, vec![replace(0, 12, "class Other")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_returns_sorted_survivors() {
        let mut session = MutationSession::new(CLASS);
        session.push(insert(12, " < Base"));
        session.push(replace(6, 12, "Rejuvinate"));
        session.push(replace(0, 12, "class Foobar < Base"));
        let result = session.test().unwrap();
        assert!(result.conflicted);
        assert!(result.new_source.is_none());
        assert_eq!(
            result.actions,
            Some(vec![replace(6, 12, "Rejuvinate"), insert(12, " < Base")])
        );
    }

    #[test]
    fn remap_runs_before_sorting() {
        let mut session = MutationSession::new("abc\ndef\n");
        session.push(replace(8, 11, "DEF"));
        session.set_remap(Box::new(|actions: &mut [Action]| {
            for action in actions {
                action.start -= 4;
                action.end -= 4;
            }
        }));
        let result = session.apply().unwrap();
        assert_eq!(result.new_source.as_deref(), Some("abc\nDEF\n"));
    }

    #[test]
    fn noop_keeps_text() {
        let mut session = MutationSession::new(CLASS);
        session.push(Action::noop(6, 12));
        let result = session.apply().unwrap();
        assert!(result.affected);
        assert_eq!(result.new_source.as_deref(), Some(CLASS));
    }

    #[test]
    fn rejects_out_of_bounds_range() {
        let mut session = MutationSession::new(CLASS);
        session.push(replace(6, 40, "x"));
        assert!(matches!(
            session.apply(),
            Err(MutationError::InvalidRange { start: 6, end: 40, .. })
        ));
    }

    #[test]
    fn rejects_split_character() {
        let mut session = MutationSession::new("héllo");
        session.push(replace(2, 3, "e"));
        assert!(matches!(
            session.apply(),
            Err(MutationError::NotCharBoundary { offset: 2 })
        ));
    }
}
