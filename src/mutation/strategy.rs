use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;

/// Conflict policy flags. Combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Strategy(u8);

impl Strategy {
    /// Drop conflicting actions and still produce output.
    pub const KEEP_RUNNING: Strategy = Strategy(0b001);
    /// Any conflict aborts before the buffer is touched.
    pub const THROW_ERROR: Strategy = Strategy(0b010);
    /// Zero-width insertions at the same offset all survive, in queued order.
    pub const ALLOW_INSERT_AT_SAME_POSITION: Strategy = Strategy(0b100);

    pub const fn contains(self, other: Strategy) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Build a strategy from kebab-case flag names.
    pub fn from_names<I, S>(names: I) -> Result<Self, UnknownStrategy>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut strategy = Strategy(0);
        for name in names {
            strategy |= name.as_ref().parse::<Strategy>()?;
        }
        if strategy.0 == 0 {
            return Ok(Strategy::default());
        }
        Ok(strategy)
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::KEEP_RUNNING
    }
}

impl BitOr for Strategy {
    type Output = Strategy;

    fn bitor(self, rhs: Strategy) -> Strategy {
        Strategy(self.0 | rhs.0)
    }
}

impl BitOrAssign for Strategy {
    fn bitor_assign(&mut self, rhs: Strategy) {
        self.0 |= rhs.0;
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown strategy '{0}' (expected keep-running, throw-error or allow-insert-at-same-position)")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "keep-running" => Ok(Strategy::KEEP_RUNNING),
            "throw-error" => Ok(Strategy::THROW_ERROR),
            "allow-insert-at-same-position" => Ok(Strategy::ALLOW_INSERT_AT_SAME_POSITION),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}
