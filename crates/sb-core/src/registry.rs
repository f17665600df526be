//! Per-node side records
//!
//! Nodes are never annotated with ad hoc properties. What the engine remembers
//! about a node is a [`NodeRecord`]: whether it has been processed (and with
//! what outcome), and whether it is a dynamically created script element whose
//! property writes are guarded.
//!
//! Records are stored by the host, weakly keyed by the node, so an entry lives
//! exactly as long as its node. [`NodeRecord::to_bits`] packs a record into a
//! small integer for hosts that keep them in a platform weak map.

/// What happened the last time a node was looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Inspected, nothing found
    Clean,
    /// Inspected, keyword found, suppressed
    Blocked,
    /// Deliberately not inspected (structural nodes)
    Skipped,
}

/// Write guard for a `<script>` element created through the hooked factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptGuard {
    /// Once set, every further property write is discarded
    pub blocked: bool,
}

/// Everything recorded about one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeRecord {
    pub outcome: Option<Outcome>,
    pub guard: Option<ScriptGuard>,
}

const OUTCOME_MASK: u8 = 0b0011;
const GUARDED: u8 = 0b0100;
const GUARD_BLOCKED: u8 = 0b1000;

impl NodeRecord {
    #[inline]
    pub fn is_processed(&self) -> bool {
        self.outcome.is_some()
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.outcome == Some(Outcome::Blocked)
    }

    /// Record an outcome. A blocked node stays blocked.
    pub fn marked(self, outcome: Outcome) -> Self {
        let outcome = if self.is_blocked() { Outcome::Blocked } else { outcome };
        Self {
            outcome: Some(outcome),
            ..self
        }
    }

    pub fn guarded(self) -> Self {
        Self {
            guard: Some(self.guard.unwrap_or_default()),
            ..self
        }
    }

    /// Permanently block further writes. No effect on an unguarded node.
    pub fn script_blocked(self) -> Self {
        Self {
            guard: self.guard.map(|_| ScriptGuard { blocked: true }),
            ..self
        }
    }

    pub fn to_bits(self) -> u8 {
        let outcome = match self.outcome {
            None => 0,
            Some(Outcome::Clean) => 1,
            Some(Outcome::Blocked) => 2,
            Some(Outcome::Skipped) => 3,
        };
        let guard = match self.guard {
            None => 0,
            Some(ScriptGuard { blocked: false }) => GUARDED,
            Some(ScriptGuard { blocked: true }) => GUARDED | GUARD_BLOCKED,
        };
        outcome | guard
    }

    pub fn from_bits(bits: u8) -> Self {
        let outcome = match bits & OUTCOME_MASK {
            1 => Some(Outcome::Clean),
            2 => Some(Outcome::Blocked),
            3 => Some(Outcome::Skipped),
            _ => None,
        };
        let guard = (bits & GUARDED != 0).then_some(ScriptGuard {
            blocked: bits & GUARD_BLOCKED != 0,
        });
        Self { outcome, guard }
    }
}
