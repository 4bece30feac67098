use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AstId(pub u32);

impl fmt::Display for AstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide id counter shared by AST lowering and flow-node allocation.
///
/// Ids handed out by one generator never repeat, so AST ids and synthetic
/// flow-node ids stay disjoint when graphs are merged. The counter is atomic
/// so files may be lowered from several threads.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_ast_id(&self) -> AstId {
        AstId(self.next_id())
    }

    /// Makes sure ids assigned elsewhere (e.g. by an external parser) are never reissued.
    pub fn observe(&self, used: u32) {
        self.next.fetch_max(used.saturating_add(1), Ordering::Relaxed);
    }

    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }

    /// Only valid at the start of a whole run.
    pub fn reset(&self) {
        self.next.store(1, Ordering::Relaxed);
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let ids = IdGenerator::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn observe_skips_past_external_ids() {
        let ids = IdGenerator::new();
        ids.observe(41);
        assert_eq!(ids.next_id(), 42);

        ids.observe(10);
        assert_eq!(ids.next_id(), 43);
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let ids = IdGenerator::new();
        ids.next_id();
        ids.next_id();
        ids.reset();
        assert_eq!(ids.next_ast_id(), AstId(1));
    }
}
