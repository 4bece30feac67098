use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// De-duplicating FIFO.
///
/// Pushing a node that is already queued moves it to the back. Each push
/// stamps the node with a fresh generation; queue entries whose stamp is no
/// longer current are dropped when popped, so the move is O(1).
#[derive(Debug)]
pub struct WorkQueue<N> {
    entries: VecDeque<(N, u64)>,
    latest: HashMap<N, u64>,
    generation: u64,
}

impl<N: Copy + Eq + Hash> WorkQueue<N> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            latest: HashMap::new(),
            generation: 0,
        }
    }

    pub fn push(&mut self, node: N) {
        self.generation += 1;
        self.latest.insert(node, self.generation);
        self.entries.push_back((node, self.generation));
    }

    pub fn pop(&mut self) -> Option<N> {
        while let Some((node, generation)) = self.entries.pop_front() {
            if self.latest.get(&node) == Some(&generation) {
                self.latest.remove(&node);
                return Some(node);
            }
        }
        None
    }

    pub fn contains(&self, node: &N) -> bool {
        self.latest.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

impl<N: Copy + Eq + Hash> Default for WorkQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
