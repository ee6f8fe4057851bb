use std::collections::BTreeSet;

/// What happened when a node completion was reported to the [CompletionBarrier].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First report for this node, the barrier counted down.
    Counted,
    /// This node was already counted.
    Duplicate,
    /// The index does not belong to any configured node.
    OutOfRange,
}

/// Counts down once per distinct node that has finished.
///
/// Completions arrive from more than one producer (the directory watch and the periodic scan) and
/// the same node is usually reported by both. The barrier owns the set of finished nodes so that
/// repeated reports can never count down past zero.
#[derive(Debug, Clone)]
pub struct CompletionBarrier {
    expected: usize,
    finished: BTreeSet<usize>,
}

impl CompletionBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            finished: BTreeSet::new(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// The number of nodes still to report.
    pub fn remaining(&self) -> usize {
        self.expected - self.finished.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    pub fn finished(&self) -> impl Iterator<Item = usize> + '_ {
        self.finished.iter().copied()
    }

    pub fn observe(&mut self, index: usize) -> Observation {
        if index >= self.expected {
            return Observation::OutOfRange;
        }

        if self.finished.insert(index) {
            Observation::Counted
        } else {
            Observation::Duplicate
        }
    }

    /// Merge the result of a full directory scan, returning how many nodes were newly counted.
    ///
    /// A scan that finds every node's marker completes the barrier outright, counting down only
    /// the nodes that had not been seen yet.
    pub fn observe_scan(&mut self, indices: impl IntoIterator<Item = usize>) -> usize {
        indices
            .into_iter()
            .filter(|index| self.observe(*index) == Observation::Counted)
            .count()
    }
}
