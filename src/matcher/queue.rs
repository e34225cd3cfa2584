//! Round-robin navigation order over parsed matches.

use std::collections::VecDeque;

/// Rotatable sequence of match ids.
///
/// The canonical order is kept so [`MatchQueue::reset`] can undo any amount
/// of rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchQueue {
    canonical: Vec<usize>,
    order: VecDeque<usize>,
}

impl MatchQueue {
    /// Create a queue in the given canonical order.
    pub fn new(ids: Vec<usize>) -> Self {
        MatchQueue {
            order: ids.iter().copied().collect(),
            canonical: ids,
        }
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Move the head to the tail and return it.
    pub fn rotate(&mut self) -> Option<usize> {
        let head = self.order.pop_front()?;
        self.order.push_back(head);
        Some(head)
    }

    /// Restore the canonical order.
    pub fn reset(&mut self) {
        self.order = self.canonical.iter().copied().collect();
    }
}
