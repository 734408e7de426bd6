use super::OpDuration;

/// The `capacity` largest durations seen, kept in descending order.
///
/// Equal durations rank by arrival: a newcomer goes behind every entry it
/// ties with, and one equal to the smallest kept entry is dropped when
/// full. Insertion is a binary search plus an O(N) shift.
#[derive(Debug, Clone)]
pub struct TopN {
    capacity: usize,
    entries: Vec<OpDuration>,
}

impl TopN {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    pub fn insert(&mut self, duration: OpDuration) {
        if self.entries.len() == self.capacity {
            match self.entries.last() {
                Some(smallest) if duration > *smallest => {}
                _ => return,
            }
        }

        // First slot holding something strictly smaller: ties stay ahead.
        let idx = self.entries.partition_point(|kept| *kept >= duration);
        self.entries.insert(idx, duration);
        self.entries.truncate(self.capacity);
    }

    /// Copy of the ranking, largest first.
    pub fn snapshot(&self) -> Vec<OpDuration> {
        self.entries.clone()
    }
}
