//! Fitness records and the bounded list of best genomes.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::genome::Genome;

/// Number of genomes kept on the leaderboard.
pub const LEADERBOARD_LEN: usize = 10;

/// Outcome of evaluating one genome in one epoch. Lower cost is better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FitnessRecord {
    /// Evaluation cost.
    pub cost: f64,
    /// Epoch the genome was evaluated in.
    pub epoch: usize,
    /// Position in that epoch's population.
    pub index: usize,
}

impl PartialEq for FitnessRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FitnessRecord {}

impl PartialOrd for FitnessRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FitnessRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then(self.index.cmp(&other.index))
            .then(self.epoch.cmp(&other.epoch))
    }
}

impl fmt::Display for FitnessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch:{},idx:{}", self.epoch, self.index)
    }
}

/// Best genomes seen so far, sorted by ascending cost.
#[derive(Debug, Clone)]
pub struct Leaderboard {
    capacity: usize,
    entries: Vec<(Genome, FitnessRecord)>,
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self::new(LEADERBOARD_LEN)
    }
}

impl Leaderboard {
    /// Creates an empty board holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The lowest-cost entry.
    pub fn best(&self) -> Option<&(Genome, FitnessRecord)> {
        self.entries.first()
    }

    /// Entries in ascending cost order.
    pub fn entries(&self) -> &[(Genome, FitnessRecord)] {
        &self.entries
    }

    /// Sorted-inserts every candidate that ranks within capacity.
    pub fn insert_ranked(&mut self, ranked: &[(Genome, FitnessRecord)]) {
        for (genome, record) in ranked {
            let pos = self.entries.partition_point(|(_, r)| r < record);
            if pos < self.capacity {
                self.entries.insert(pos, (genome.clone(), *record));
                self.entries.truncate(self.capacity);
            }
        }
    }

    /// Replaces every entry with the given ones, keeping at most `capacity`.
    pub fn replace(&mut self, entries: impl IntoIterator<Item = (Genome, FitnessRecord)>) {
        self.entries.clear();
        self.entries.extend(entries.into_iter().take(self.capacity));
        self.entries.sort_by(|a, b| a.1.cmp(&b.1));
    }

    /// Copies the board out.
    pub fn snapshot(&self) -> LeaderboardSnapshot {
        let (genomes, records) = self.entries.iter().cloned().unzip();
        LeaderboardSnapshot { genomes, records }
    }
}

/// Owned copy of a [`Leaderboard`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    /// Genomes in ascending cost order.
    pub genomes: Vec<Genome>,
    /// Matching fitness records.
    pub records: Vec<FitnessRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cost: f64, index: usize) -> (Genome, FitnessRecord) {
        (
            Genome::from_values(&[index as u64]),
            FitnessRecord {
                cost,
                epoch: 0,
                index,
            },
        )
    }

    #[test]
    fn ties_break_on_index_then_epoch() {
        let a = FitnessRecord {
            cost: 1.0,
            epoch: 5,
            index: 1,
        };
        let b = FitnessRecord {
            cost: 1.0,
            epoch: 0,
            index: 2,
        };
        let c = FitnessRecord { epoch: 6, ..a };
        assert!(a < b);
        assert!(a < c);
        assert_eq!(a.to_string(), "epoch:5,idx:1");
    }

    #[test]
    fn nan_sorts_last() {
        let nan = FitnessRecord {
            cost: f64::NAN,
            epoch: 0,
            index: 0,
        };
        let one = FitnessRecord { cost: 1.0, ..nan };
        assert!(one < nan);
    }

    #[test]
    fn board_keeps_best_in_order() {
        let mut board = Leaderboard::new(3);
        board.insert_ranked(&[entry(5.0, 0), entry(2.0, 1)]);
        board.insert_ranked(&[entry(9.0, 2), entry(1.0, 3), entry(3.0, 4)]);
        let costs: Vec<f64> = board.entries().iter().map(|(_, r)| r.cost).collect();
        assert_eq!(costs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn replace_truncates_to_capacity() {
        let mut board = Leaderboard::new(2);
        board.insert_ranked(&[entry(0.5, 9)]);
        board.replace(vec![entry(4.0, 0), entry(3.0, 1), entry(1.0, 2)]);
        let snap = board.snapshot();
        assert_eq!(snap.records.len(), 2);
        assert_eq!(snap.records[0].cost, 3.0);
    }
}
