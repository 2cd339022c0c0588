// Flattened, read-only view of an aggregator, plus the store's update outcome.

use std::time::Duration;

use super::{IndividualKey, Role, Stat, TupleKey};

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTuple {
    pub key: TupleKey,
    pub stat: Stat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedIndividual {
    pub key: IndividualKey,
    pub stat: Stat,
}

/// Value copy of an aggregator's state. Later mutations of the aggregator are not reflected.
/// Entry order is unspecified.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tuples: Vec<AggregatedTuple>,
    pub individual: Vec<AggregatedIndividual>,
    pub total_records: u64,
    pub skipped_records: u64,
    /// Wall-clock time since the aggregator was created.
    pub duration: Duration,
}

impl Snapshot {
    pub fn tuples_len(&self) -> usize {
        self.tuples.len()
    }

    pub fn individual_len(&self) -> usize {
        self.individual.len()
    }

    pub fn find_tuple(&self, query: &str, answer: &str, qtype: &str) -> Option<&Stat> {
        self.tuples
            .iter()
            .find(|t| t.key.query == query && t.key.answer == answer && t.key.qtype == qtype)
            .map(|t| &t.stat)
    }

    pub fn find_individual(&self, value: &str, role: Role) -> Option<&Stat> {
        self.individual
            .iter()
            .find(|i| i.key.role == role && i.key.value == value)
            .map(|i| &i.stat)
    }
}

/// Rows inserted vs updated by one store update, and how long it took.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub duration: Duration,
}

impl UpdateOutcome {
    pub fn rows(&self) -> u64 {
        self.inserted + self.updated
    }
}
