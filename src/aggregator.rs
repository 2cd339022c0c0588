// In-memory aggregation: dedupe DNS records into tuple and individual statistics.
// One aggregator per input unit; partial aggregators fold together with `merge`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::time::Instant;

use tracing::debug;

use crate::models::{
    AggregatedIndividual, AggregatedTuple, DnsRecord, IndividualKey, Snapshot, Stat, TupleKey,
};

/// Records whose query or any answer is longer than this (in bytes) are dropped.
pub const MAX_SANE_VALUE_LEN: usize = 1000;

/// Answer/TTL placeholder meaning "no value".
pub const SENTINEL: &str = "-";

/// Strip a trailing decimal fraction from a TTL ("300.000000" -> "300"). The sentinel maps to "0".
pub fn strip_decimal(value: &str) -> &str {
    if value == SENTINEL {
        return "0";
    }
    match value.find('.') {
        Some(idx) => &value[..idx],
        None => value,
    }
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    tuples: HashMap<TupleKey, Stat>,
    individual: HashMap<IndividualKey, Stat>,
    total_records: u64,
    skipped_records: u64,
    max_value_len: usize,
    start: Instant,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::with_max_value_len(MAX_SANE_VALUE_LEN)
    }

    pub fn with_max_value_len(max_value_len: usize) -> Self {
        Self {
            tuples: HashMap::new(),
            individual: HashMap::new(),
            total_records: 0,
            skipped_records: 0,
            max_value_len,
            start: Instant::now(),
        }
    }

    /// Apply one record. Returns false when the record was dropped for an oversized
    /// query or answer; the whole record is skipped in that case, not just the answer.
    pub fn add_record(&mut self, r: &DnsRecord) -> bool {
        if r.query.len() > self.max_value_len {
            debug!(query_len = r.query.len(), "skipping record with insane query length");
            self.skipped_records += 1;
            return false;
        }
        if let Some(answer) = r.answers.iter().find(|a| a.len() > self.max_value_len) {
            debug!(query = %r.query, answer_len = answer.len(), "skipping record with insane answer length");
            self.skipped_records += 1;
            return false;
        }

        self.total_records += 1;
        observe(
            &mut self.individual,
            IndividualKey::query(r.query.as_str()),
            r.ts,
            None,
        );

        // zip: surplus answers without a TTL slot are not recorded.
        for (answer, ttl) in r.answers.iter().zip(&r.ttls) {
            if answer == SENTINEL {
                continue;
            }
            let ttl = strip_decimal(ttl);
            let key = TupleKey {
                query: r.query.clone(),
                answer: answer.clone(),
                qtype: r.qtype.clone(),
            };
            observe(&mut self.tuples, key, r.ts, Some(ttl));
            observe(
                &mut self.individual,
                IndividualKey::answer(answer.as_str()),
                r.ts,
                Some(ttl),
            );
        }
        true
    }

    /// Count a record the source could not decode.
    pub fn skip_record(&mut self) {
        self.skipped_records += 1;
    }

    /// Flatten current state into a snapshot. Does not mutate.
    pub fn snapshot(&self) -> Snapshot {
        let tuples = self
            .tuples
            .iter()
            .map(|(key, stat)| AggregatedTuple {
                key: key.clone(),
                stat: stat.clone(),
            })
            .collect();
        let individual = self
            .individual
            .iter()
            .map(|(key, stat)| AggregatedIndividual {
                key: key.clone(),
                stat: stat.clone(),
            })
            .collect();
        Snapshot {
            tuples,
            individual,
            total_records: self.total_records,
            skipped_records: self.skipped_records,
            duration: self.start.elapsed(),
        }
    }

    /// Fold `other` into `self`. Keys only in `other` are adopted as-is; shared keys
    /// combine with `Stat::combine` (count/first/last order-independent, ttl from `other`).
    /// Record counters add up and the earlier start time is kept.
    pub fn merge(&mut self, other: Aggregator) {
        combine_into(&mut self.tuples, other.tuples);
        combine_into(&mut self.individual, other.individual);
        self.total_records += other.total_records;
        self.skipped_records += other.skipped_records;
        self.start = self.start.min(other.start);
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn skipped_records(&self) -> u64 {
        self.skipped_records
    }

    pub fn tuples_len(&self) -> usize {
        self.tuples.len()
    }

    pub fn individual_len(&self) -> usize {
        self.individual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty() && self.individual.is_empty()
    }
}

fn observe<K: Eq + Hash>(map: &mut HashMap<K, Stat>, key: K, ts: f64, ttl: Option<&str>) {
    map.entry(key)
        .and_modify(|stat| stat.observe(ts, ttl))
        .or_insert_with(|| Stat::new(ts, ttl));
}

fn combine_into<K: Eq + Hash>(dst: &mut HashMap<K, Stat>, src: HashMap<K, Stat>) {
    dst.reserve(src.len());
    for (key, stat) in src {
        match dst.entry(key) {
            Entry::Occupied(mut e) => e.get_mut().combine(&stat),
            Entry::Vacant(e) => {
                e.insert(stat);
            }
        }
    }
}
