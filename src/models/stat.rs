// Aggregation keys and the per-key statistic.

use serde::{Deserialize, Serialize};

/// A distinct resolution edge: (query, answer, type).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleKey {
    pub query: String,
    pub answer: String,
    pub qtype: String,
}

/// Which side of a resolution a value was seen on. Serializes as "Q" / "A".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Q")]
    Query,
    #[serde(rename = "A")]
    Answer,
}

impl Role {
    /// Single-letter code used in exports and in the `individual.which` column.
    pub fn code(self) -> &'static str {
        match self {
            Role::Query => "Q",
            Role::Answer => "A",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "Q" => Some(Role::Query),
            "A" => Some(Role::Answer),
            _ => None,
        }
    }
}

/// A distinct value seen as a query or an answer, independent of type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndividualKey {
    pub value: String,
    pub role: Role,
}

impl IndividualKey {
    pub fn query(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            role: Role::Query,
        }
    }

    pub fn answer(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            role: Role::Answer,
        }
    }
}

/// Running statistic for one key.
///
/// `first <= last` always holds. `ttl` is the value from the most recent update
/// (overwrite, not min/max), so it depends on the order updates and merges are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Stat {
    pub count: u64,
    pub first: f64,
    pub last: f64,
    pub ttl: String,
}

impl Stat {
    /// A single observation at `ts`.
    pub fn new(ts: f64, ttl: Option<&str>) -> Self {
        Self {
            count: 1,
            first: ts,
            last: ts,
            ttl: ttl.map(str::to_owned).unwrap_or_default(),
        }
    }

    /// Apply one more observation. A `None` ttl leaves the stored ttl untouched.
    pub fn observe(&mut self, ts: f64, ttl: Option<&str>) {
        self.count += 1;
        self.first = self.first.min(ts);
        self.last = self.last.max(ts);
        if let Some(ttl) = ttl {
            ttl.clone_into(&mut self.ttl);
        }
    }

    /// Fold `other` into `self`: counts add, the time range widens, ttl is taken from `other`.
    pub fn combine(&mut self, other: &Stat) {
        self.count += other.count;
        self.first = self.first.min(other.first);
        self.last = self.last.max(other.last);
        self.ttl.clone_from(&other.ttl);
    }
}
