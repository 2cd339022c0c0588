// Domain models: input records, aggregation keys, statistics and snapshots.

mod record;
mod snapshot;
mod stat;

pub use record::DnsRecord;
pub use snapshot::{AggregatedIndividual, AggregatedTuple, Snapshot, UpdateOutcome};
pub use stat::{IndividualKey, Role, Stat, TupleKey};
