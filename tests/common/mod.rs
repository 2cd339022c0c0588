// Shared test helpers

#![allow(dead_code)]

use dns_indexer::aggregator::Aggregator;
use dns_indexer::config::DatabaseConfig;
use dns_indexer::models::DnsRecord;
use tempfile::TempDir;

pub fn record(ts: f64, query: &str, qtype: &str, answers: &[&str], ttls: &[&str]) -> DnsRecord {
    DnsRecord {
        ts,
        query: query.into(),
        qtype: qtype.into(),
        answers: answers.iter().map(|s| s.to_string()).collect(),
        ttls: ttls.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn aggregator_with(records: &[DnsRecord]) -> Aggregator {
    let mut agg = Aggregator::new();
    for r in records {
        agg.add_record(r);
    }
    agg
}

pub const TSV_HEADER: &str = "#separator \\x09
#set_separator\t,
#empty_field\t(empty)
#unset_field\t-
#path\tdns
#open\t2024-01-01-00-00-00
#fields\tts\tuid\tquery\tqtype_name\tanswers\tTTLs
#types\ttime\tstring\tstring\tstring\tvector[string]\tvector[interval]
";

pub fn tsv_line(ts: &str, query: &str, qtype: &str, answers: &str, ttls: &str) -> String {
    format!("{ts}\tCabc123\t{query}\t{qtype}\t{answers}\t{ttls}\n")
}

/// A TSV dns.log with the standard header and the given data lines.
pub fn tsv_log(lines: &[String]) -> String {
    let mut out = String::from(TSV_HEADER);
    for l in lines {
        out.push_str(l);
    }
    out.push_str("#close\t2024-01-01-01-00-00\n");
    out
}

pub fn db_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("dns.db").to_string_lossy().into_owned(),
        ..DatabaseConfig::default()
    }
}
