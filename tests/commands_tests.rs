// End-to-end subcommand tests: aggregate to JSON lines, index into the store

mod common;

use common::{db_config, tsv_line, tsv_log};
use dns_indexer::commands::{self, ExportKind, IndexSummary};
use dns_indexer::config::AppConfig;
use dns_indexer::models::Role;
use dns_indexer::store::DnsStore;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_logs(dir: &TempDir) -> Vec<PathBuf> {
    let a = dir.path().join("dns.a.log");
    std::fs::write(
        &a,
        tsv_log(&[
            tsv_line("100.0", "www.example.com", "A", "1.2.3.4", "300.000000"),
            tsv_line("101.0", "mail.example.com", "A", "5.6.7.8", "60.000000"),
        ]),
    )
    .unwrap();
    let b = dir.path().join("dns.b.log");
    std::fs::write(
        &b,
        tsv_log(&[tsv_line("200.0", "www.example.com", "A", "1.2.3.4", "120.000000")]),
    )
    .unwrap();
    vec![a, b]
}

fn config_for(dir: &TempDir) -> AppConfig {
    AppConfig {
        database: db_config(dir),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn aggregate_writes_merged_tuples() {
    let dir = TempDir::new().unwrap();
    let files = write_logs(&dir);
    let mut out: Vec<u8> = Vec::new();
    let lines = commands::aggregate(&config_for(&dir), files, ExportKind::Tuples, true, &mut out)
        .await
        .unwrap();
    assert_eq!(lines, 2);

    let parsed: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let www = parsed
        .iter()
        .find(|v| v["query"] == "moc.elpmaxe.www")
        .unwrap();
    assert_eq!(www["count"], 2);
    assert_eq!(www["first"], 100);
    assert_eq!(www["last"], 200);
    assert_eq!(www["ttl"], "120");
}

#[tokio::test]
async fn aggregate_individual_kind() {
    let dir = TempDir::new().unwrap();
    let files = write_logs(&dir);
    let mut out: Vec<u8> = Vec::new();
    let lines =
        commands::aggregate(&config_for(&dir), files, ExportKind::Individual, false, &mut out)
            .await
            .unwrap();
    // Two query values and two answer values.
    assert_eq!(lines, 4);
}

#[tokio::test]
async fn index_skips_already_processed_files() {
    let dir = TempDir::new().unwrap();
    let files = write_logs(&dir);
    let mut config = config_for(&dir);
    // One worker stores files in input order, so the later file's ttl wins.
    config.aggregation.workers = 1;

    let first = commands::index(&config, files.clone()).await.unwrap();
    assert_eq!(
        first,
        IndexSummary {
            indexed: 2,
            already_processed: 0
        }
    );

    let second = commands::index(&config, files).await.unwrap();
    assert_eq!(
        second,
        IndexSummary {
            indexed: 0,
            already_processed: 2
        }
    );

    let store = DnsStore::connect(&config.database).await.unwrap();
    let t = store
        .get_tuple("www.example.com", "A", "1.2.3.4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(t.count, 2);
    assert_eq!(t.ttl, Some(120));
    let q = store
        .get_individual(Role::Query, "mail.example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(q.count, 1);
    store.close().await;
}

#[tokio::test]
async fn init_creates_schema() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir);
    commands::init(&config).await.unwrap();
    commands::init(&config).await.unwrap();

    let store = DnsStore::connect(&config.database).await.unwrap();
    assert_eq!(store.count_tuples().await.unwrap(), 0);
    assert!(!store.is_processed("anything").await.unwrap());
    store.close().await;
}

#[tokio::test]
async fn index_keeps_files_stored_before_a_failure() {
    let dir = TempDir::new().unwrap();
    let mut files = write_logs(&dir);
    let bad = dir.path().join("dns.bad.log");
    std::fs::write(&bad, "1.0\tq\tA\n").unwrap();
    files.insert(1, bad.clone());

    let mut config = config_for(&dir);
    config.aggregation.workers = 1;
    assert!(commands::index(&config, files.clone()).await.is_err());

    let store = DnsStore::connect(&config.database).await.unwrap();
    assert!(store.is_processed(&files[0].to_string_lossy()).await.unwrap());
    assert!(!store.is_processed(&bad.to_string_lossy()).await.unwrap());
    // The file after the failing one was never started.
    assert!(!store.is_processed(&files[2].to_string_lossy()).await.unwrap());
    assert!(
        store
            .get_individual(Role::Query, "mail.example.com")
            .await
            .unwrap()
            .is_some()
    );
    store.close().await;
}

#[tokio::test]
async fn index_bad_first_file_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let mut files = write_logs(&dir);
    let bad = dir.path().join("dns.bad.log");
    std::fs::write(&bad, "1.0\tq\tA\n").unwrap();
    files.insert(0, bad);

    let mut config = config_for(&dir);
    config.aggregation.workers = 1;
    assert!(commands::index(&config, files).await.is_err());

    let store = DnsStore::connect(&config.database).await.unwrap();
    assert_eq!(store.count_tuples().await.unwrap(), 0);
    assert_eq!(store.count_individual().await.unwrap(), 0);
    store.close().await;
}
