// SQLite store tests: schema, upsert merge rule, insert/update tally, atomicity, provenance

mod common;

use common::{aggregator_with, db_config, record};
use dns_indexer::config::DatabaseConfig;
use dns_indexer::models::{AggregatedTuple, Role, Snapshot, Stat, TupleKey, UpdateOutcome};
use dns_indexer::store::{DnsStore, FileRecord};
use tempfile::TempDir;

async fn open_store(config: &DatabaseConfig) -> DnsStore {
    let store = DnsStore::connect(config).await.unwrap();
    store.init().await.unwrap();
    store
}

fn tuple(query: &str, answer: &str, count: u64, first: f64, last: f64, ttl: &str) -> AggregatedTuple {
    AggregatedTuple {
        key: TupleKey {
            query: query.into(),
            answer: answer.into(),
            qtype: "A".into(),
        },
        stat: Stat {
            count,
            first,
            last,
            ttl: ttl.into(),
        },
    }
}

#[tokio::test]
async fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&db_config(&dir)).await;
    store.init().await.unwrap();
    assert_eq!(store.count_tuples().await.unwrap(), 0);
    assert_eq!(store.count_individual().await.unwrap(), 0);
    store.close().await;
}

#[tokio::test]
async fn insert_then_update_merges_stats() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&db_config(&dir)).await;

    let first = aggregator_with(&[
        record(100.0, "www.example.com", "A", &["1.2.3.4"], &["300"]),
        record(150.0, "www.example.com", "A", &["1.2.3.4"], &["300"]),
    ])
    .snapshot();
    let outcome = store.update(&first).await.unwrap();
    // One tuple, one query value, one answer value.
    assert_eq!(outcome.inserted, 3);
    assert_eq!(outcome.updated, 0);

    let second = aggregator_with(&[record(50.0, "www.example.com", "A", &["1.2.3.4"], &["60"])])
        .snapshot();
    let outcome = store.update(&second).await.unwrap();
    assert_eq!(outcome.inserted, 0);
    assert_eq!(outcome.updated, 3);
    assert_eq!(outcome.rows(), 3);

    let t = store
        .get_tuple("www.example.com", "A", "1.2.3.4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(t.count, 3);
    assert_eq!(t.ttl, Some(60));
    assert_eq!(t.first, 50.0);
    assert_eq!(t.last, 150.0);

    let q = store
        .get_individual(Role::Query, "www.example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(q.count, 3);
    assert_eq!(q.ttl, None);
    let a = store
        .get_individual(Role::Answer, "1.2.3.4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.count, 3);
    assert_eq!(a.first, 50.0);

    store.close().await;
}

#[tokio::test]
async fn queries_are_stored_reversed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&db_config(&dir)).await;
    let snap = aggregator_with(&[record(1.0, "www.example.com", "A", &["1.2.3.4"], &["5"])])
        .snapshot();
    store.update(&snap).await.unwrap();

    let stored: String = sqlx::query_scalar("SELECT query FROM tuples")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(stored, "moc.elpmaxe.www");

    let mut values: Vec<(String, String)> =
        sqlx::query_as("SELECT which, value FROM individual ORDER BY which")
            .fetch_all(store.pool())
            .await
            .unwrap();
    values.sort();
    assert_eq!(
        values,
        vec![
            ("A".to_string(), "1.2.3.4".to_string()),
            ("Q".to_string(), "moc.elpmaxe.www".to_string()),
        ]
    );
    store.close().await;
}

#[tokio::test]
async fn non_numeric_ttl_is_stored_null() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&db_config(&dir)).await;
    let snap = aggregator_with(&[record(1.0, "x.example.com", "TXT", &["hello"], &["n/a"])])
        .snapshot();
    store.update(&snap).await.unwrap();
    let t = store
        .get_tuple("x.example.com", "TXT", "hello")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(t.ttl, None);
    store.close().await;
}

#[tokio::test]
async fn duplicate_keys_in_one_update_accumulate() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&db_config(&dir)).await;
    let snap = Snapshot {
        tuples: vec![
            tuple("dup.example.com", "9.9.9.9", 3, 10.0, 20.0, "100"),
            tuple("dup.example.com", "9.9.9.9", 4, 5.0, 15.0, "200"),
        ],
        ..Snapshot::default()
    };
    let outcome = store.update(&snap).await.unwrap();
    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.updated, 1);

    let t = store
        .get_tuple("dup.example.com", "A", "9.9.9.9")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(t.count, 7);
    assert_eq!(t.first, 5.0);
    assert_eq!(t.last, 20.0);
    assert_eq!(t.ttl, Some(200));
    store.close().await;
}

#[tokio::test]
async fn partial_trailing_batch_is_written() {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        batch_size: 2,
        ..db_config(&dir)
    };
    let store = open_store(&config).await;
    assert_eq!(store.batch_size(), 2);

    let snap = Snapshot {
        tuples: (0..5)
            .map(|i| tuple(&format!("h{i}.example.com"), "10.0.0.1", 1, 1.0, 1.0, "60"))
            .collect(),
        ..Snapshot::default()
    };
    let outcome = store.update(&snap).await.unwrap();
    assert_eq!(outcome.inserted, 5);
    assert_eq!(store.count_tuples().await.unwrap(), 5);
    for i in 0..5 {
        assert!(
            store
                .get_tuple(&format!("h{i}.example.com"), "A", "10.0.0.1")
                .await
                .unwrap()
                .is_some()
        );
    }
    store.close().await;
}

#[tokio::test]
async fn empty_snapshot_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&db_config(&dir)).await;
    let outcome = store.update(&Snapshot::default()).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::default());
    store.close().await;
}

#[tokio::test]
async fn failed_update_commits_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&db_config(&dir)).await;
    sqlx::query(
        "CREATE TRIGGER reject_boom BEFORE INSERT ON individual \
         WHEN NEW.value = 'boom' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let snap = aggregator_with(&[
        record(1.0, "ok.example.com", "A", &["1.1.1.1"], &["60"]),
        record(2.0, "bad.example.com", "A", &["boom"], &["60"]),
    ])
    .snapshot();
    assert!(store.update(&snap).await.is_err());
    assert_eq!(store.count_tuples().await.unwrap(), 0);
    assert_eq!(store.count_individual().await.unwrap(), 0);
    store.close().await;
}

#[tokio::test]
async fn provenance_marks_files_processed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&db_config(&dir)).await;
    assert!(!store.is_processed("dns.00.log.gz").await.unwrap());

    let snap = aggregator_with(&[record(1.0, "a.example.com", "A", &["1.1.1.1"], &["1"])])
        .snapshot();
    let outcome = store.update(&snap).await.unwrap();
    let rec = FileRecord::new("dns.00.log.gz", &snap, &outcome);
    assert_eq!(rec.total_records, 1);
    assert_eq!(rec.inserted, 3);
    store.record_file(&rec).await.unwrap();
    // Recording again replaces the row.
    store.record_file(&rec).await.unwrap();

    assert!(store.is_processed("dns.00.log.gz").await.unwrap());
    assert!(!store.is_processed("dns.01.log.gz").await.unwrap());
    store.close().await;
}

#[tokio::test]
async fn close_twice_is_harmless() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&db_config(&dir)).await;
    store.close().await;
    assert!(store.is_closed());
    store.close().await;
    assert!(store.is_closed());
}

#[tokio::test]
async fn concurrent_writers_both_land() {
    let dir = TempDir::new().unwrap();
    let config = db_config(&dir);
    let a = open_store(&config).await;
    let b = open_store(&config).await;

    let snap_a = aggregator_with(&[record(10.0, "shared.example.com", "A", &["1.1.1.1"], &["1"])])
        .snapshot();
    let snap_b = aggregator_with(&[
        record(20.0, "shared.example.com", "A", &["1.1.1.1"], &["2"]),
        record(21.0, "shared.example.com", "A", &["1.1.1.1"], &["2"]),
    ])
    .snapshot();

    let (ra, rb) = tokio::join!(a.update(&snap_a), b.update(&snap_b));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());
    assert_eq!(ra.inserted + rb.inserted, 3);
    assert_eq!(ra.updated + rb.updated, 3);

    let t = a
        .get_tuple("shared.example.com", "A", "1.1.1.1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(t.count, 3);
    assert_eq!(t.first, 10.0);
    assert_eq!(t.last, 21.0);

    a.close().await;
    b.close().await;
}
