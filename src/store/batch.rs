// Composed upsert statements: one multi-row INSERT ... ON CONFLICT DO UPDATE per batch.
// Each row goes through the conflict clause independently (sum count, min first,
// max last, overwrite ttl), so duplicate keys inside one batch accumulate.
// RETURNING gives the stored count after each row, from which inserts and updates are tallied.

use std::collections::HashMap;
use std::hash::Hash;

use sqlx::{Row, SqliteConnection};

use crate::error::StoreError;
use crate::models::{AggregatedIndividual, AggregatedTuple, Role};
use crate::transform::reverse_query;

const TUPLE_ROW: &str = "(?, ?, ?, ?, ?, ?, ?)";
const INDIVIDUAL_ROW: &str = "(?, ?, ?, ?, ?)";

/// Insert/update counts for one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct Tally {
    pub inserted: u64,
    pub updated: u64,
}

/// Upsert statement for `rows` tuple rows.
pub(super) fn tuple_upsert_sql(rows: usize) -> String {
    batch_sql(
        r#"INSERT INTO tuples (query, type, answer, ttl, count, "first", "last") VALUES "#,
        TUPLE_ROW,
        rows,
        r#" ON CONFLICT (query, type, answer) DO UPDATE SET
            count = count + excluded.count,
            ttl = excluded.ttl,
            "first" = min("first", excluded."first"),
            "last" = max("last", excluded."last")
        RETURNING query, type, answer, count"#,
    )
}

/// Upsert statement for `rows` individual rows.
pub(super) fn individual_upsert_sql(rows: usize) -> String {
    batch_sql(
        r#"INSERT INTO individual (which, value, count, "first", "last") VALUES "#,
        INDIVIDUAL_ROW,
        rows,
        r#" ON CONFLICT (which, value) DO UPDATE SET
            count = count + excluded.count,
            "first" = min("first", excluded."first"),
            "last" = max("last", excluded."last")
        RETURNING which, value, count"#,
    )
}

fn batch_sql(head: &str, row: &str, rows: usize, tail: &str) -> String {
    let mut sql = String::with_capacity(head.len() + rows * (row.len() + 2) + tail.len());
    sql.push_str(head);
    for i in 0..rows {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(row);
    }
    sql.push_str(tail);
    sql
}

/// TTL column value; non-numeric TTLs are stored as NULL.
pub(super) fn stored_ttl(ttl: &str) -> Option<i64> {
    ttl.parse().ok()
}

/// Run one tuple batch. `sql` must be `tuple_upsert_sql(rows.len())`.
pub(super) async fn upsert_tuples(
    conn: &mut SqliteConnection,
    sql: &str,
    rows: &[AggregatedTuple],
) -> Result<Tally, StoreError> {
    let queries: Vec<String> = rows.iter().map(|t| reverse_query(&t.key.query)).collect();
    let mut query = sqlx::query(sql);
    for (t, q) in rows.iter().zip(&queries) {
        query = query
            .bind(q.as_str())
            .bind(t.key.qtype.as_str())
            .bind(t.key.answer.as_str())
            .bind(stored_ttl(&t.stat.ttl))
            .bind(t.stat.count as i64)
            .bind(t.stat.first)
            .bind(t.stat.last);
    }
    let returned = query.fetch_all(&mut *conn).await?;

    let mut stored = Vec::with_capacity(returned.len());
    for row in returned {
        let key: (String, String, String) = (
            row.try_get("query")?,
            row.try_get("type")?,
            row.try_get("answer")?,
        );
        stored.push((key, row.try_get::<i64, _>("count")?));
    }
    let submitted = rows.iter().zip(queries).map(|(t, q)| {
        (
            (q, t.key.qtype.clone(), t.key.answer.clone()),
            t.stat.count,
        )
    });
    Ok(tally(submitted, stored))
}

/// Run one individual batch. `sql` must be `individual_upsert_sql(rows.len())`.
pub(super) async fn upsert_individual(
    conn: &mut SqliteConnection,
    sql: &str,
    rows: &[AggregatedIndividual],
) -> Result<Tally, StoreError> {
    let values: Vec<String> = rows
        .iter()
        .map(|i| match i.key.role {
            Role::Query => reverse_query(&i.key.value),
            Role::Answer => i.key.value.clone(),
        })
        .collect();
    let mut query = sqlx::query(sql);
    for (i, v) in rows.iter().zip(&values) {
        query = query
            .bind(i.key.role.code())
            .bind(v.as_str())
            .bind(i.stat.count as i64)
            .bind(i.stat.first)
            .bind(i.stat.last);
    }
    let returned = query.fetch_all(&mut *conn).await?;

    let mut stored = Vec::with_capacity(returned.len());
    for row in returned {
        let key: (String, String) = (row.try_get("which")?, row.try_get("value")?);
        stored.push((key, row.try_get::<i64, _>("count")?));
    }
    let submitted = rows
        .iter()
        .zip(values)
        .map(|(i, v)| ((i.key.role.code().to_owned(), v), i.stat.count));
    Ok(tally(submitted, stored))
}

/// `submitted` holds (key, count delta) per batch row, `stored` the (key, count) RETURNING rows.
///
/// Stored counts are always >= 1, so a key that existed before the statement ends strictly
/// above the sum of its deltas; a key the statement created ends exactly at that sum, and
/// only its first row was an insert.
pub(super) fn tally<K: Eq + Hash>(
    submitted: impl IntoIterator<Item = (K, u64)>,
    stored: impl IntoIterator<Item = (K, i64)>,
) -> Tally {
    let mut per_key: HashMap<K, (u64, u64)> = HashMap::new();
    for (key, delta) in submitted {
        let entry = per_key.entry(key).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += delta;
    }
    let mut final_count: HashMap<K, i64> = HashMap::new();
    for (key, count) in stored {
        let entry = final_count.entry(key).or_insert(count);
        *entry = (*entry).max(count);
    }

    let mut out = Tally::default();
    for (key, (rows, delta)) in per_key {
        let created = final_count
            .get(&key)
            .is_some_and(|&count| u64::try_from(count).is_ok_and(|c| c == delta));
        if created {
            out.inserted += 1;
            out.updated += rows - 1;
        } else {
            out.updated += rows;
        }
    }
    out
}
